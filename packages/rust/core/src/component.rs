//! Component traits and the in-memory component registry.
//!
//! A component is identified by `(role, name)`. The role is fixed by the
//! registration call, so an indexer can only ever be invoked as an indexer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use workspacebuilder_shared::{ComponentId, Result, Role, WorkspaceBuilderError};

use crate::context::Context;
use crate::setting::{SettingDependency, SettingRegistry};

/// An edge from a component to an upstream component it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentDependency {
    pub role: Role,
    pub name: &'static str,
}

impl ComponentDependency {
    pub const fn indexer(name: &'static str) -> Self {
        Self {
            role: Role::Indexer,
            name,
        }
    }

    pub const fn enricher(name: &'static str) -> Self {
        Self {
            role: Role::Enricher,
            name,
        }
    }

    pub const fn renderer(name: &'static str) -> Self {
        Self {
            role: Role::Renderer,
            name,
        }
    }

    pub fn id(&self) -> ComponentId {
        ComponentId::new(self.role, self.name)
    }
}

/// Static description shared by every component kind.
pub trait ComponentInfo: Send + Sync {
    fn name(&self) -> &'static str;

    fn documentation(&self) -> &'static str {
        ""
    }

    fn settings(&self) -> &'static [SettingDependency] {
        &[]
    }

    fn dependencies(&self) -> &'static [ComponentDependency] {
        &[]
    }
}

/// Populates the graph from an external source of truth.
#[async_trait]
pub trait Indexer: ComponentInfo {
    async fn index(&self, ctx: &Context) -> Result<()>;
}

/// Derives or annotates graph attributes from indexed state.
#[async_trait]
pub trait Enricher: ComponentInfo {
    async fn enrich(&self, ctx: &Context) -> Result<()>;
}

/// Produces external output from the final graph state.
#[async_trait]
pub trait Renderer: ComponentInfo {
    async fn render(&self, ctx: &Context) -> Result<()>;
}

/// The one entry point a registered component exposes.
#[derive(Clone)]
pub enum EntryPoint {
    Indexer(Arc<dyn Indexer>),
    Enricher(Arc<dyn Enricher>),
    Renderer(Arc<dyn Renderer>),
}

/// A component as stored in the registry.
#[derive(Clone)]
pub struct RegisteredComponent {
    id: ComponentId,
    index: usize,
    info: Arc<dyn ComponentInfo>,
    entry: EntryPoint,
}

impl RegisteredComponent {
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.id.role
    }

    /// Position in registration order (used for deterministic tie-breaks).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn documentation(&self) -> &'static str {
        self.info.documentation()
    }

    pub fn settings(&self) -> &'static [SettingDependency] {
        self.info.settings()
    }

    pub fn dependencies(&self) -> &'static [ComponentDependency] {
        self.info.dependencies()
    }

    /// Invoke the component's entry point.
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match &self.entry {
            EntryPoint::Indexer(c) => c.index(ctx).await,
            EntryPoint::Enricher(c) => c.enrich(ctx).await,
            EntryPoint::Renderer(c) => c.render(ctx).await,
        }
    }
}

impl std::fmt::Debug for RegisteredComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredComponent")
            .field("id", &self.id)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Registry of components keyed by `(role, name)`, plus the settings they
/// declare.
#[derive(Default)]
pub struct ComponentRegistry {
    components: Vec<RegisteredComponent>,
    by_id: HashMap<ComponentId, usize>,
    settings: SettingRegistry,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_indexer<C: Indexer + 'static>(&mut self, component: C) -> Result<()> {
        let component = Arc::new(component);
        let info: Arc<dyn ComponentInfo> = component.clone();
        self.insert(Role::Indexer, info, EntryPoint::Indexer(component))
    }

    pub fn register_enricher<C: Enricher + 'static>(&mut self, component: C) -> Result<()> {
        let component = Arc::new(component);
        let info: Arc<dyn ComponentInfo> = component.clone();
        self.insert(Role::Enricher, info, EntryPoint::Enricher(component))
    }

    pub fn register_renderer<C: Renderer + 'static>(&mut self, component: C) -> Result<()> {
        let component = Arc::new(component);
        let info: Arc<dyn ComponentInfo> = component.clone();
        self.insert(Role::Renderer, info, EntryPoint::Renderer(component))
    }

    fn insert(&mut self, role: Role, info: Arc<dyn ComponentInfo>, entry: EntryPoint) -> Result<()> {
        let id = ComponentId::new(role, info.name());
        if self.by_id.contains_key(&id) {
            return Err(WorkspaceBuilderError::DuplicateComponent { id });
        }
        // Stage the settings so a rejected component leaves none behind.
        let mut settings = self.settings.clone();
        for dep in info.settings() {
            settings.register(dep.setting)?;
        }
        self.settings = settings;

        tracing::debug!(component = %id, "component registered");
        let index = self.components.len();
        self.by_id.insert(id.clone(), index);
        self.components.push(RegisteredComponent {
            id,
            index,
            info,
            entry,
        });
        Ok(())
    }

    pub fn get(&self, id: &ComponentId) -> Option<&RegisteredComponent> {
        self.by_id.get(id).map(|&idx| &self.components[idx])
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Components in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredComponent> {
        self.components.iter()
    }

    pub fn settings(&self) -> &SettingRegistry {
        &self.settings
    }

    /// Check the dependency declarations of every registered component,
    /// requested or not: missing upstreams, dependencies on a later role
    /// and same-role cycles.
    pub fn validate(&self) -> Result<()> {
        crate::order::resolve_order(self, &[]).map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::setting::{Setting, SettingType};

    static SHARED: Setting = Setting::new("SHARED", "SHARED", SettingType::String, "shared");
    static CLASH: Setting = Setting::new("SHARED", "OTHER", SettingType::Integer, "clash");
    static USES_SHARED: &[SettingDependency] = &[SettingDependency::required(&SHARED)];
    static USES_CLASH: &[SettingDependency] = &[SettingDependency::optional(&CLASH)];

    static FRESH: Setting = Setting::new("FRESH", "FRESH", SettingType::Bool, "fresh");
    static FRESH_THEN_CLASH: &[SettingDependency] = &[
        SettingDependency::optional(&FRESH),
        SettingDependency::optional(&CLASH),
    ];

    #[test]
    fn role_comes_from_registration_call() {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_indexer(Probe::new("a", &log)).unwrap();
        reg.register_renderer(Probe::new("a", &log)).unwrap();

        assert!(reg.contains(&ComponentId::indexer("a")));
        assert!(reg.contains(&ComponentId::renderer("a")));
        assert!(!reg.contains(&ComponentId::enricher("a")));
        assert_eq!(reg.get(&ComponentId::renderer("a")).unwrap().index(), 1);
    }

    #[test]
    fn duplicate_component_rejected() {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(Probe::new("lod", &log)).unwrap();
        let err = reg.register_enricher(Probe::new("lod", &log)).unwrap_err();
        assert!(matches!(err, WorkspaceBuilderError::DuplicateComponent { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn settings_collected_from_components() {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_indexer(Probe::new("a", &log).with_settings(USES_SHARED))
            .unwrap();
        reg.register_enricher(Probe::new("b", &log).with_settings(USES_SHARED))
            .unwrap();
        assert_eq!(reg.settings().len(), 1);

        let err = reg
            .register_renderer(Probe::new("c", &log).with_settings(USES_CLASH))
            .unwrap_err();
        assert!(matches!(err, WorkspaceBuilderError::DuplicateSetting { .. }));
        assert!(!reg.contains(&ComponentId::renderer("c")));
    }

    #[test]
    fn rejected_component_leaves_no_settings_behind() {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_indexer(Probe::new("a", &log).with_settings(USES_SHARED))
            .unwrap();

        let err = reg
            .register_enricher(Probe::new("b", &log).with_settings(FRESH_THEN_CLASH))
            .unwrap_err();
        assert!(matches!(err, WorkspaceBuilderError::DuplicateSetting { .. }));
        assert!(reg.settings().get("FRESH").is_none());
        assert_eq!(reg.settings().len(), 1);
    }
}
