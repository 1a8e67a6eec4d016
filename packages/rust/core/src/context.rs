//! Per-run context handed to every component.

use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use workspacebuilder_shared::{ComponentId, Result, SettingsSource, WorkspaceBuilderError};
use workspacebuilder_storage::GraphStore;

use crate::component::ComponentRegistry;
use crate::outputter::Outputter;
use crate::setting::{Setting, SettingType, SettingValue, resolve_setting};

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ResolvedSetting {
    setting: &'static Setting,
    value: Option<SettingValue>,
    required_by: Option<ComponentId>,
}

/// Setting values for the components of one run, converted and checked
/// before any component executes.
#[derive(Debug, Default)]
pub struct ResolvedSettings {
    values: HashMap<&'static str, ResolvedSetting>,
}

impl ResolvedSettings {
    /// Resolve every setting declared by the components in `order`.
    ///
    /// Fails on the first conversion error or missing required value.
    pub fn resolve(
        registry: &ComponentRegistry,
        order: &[ComponentId],
        source: &SettingsSource,
    ) -> Result<Self> {
        let mut values: HashMap<&'static str, ResolvedSetting> = HashMap::new();

        for id in order {
            let Some(component) = registry.get(id) else {
                return Err(WorkspaceBuilderError::ComponentNotFound { id: id.clone() });
            };
            for dep in component.settings() {
                let setting = dep.setting;
                let entry = match values.entry(setting.name) {
                    std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                    std::collections::hash_map::Entry::Vacant(e) => e.insert(ResolvedSetting {
                        setting,
                        value: resolve_setting(setting, source.get(setting.key))?,
                        required_by: None,
                    }),
                };
                if dep.required && entry.required_by.is_none() {
                    entry.required_by = Some(id.clone());
                    if entry.value.is_none() {
                        return Err(WorkspaceBuilderError::MissingRequiredSetting {
                            name: setting.name.to_string(),
                            key: setting.key.to_string(),
                            required_by: Some(id.clone()),
                        });
                    }
                }
            }
        }

        tracing::debug!(count = values.len(), "settings resolved");
        Ok(Self { values })
    }

    /// The value for `name`, or `None` when it is optional and unset.
    pub fn get(&self, name: &str) -> Result<Option<&SettingValue>> {
        let resolved = self
            .values
            .get(name)
            .ok_or_else(|| WorkspaceBuilderError::UnknownSetting {
                name: name.to_string(),
            })?;
        match (&resolved.value, &resolved.required_by) {
            (None, Some(component)) => Err(WorkspaceBuilderError::MissingRequiredSetting {
                name: name.to_string(),
                key: resolved.setting.key.to_string(),
                required_by: Some(component.clone()),
            }),
            (value, _) => Ok(value.as_ref()),
        }
    }

    fn declared_type(&self, name: &str) -> Option<SettingType> {
        self.values.get(name).map(|r| r.setting.setting_type)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

type Property = Arc<dyn Any + Send + Sync>;

/// Shared state for one pipeline run.
pub struct Context {
    run_id: Uuid,
    settings: Arc<ResolvedSettings>,
    properties: Mutex<HashMap<String, Property>>,
    graph: Arc<GraphStore>,
    outputter: Arc<dyn Outputter>,
    cancel: CancellationToken,
}

impl Context {
    pub fn new(
        settings: Arc<ResolvedSettings>,
        graph: Arc<GraphStore>,
        outputter: Arc<dyn Outputter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            settings,
            properties: Mutex::new(HashMap::new()),
            graph,
            outputter,
            cancel,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn outputter(&self) -> &dyn Outputter {
        self.outputter.as_ref()
    }

    // ---- Settings ----

    pub fn get_setting(&self, name: &str) -> Result<Option<&SettingValue>> {
        self.settings.get(name)
    }

    pub fn setting_str(&self, name: &str) -> Result<Option<&str>> {
        self.typed(name, SettingType::String, SettingValue::as_str)
    }

    pub fn setting_int(&self, name: &str) -> Result<Option<i64>> {
        self.typed(name, SettingType::Integer, SettingValue::as_int)
    }

    pub fn setting_bool(&self, name: &str) -> Result<Option<bool>> {
        self.typed(name, SettingType::Bool, SettingValue::as_bool)
    }

    pub fn setting_dict(&self, name: &str) -> Result<Option<&Map<String, Value>>> {
        self.typed(name, SettingType::Dict, SettingValue::as_dict)
    }

    pub fn setting_path(&self, name: &str) -> Result<Option<&Path>> {
        self.typed(name, SettingType::File, SettingValue::as_path)
    }

    /// Like [`Context::setting_str`] but an unset value is an error.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.setting_str(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn require_int(&self, name: &str) -> Result<i64> {
        self.setting_int(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn require_dict(&self, name: &str) -> Result<&Map<String, Value>> {
        self.setting_dict(name)?.ok_or_else(|| self.missing(name))
    }

    pub fn require_path(&self, name: &str) -> Result<&Path> {
        self.setting_path(name)?.ok_or_else(|| self.missing(name))
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: SettingType,
        extract: impl FnOnce(&'a SettingValue) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.settings.get(name)? {
            None => Ok(None),
            Some(value) => extract(value).map(Some).ok_or_else(|| {
                let declared = self
                    .settings
                    .declared_type(name)
                    .map_or("unknown", |t| t.as_str());
                WorkspaceBuilderError::setting_type(
                    name,
                    format!("read as {expected} but declared as {declared}"),
                )
            }),
        }
    }

    fn missing(&self, name: &str) -> WorkspaceBuilderError {
        let key = self
            .settings
            .values
            .get(name)
            .map(|r| r.setting.key.to_string())
            .unwrap_or_else(|| name.to_string());
        WorkspaceBuilderError::MissingRequiredSetting {
            name: name.to_string(),
            key,
            required_by: None,
        }
    }

    // ---- Properties ----

    /// Store a value for later components in the same run.
    pub fn set_property<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.lock_properties().insert(key.into(), Arc::new(value));
    }

    /// Fetch a property stored by an earlier component.
    ///
    /// Absent keys give `Ok(None)`; a value of another type is an error.
    pub fn get_property<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
        let Some(value) = self.lock_properties().get(key).cloned() else {
            return Ok(None);
        };
        value.downcast::<T>().map(Some).map_err(|_| {
            WorkspaceBuilderError::validation(format!(
                "property '{key}' is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.lock_properties().contains_key(key)
    }

    fn lock_properties(&self) -> std::sync::MutexGuard<'_, HashMap<String, Property>> {
        self.properties.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- Cancellation ----

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Return [`WorkspaceBuilderError::Cancelled`] once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(WorkspaceBuilderError::Cancelled);
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::component::testing::{Probe, call_log};
    use crate::setting::SettingDependency;

    static DEFAULT_LOD: Setting =
        Setting::new("DEFAULT_LOD", "DEFAULT_LOD", SettingType::Integer, "lod").with_default("2");
    static OWNER: Setting = Setting::new("OWNER", "OWNER_EMAIL", SettingType::String, "owner");
    static WORKSPACE: Setting = Setting::new("WORKSPACE", "WORKSPACE_NAME", SettingType::String, "ws");
    static OPTIONAL: &[SettingDependency] = &[
        SettingDependency::optional(&DEFAULT_LOD),
        SettingDependency::optional(&OWNER),
    ];
    static REQUIRED: &[SettingDependency] = &[SettingDependency::required(&WORKSPACE)];

    fn registry() -> ComponentRegistry {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(Probe::new("lod", &log).with_settings(OPTIONAL))
            .unwrap();
        reg
    }

    #[tokio::test]
    async fn setting_default_and_override() {
        let reg = registry();
        let (ctx, _) = test_context(&reg, &SettingsSource::empty()).await;
        assert_eq!(ctx.setting_int("DEFAULT_LOD").unwrap(), Some(2));
        assert_eq!(ctx.setting_str("OWNER").unwrap(), None);

        let source = SettingsSource::from_pairs([("DEFAULT_LOD", "5")]);
        let (ctx, _) = test_context(&reg, &source).await;
        assert_eq!(
            ctx.get_setting("DEFAULT_LOD").unwrap(),
            Some(&SettingValue::Integer(5))
        );
    }

    #[tokio::test]
    async fn unknown_and_mistyped_lookups() {
        let reg = registry();
        let (ctx, _) = test_context(&reg, &SettingsSource::empty()).await;
        assert!(matches!(
            ctx.get_setting("NOT_DECLARED"),
            Err(WorkspaceBuilderError::UnknownSetting { .. })
        ));
        assert!(matches!(
            ctx.setting_str("DEFAULT_LOD"),
            Err(WorkspaceBuilderError::SettingType { .. })
        ));
        assert!(matches!(
            ctx.require_str("OWNER"),
            Err(WorkspaceBuilderError::MissingRequiredSetting { .. })
        ));
    }

    #[test]
    fn required_setting_missing_fails_resolution() {
        let log = call_log();
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(Probe::new("workspace", &log).with_settings(REQUIRED))
            .unwrap();
        let order = vec![ComponentId::enricher("workspace")];

        match ResolvedSettings::resolve(&reg, &order, &SettingsSource::empty()).unwrap_err() {
            WorkspaceBuilderError::MissingRequiredSetting { name, key, required_by } => {
                assert_eq!(name, "WORKSPACE");
                assert_eq!(key, "WORKSPACE_NAME");
                assert_eq!(required_by, Some(ComponentId::enricher("workspace")));
            }
            other => panic!("unexpected error: {other}"),
        }

        let source = SettingsSource::from_pairs([("WORKSPACE_NAME", "ops")]);
        let resolved = ResolvedSettings::resolve(&reg, &order, &source).unwrap();
        assert_eq!(resolved.get("WORKSPACE").unwrap(), Some(&SettingValue::String("ops".into())));
    }

    #[tokio::test]
    async fn properties_are_typed() {
        let reg = registry();
        let (ctx, _) = test_context(&reg, &SettingsSource::empty()).await;

        assert!(ctx.get_property::<u32>("count").unwrap().is_none());
        ctx.set_property("count", 3_u32);
        ctx.set_property("maybe", Option::<String>::None);

        assert_eq!(*ctx.get_property::<u32>("count").unwrap().unwrap(), 3);
        assert!(ctx.has_property("count"));
        assert!(ctx.get_property::<String>("count").is_err());
        assert_eq!(
            *ctx.get_property::<Option<String>>("maybe").unwrap().unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn cancellation_is_observable() {
        let reg = registry();
        let (ctx, _) = test_context(&reg, &SettingsSource::empty()).await;
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancellation().cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(
            ctx.check_cancelled(),
            Err(WorkspaceBuilderError::Cancelled)
        ));
    }
}
