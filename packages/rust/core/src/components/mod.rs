//! Built-in indexers, enrichers and renderers.

pub mod enrichers;
pub mod indexers;
pub mod renderers;

use workspacebuilder_shared::{ComponentId, Result, Role};

use crate::component::ComponentRegistry;
use crate::setting::{Setting, SettingType};

/// Property key under which `indexer:load_resources` publishes the loaded dump.
pub const RESOURCE_DUMP_PROPERTY: &str = "resource_dump";

/// Shared by the LOD and workspace enrichers.
pub static DEFAULT_LOD: Setting = Setting::new(
    "DEFAULT_LOD",
    "DEFAULT_LOD",
    SettingType::Integer,
    "Level of detail for namespaces without an explicit entry (0 none, 1 basic, 2 detailed)",
)
.with_default("2");

/// Register every built-in component in its canonical order.
pub fn register_builtin(registry: &mut ComponentRegistry) -> Result<()> {
    registry.register_indexer(indexers::KubeApiIndexer::default())?;
    registry.register_indexer(indexers::LoadResourcesIndexer)?;

    registry.register_enricher(enrichers::LodEnricher)?;
    registry.register_enricher(enrichers::WorkspaceEnricher)?;

    registry.register_renderer(renderers::DumpResourcesRenderer)?;
    registry.register_renderer(renderers::DebugRenderer)?;
    registry.register_renderer(renderers::WorkspaceFilesRenderer)?;
    Ok(())
}

/// A registry holding all built-in components.
pub fn builtin_registry() -> Result<ComponentRegistry> {
    let mut registry = ComponentRegistry::new();
    register_builtin(&mut registry)?;
    registry.validate()?;
    Ok(registry)
}

/// The request used when the caller names no components: `indexer:kubeapi`
/// plus every enricher and renderer. The dump loader is left out since it
/// is an alternative source to the live clusters.
pub fn default_request(registry: &ComponentRegistry) -> Vec<ComponentId> {
    registry
        .iter()
        .map(|c| c.id().clone())
        .filter(|id| id.role != Role::Indexer || id.name == "kubeapi")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::resolve_order;

    #[test]
    fn builtin_components_register_and_order() {
        let registry = builtin_registry().unwrap();
        assert_eq!(registry.len(), 7);

        let order: Vec<String> = resolve_order(&registry, &[ComponentId::renderer("debug")])
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(order, vec!["enricher:lod", "enricher:workspace", "renderer:debug"]);
    }

    #[tokio::test]
    async fn dump_to_workspace_end_to_end() {
        use std::sync::Arc;

        use serde_json::json;
        use workspacebuilder_dump::{ClusterDump, ResourceDump};
        use workspacebuilder_shared::SettingsSource;

        use crate::context::test_support::test_graph;
        use crate::outputter::MemoryOutputter;
        use crate::pipeline::{Pipeline, SilentProgress};

        let mut cd = ClusterDump::new("prod-ctx");
        for ns in ["kube-system", "shop"] {
            cd.namespaces.push(json!({"metadata": {"name": ns}}));
        }
        cd.pods
            .push(json!({"metadata": {"name": "web-0", "namespace": "shop"}}));
        let mut dump = ResourceDump::new("fixture");
        dump.clusters.insert("prod".into(), cd);
        let path = std::env::temp_dir().join(format!("wb_e2e_{}.yaml", uuid::Uuid::now_v7()));
        dump.save(&path).unwrap();

        let registry = builtin_registry().unwrap();
        let source = SettingsSource::from_pairs([
            ("RESOURCE_LOAD_FILE", path.to_string_lossy().to_string()),
            ("WORKSPACE_NAME", "ops".to_string()),
            ("NAMESPACE_LODS", r#"{"kube-system": 0}"#.to_string()),
        ]);
        let outputter = Arc::new(MemoryOutputter::new());
        let requested = [
            ComponentId::indexer("load_resources"),
            ComponentId::renderer("debug"),
            ComponentId::renderer("dump_resources"),
            ComponentId::renderer("workspace_files"),
        ];

        let report = Pipeline::new(&registry, &source, test_graph().await, outputter.clone())
            .run(&requested, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(report.executed.len(), 6);
        assert!(!report.executed.contains(&ComponentId::indexer("kubeapi")));
        assert_eq!(outputter.stdout(), "ops: prod-shop\n");
        assert!(outputter.file("workspaces/ops/slxs/prod-shop/slx.yaml").is_some());

        let yaml = String::from_utf8(outputter.file("resource-dump.yaml").unwrap()).unwrap();
        let rendered = ResourceDump::from_yaml(&yaml).unwrap();
        assert_eq!(rendered.clusters, dump.clusters);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn shared_settings_registered_once() {
        let registry = builtin_registry().unwrap();
        let lod_count = registry
            .settings()
            .iter()
            .filter(|s| s.name == "DEFAULT_LOD")
            .count();
        assert_eq!(lod_count, 1);
    }

    #[test]
    fn default_request_uses_one_source() {
        let registry = builtin_registry().unwrap();
        let request = default_request(&registry);

        assert!(request.contains(&ComponentId::indexer("kubeapi")));
        assert!(!request.contains(&ComponentId::indexer("load_resources")));
        assert!(request.contains(&ComponentId::enricher("workspace")));
        assert!(request.contains(&ComponentId::renderer("workspace_files")));

        let order = resolve_order(&registry, &request).unwrap();
        assert!(!order.contains(&ComponentId::indexer("load_resources")));
    }
}
