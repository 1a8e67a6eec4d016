//! `renderer:dump_resources`: writes the graph as a resource dump.

use async_trait::async_trait;
use tracing::info;

use workspacebuilder_dump::ResourceDump;
use workspacebuilder_shared::Result;
use workspacebuilder_storage::Repository;

use crate::component::{ComponentInfo, Renderer};
use crate::context::Context;
use crate::setting::{Setting, SettingDependency, SettingType};

static RESOURCE_DUMP_FILE: Setting = Setting::new(
    "RESOURCE_DUMP_FILE",
    "RESOURCE_DUMP_FILE",
    SettingType::String,
    "Output path of the resource dump, relative to the output directory",
)
.with_default("resource-dump.yaml");

static RESOURCE_DUMP_DESCRIPTION: Setting = Setting::new(
    "RESOURCE_DUMP_DESCRIPTION",
    "RESOURCE_DUMP_DESCRIPTION",
    SettingType::String,
    "Description recorded in the resource dump",
)
.with_default("Resources discovered by workspace builder");

static SETTINGS: &[SettingDependency] = &[
    SettingDependency::optional(&RESOURCE_DUMP_FILE),
    SettingDependency::optional(&RESOURCE_DUMP_DESCRIPTION),
];

pub struct DumpResourcesRenderer;

impl ComponentInfo for DumpResourcesRenderer {
    fn name(&self) -> &'static str {
        "dump_resources"
    }

    fn documentation(&self) -> &'static str {
        "Writes every indexed cluster, namespace and resource to a YAML resource dump."
    }

    fn settings(&self) -> &'static [SettingDependency] {
        SETTINGS
    }
}

#[async_trait]
impl Renderer for DumpResourcesRenderer {
    async fn render(&self, ctx: &Context) -> Result<()> {
        let file = ctx.require_str(RESOURCE_DUMP_FILE.name)?;
        let description = ctx.require_str(RESOURCE_DUMP_DESCRIPTION.name)?;

        let graph = ctx.graph();
        let clusters = graph.clusters().all().await?;
        let namespaces = graph.namespaces().all().await?;
        let resources = graph.resources().all().await?;

        let dump = ResourceDump::from_entities(description, &clusters, &namespaces, &resources);
        let path = ctx.outputter().write_file(file, dump.to_yaml()?.as_bytes())?;

        info!(
            path = %path.display(),
            clusters = clusters.len(),
            namespaces = namespaces.len(),
            resources = resources.len(),
            "resource dump written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::context::test_support::test_context;
    use serde_json::json;
    use workspacebuilder_shared::{KubernetesCluster, KubernetesNamespace, SettingsSource};

    #[tokio::test]
    async fn rendered_dump_loads_back() {
        let mut reg = ComponentRegistry::new();
        reg.register_renderer(DumpResourcesRenderer).unwrap();
        let (ctx, out) = test_context(&reg, &SettingsSource::empty()).await;

        let graph = ctx.graph();
        graph
            .clusters()
            .save(&KubernetesCluster {
                name: "prod".into(),
                context: "prod-ctx".into(),
            })
            .await
            .unwrap();
        graph
            .namespaces()
            .save(&KubernetesNamespace {
                cluster: "prod".into(),
                name: "shop".into(),
                lod: None,
                resource: json!({"metadata": {"name": "shop"}}),
            })
            .await
            .unwrap();

        DumpResourcesRenderer.render(&ctx).await.unwrap();

        let yaml = String::from_utf8(out.file("resource-dump.yaml").unwrap()).unwrap();
        let loaded = ResourceDump::from_yaml(&yaml).unwrap();
        assert_eq!(loaded.description, "Resources discovered by workspace builder");
        assert_eq!(loaded.clusters["prod"].context, "prod-ctx");

        let namespaces = loaded.namespace_entities().unwrap();
        assert_eq!(namespaces.len(), 1);
        assert_eq!((namespaces[0].cluster.as_str(), namespaces[0].name.as_str()), ("prod", "shop"));
    }
}
