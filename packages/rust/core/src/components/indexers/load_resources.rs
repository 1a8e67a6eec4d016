//! `indexer:load_resources`: replays a previously rendered resource dump.

use async_trait::async_trait;
use tracing::info;

use workspacebuilder_dump::ResourceDump;
use workspacebuilder_shared::Result;
use workspacebuilder_storage::Repository;

use crate::component::{ComponentInfo, Indexer};
use crate::components::RESOURCE_DUMP_PROPERTY;
use crate::context::Context;
use crate::setting::{Setting, SettingDependency, SettingType};

static RESOURCE_LOAD_FILE: Setting = Setting::new(
    "RESOURCE_LOAD_FILE",
    "RESOURCE_LOAD_FILE",
    SettingType::File,
    "Resource dump file to load instead of querying clusters",
);

static SETTINGS: &[SettingDependency] = &[SettingDependency::required(&RESOURCE_LOAD_FILE)];

pub struct LoadResourcesIndexer;

impl ComponentInfo for LoadResourcesIndexer {
    fn name(&self) -> &'static str {
        "load_resources"
    }

    fn documentation(&self) -> &'static str {
        "Loads clusters, namespaces and resources from a resource dump file."
    }

    fn settings(&self) -> &'static [SettingDependency] {
        SETTINGS
    }
}

#[async_trait]
impl Indexer for LoadResourcesIndexer {
    async fn index(&self, ctx: &Context) -> Result<()> {
        let path = ctx.require_path(RESOURCE_LOAD_FILE.name)?;
        let dump = ResourceDump::load(path)?;

        let graph = ctx.graph();
        for cluster in dump.cluster_entities() {
            graph.clusters().save(&cluster).await?;
        }
        let namespaces = dump.namespace_entities()?;
        for namespace in &namespaces {
            ctx.check_cancelled()?;
            graph.namespaces().save(namespace).await?;
        }
        let resources = dump.resource_entities()?;
        for resource in &resources {
            graph.resources().save(resource).await?;
        }

        info!(
            path = %path.display(),
            clusters = dump.clusters.len(),
            namespaces = namespaces.len(),
            resources = resources.len(),
            "resource dump loaded into graph"
        );
        ctx.set_property(RESOURCE_DUMP_PROPERTY, dump);
        Ok(())
    }
}
