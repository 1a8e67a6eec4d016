//! `renderer:workspace_files`: writes workspace and SLX manifests.
//!
//! Layout under the output directory:
//!
//! ```text
//! workspaces/<workspace>/workspace.yaml
//! workspaces/<workspace>/slxs/<slx>/slx.yaml
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use workspacebuilder_shared::{Result, RunWhenWorkspace, Slx, WorkspaceBuilderError};
use workspacebuilder_storage::Repository;

use crate::component::{ComponentDependency, ComponentInfo, Renderer};
use crate::context::Context;

static DEPENDENCIES: &[ComponentDependency] = &[ComponentDependency::enricher("workspace")];

const API_VERSION: &str = "runwhen.com/v1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: S,
}

#[derive(Debug, Serialize)]
struct Metadata {
    name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    owners: Vec<String>,
    default_lod: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SlxSpec {
    cluster_name: String,
    namespace: String,
    lod: u8,
}

pub struct WorkspaceFilesRenderer;

impl ComponentInfo for WorkspaceFilesRenderer {
    fn name(&self) -> &'static str {
        "workspace_files"
    }

    fn documentation(&self) -> &'static str {
        "Writes workspace.yaml and one slx.yaml per SLX under workspaces/<name>/."
    }

    fn dependencies(&self) -> &'static [ComponentDependency] {
        DEPENDENCIES
    }
}

#[async_trait]
impl Renderer for WorkspaceFilesRenderer {
    async fn render(&self, ctx: &Context) -> Result<()> {
        let graph = ctx.graph();
        for workspace in graph.workspaces().all().await? {
            ctx.check_cancelled()?;
            let base = format!("workspaces/{}", workspace.name);
            ctx.outputter().write_file(
                &format!("{base}/workspace.yaml"),
                to_yaml(&workspace_manifest(&workspace))?.as_bytes(),
            )?;

            let slxs = graph.slxs().in_workspace(&workspace.name).await?;
            for slx in &slxs {
                ctx.outputter().write_file(
                    &format!("{base}/slxs/{}/slx.yaml", slx.name),
                    to_yaml(&slx_manifest(slx))?.as_bytes(),
                )?;
            }
            info!(workspace = %workspace.name, slxs = slxs.len(), "workspace files written");
        }
        Ok(())
    }
}

fn workspace_manifest(workspace: &RunWhenWorkspace) -> Manifest<WorkspaceSpec> {
    Manifest {
        api_version: API_VERSION,
        kind: "Workspace",
        metadata: Metadata {
            name: workspace.name.clone(),
            labels: BTreeMap::new(),
        },
        spec: WorkspaceSpec {
            owners: workspace.owner_email.iter().cloned().collect(),
            default_lod: workspace.default_lod.0,
        },
    }
}

fn slx_manifest(slx: &Slx) -> Manifest<SlxSpec> {
    Manifest {
        api_version: API_VERSION,
        kind: "ServiceLevelX",
        metadata: Metadata {
            name: slx.name.clone(),
            labels: BTreeMap::from([("workspace".to_string(), slx.workspace.clone())]),
        },
        spec: SlxSpec {
            cluster_name: slx.cluster.clone(),
            namespace: slx.namespace.clone(),
            lod: slx.lod.0,
        },
    }
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|e| WorkspaceBuilderError::validation(format!("manifest serialization: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::context::test_support::test_context;
    use workspacebuilder_shared::{Lod, SettingsSource};

    #[tokio::test]
    async fn writes_workspace_tree() {
        let reg = ComponentRegistry::new();
        let (ctx, out) = test_context(&reg, &SettingsSource::empty()).await;
        ctx.graph()
            .workspaces()
            .save(&RunWhenWorkspace {
                name: "ops".into(),
                owner_email: Some("ops@example.com".into()),
                default_lod: Lod::DETAILED,
            })
            .await
            .unwrap();
        ctx.graph()
            .slxs()
            .save(&Slx {
                workspace: "ops".into(),
                name: "prod-shop".into(),
                cluster: "prod".into(),
                namespace: "shop".into(),
                lod: Lod::BASIC,
            })
            .await
            .unwrap();

        WorkspaceFilesRenderer.render(&ctx).await.unwrap();

        let ws = String::from_utf8(out.file("workspaces/ops/workspace.yaml").unwrap()).unwrap();
        assert!(ws.contains("kind: Workspace"));
        assert!(ws.contains("ops@example.com"));
        assert!(ws.contains("defaultLod: 2"));

        let slx =
            String::from_utf8(out.file("workspaces/ops/slxs/prod-shop/slx.yaml").unwrap()).unwrap();
        assert!(slx.contains("clusterName: prod"));
        assert!(slx.contains("namespace: shop"));
        assert_eq!(out.file_names().len(), 2);
    }
}
