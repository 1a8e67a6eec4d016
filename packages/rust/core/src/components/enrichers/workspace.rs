//! `enricher:workspace`: creates the workspace and one SLX per admitted namespace.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use workspacebuilder_shared::{Lod, Result, RunWhenWorkspace, Slx, WorkspaceBuilderError};
use workspacebuilder_storage::Repository;

use crate::component::{ComponentDependency, ComponentInfo, Enricher};
use crate::components::DEFAULT_LOD;
use crate::context::Context;
use crate::setting::{Setting, SettingDependency, SettingType};

static WORKSPACE_NAME: Setting = Setting::new(
    "WORKSPACE_NAME",
    "WORKSPACE_NAME",
    SettingType::String,
    "Name of the workspace to generate",
);

static WORKSPACE_OWNER_EMAIL: Setting = Setting::new(
    "WORKSPACE_OWNER_EMAIL",
    "WORKSPACE_OWNER_EMAIL",
    SettingType::String,
    "Email address of the workspace owner",
);

static SETTINGS: &[SettingDependency] = &[
    SettingDependency::required(&WORKSPACE_NAME),
    SettingDependency::optional(&WORKSPACE_OWNER_EMAIL),
    SettingDependency::optional(&DEFAULT_LOD),
];

static DEPENDENCIES: &[ComponentDependency] = &[ComponentDependency::enricher("lod")];

/// Longest SLX name emitted.
pub const MAX_SLX_NAME_LEN: usize = 30;

const HASH_SUFFIX_LEN: usize = 6;

pub struct WorkspaceEnricher;

impl ComponentInfo for WorkspaceEnricher {
    fn name(&self) -> &'static str {
        "workspace"
    }

    fn documentation(&self) -> &'static str {
        "Creates the workspace and one SLX for every namespace with a non-zero level of detail."
    }

    fn settings(&self) -> &'static [SettingDependency] {
        SETTINGS
    }

    fn dependencies(&self) -> &'static [ComponentDependency] {
        DEPENDENCIES
    }
}

#[async_trait]
impl Enricher for WorkspaceEnricher {
    async fn enrich(&self, ctx: &Context) -> Result<()> {
        let name = ctx.require_str(WORKSPACE_NAME.name)?.trim().to_string();
        if name.is_empty() {
            return Err(WorkspaceBuilderError::setting_type(
                WORKSPACE_NAME.name,
                "must not be empty",
            ));
        }
        // Renderers use the name as a single directory segment.
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(WorkspaceBuilderError::setting_type(
                WORKSPACE_NAME.name,
                format!("'{name}' is not a valid directory name"),
            ));
        }
        let default_lod = Lod::try_from(ctx.setting_int(DEFAULT_LOD.name)?.unwrap_or(2))
            .map_err(|e| WorkspaceBuilderError::setting_type(DEFAULT_LOD.name, e))?;

        let workspace = RunWhenWorkspace {
            name: name.clone(),
            owner_email: ctx.setting_str(WORKSPACE_OWNER_EMAIL.name)?.map(String::from),
            default_lod,
        };
        let graph = ctx.graph();
        graph.workspaces().save(&workspace).await?;

        let slxs = graph.slxs();
        slxs.delete_for_workspace(&name).await?;

        let mut seen = HashSet::new();
        for namespace in graph.namespaces().all().await? {
            let lod = namespace.lod.unwrap_or(default_lod);
            if !lod.is_included() {
                continue;
            }
            let slx = Slx {
                workspace: name.clone(),
                name: slx_name(&namespace.cluster, &namespace.name),
                cluster: namespace.cluster,
                namespace: namespace.name,
                lod,
            };
            if !seen.insert(slx.name.clone()) {
                warn!(slx = %slx.name, cluster = %slx.cluster, namespace = %slx.namespace, "slx name collision, skipping");
                continue;
            }
            slxs.save(&slx).await?;
        }

        info!(workspace = %name, slxs = seen.len(), "workspace generated");
        Ok(())
    }
}

/// `<cluster>-<namespace>` lowercased with every run of other characters
/// collapsed to `-`. Names longer than [`MAX_SLX_NAME_LEN`] are cut and
/// given a short SHA-256 suffix of the full slug so they stay unique.
pub fn slx_name(cluster: &str, namespace: &str) -> String {
    static NON_ALNUM: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let raw = format!("{cluster}-{namespace}").to_lowercase();
    let slug = NON_ALNUM.replace_all(&raw, "-").trim_matches('-').to_string();
    if slug.len() <= MAX_SLX_NAME_LEN {
        return slug;
    }

    let digest = format!("{:x}", Sha256::digest(slug.as_bytes()));
    let head = slug[..MAX_SLX_NAME_LEN - HASH_SUFFIX_LEN - 1].trim_end_matches('-');
    format!("{head}-{}", &digest[..HASH_SUFFIX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::components::enrichers::LodEnricher;
    use crate::context::test_support::{seed_clusters, test_context};
    use serde_json::json;
    use workspacebuilder_shared::{KubernetesNamespace, SettingsSource};

    #[test]
    fn slx_names_are_slugged() {
        assert_eq!(slx_name("Prod", "shop"), "prod-shop");
        assert_eq!(slx_name("gke_proj_us", "kube.system"), "gke-proj-us-kube-system");
    }

    #[test]
    fn long_names_are_shortened_and_stable() {
        let a = slx_name("production-cluster-europe-west1", "payments-backend");
        let b = slx_name("production-cluster-europe-west1", "payments-frontend");
        assert!(a.len() <= MAX_SLX_NAME_LEN);
        assert_ne!(a, b);
        assert_eq!(a, slx_name("production-cluster-europe-west1", "payments-backend"));
        assert!(a.starts_with("production-cluster-eur"));
    }

    #[tokio::test]
    async fn creates_slx_per_included_namespace() {
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(LodEnricher).unwrap();
        reg.register_enricher(WorkspaceEnricher).unwrap();
        let source = SettingsSource::from_pairs([
            ("WORKSPACE_NAME", "ops"),
            ("WORKSPACE_OWNER_EMAIL", "ops@example.com"),
            ("NAMESPACE_LODS", r#"{"kube-system": 0}"#),
        ]);
        let (ctx, _) = test_context(&reg, &source).await;
        seed_clusters(ctx.graph(), &["prod"]).await;
        for name in ["shop", "kube-system"] {
            ctx.graph()
                .namespaces()
                .save(&KubernetesNamespace {
                    cluster: "prod".into(),
                    name: name.into(),
                    lod: None,
                    resource: json!({"metadata": {"name": name}}),
                })
                .await
                .unwrap();
        }

        LodEnricher.enrich(&ctx).await.unwrap();
        WorkspaceEnricher.enrich(&ctx).await.unwrap();

        let ws = ctx.graph().workspaces().get(&"ops".to_string()).await.unwrap().unwrap();
        assert_eq!(ws.owner_email.as_deref(), Some("ops@example.com"));
        assert_eq!(ws.default_lod, Lod::DETAILED);

        let slxs = ctx.graph().slxs().in_workspace("ops").await.unwrap();
        assert_eq!(slxs.len(), 1);
        assert_eq!(slxs[0].name, "prod-shop");
        assert_eq!(slxs[0].lod, Lod::DETAILED);

        // Re-running replaces rather than accumulates.
        WorkspaceEnricher.enrich(&ctx).await.unwrap();
        assert_eq!(ctx.graph().slxs().all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn workspace_name_must_be_one_path_segment() {
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(LodEnricher).unwrap();
        reg.register_enricher(WorkspaceEnricher).unwrap();

        for bad in ["a/b", "..", r"ops\prod"] {
            let source = SettingsSource::from_pairs([("WORKSPACE_NAME", bad)]);
            let (ctx, _) = test_context(&reg, &source).await;
            let err = WorkspaceEnricher.enrich(&ctx).await.unwrap_err();
            assert!(matches!(err, WorkspaceBuilderError::SettingType { .. }), "{bad}");
            assert!(ctx.graph().workspaces().all().await.unwrap().is_empty());
        }
    }
}
