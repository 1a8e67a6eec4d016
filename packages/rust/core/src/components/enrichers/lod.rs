//! `enricher:lod`: assigns a level of detail to every namespace.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use workspacebuilder_shared::{KubernetesNamespace, Lod, Result, WorkspaceBuilderError};
use workspacebuilder_storage::Repository;

use crate::component::{ComponentInfo, Enricher};
use crate::components::DEFAULT_LOD;
use crate::context::Context;
use crate::setting::{Setting, SettingDependency, SettingType};

static NAMESPACE_LODS: Setting = Setting::new(
    "NAMESPACE_LODS",
    "NAMESPACE_LODS",
    SettingType::Dict,
    "JSON object mapping namespace (or cluster/namespace) to a level of detail",
)
.with_default("{}");

static SETTINGS: &[SettingDependency] = &[
    SettingDependency::optional(&NAMESPACE_LODS),
    SettingDependency::optional(&DEFAULT_LOD),
];

pub struct LodEnricher;

impl ComponentInfo for LodEnricher {
    fn name(&self) -> &'static str {
        "lod"
    }

    fn documentation(&self) -> &'static str {
        "Sets each namespace's level of detail from NAMESPACE_LODS, falling back to DEFAULT_LOD."
    }

    fn settings(&self) -> &'static [SettingDependency] {
        SETTINGS
    }
}

#[async_trait]
impl Enricher for LodEnricher {
    async fn enrich(&self, ctx: &Context) -> Result<()> {
        let overrides = ctx.setting_dict(NAMESPACE_LODS.name)?;
        let default = lod_setting(ctx.setting_int(DEFAULT_LOD.name)?.unwrap_or(2))?;

        let repo = ctx.graph().namespaces();
        let mut excluded = 0usize;
        let namespaces = repo.all().await?;
        for mut namespace in namespaces {
            let lod = match overrides.and_then(|o| lookup(o, &namespace)) {
                Some(value) => lod_from_json(&namespace, value)?,
                None => default,
            };
            if !lod.is_included() {
                excluded += 1;
            }
            debug!(cluster = %namespace.cluster, namespace = %namespace.name, %lod, "lod assigned");
            namespace.lod = Some(lod);
            repo.save(&namespace).await?;
        }

        info!(%default, excluded, "namespace levels of detail assigned");
        Ok(())
    }
}

/// `cluster/namespace` wins over a bare `namespace` key.
fn lookup<'a>(overrides: &'a Map<String, Value>, ns: &KubernetesNamespace) -> Option<&'a Value> {
    overrides
        .get(&format!("{}/{}", ns.cluster, ns.name))
        .or_else(|| overrides.get(&ns.name))
}

fn lod_setting(raw: i64) -> Result<Lod> {
    Lod::try_from(raw).map_err(|e| WorkspaceBuilderError::setting_type(DEFAULT_LOD.name, e))
}

fn lod_from_json(ns: &KubernetesNamespace, value: &Value) -> Result<Lod> {
    let raw = value.as_i64().ok_or_else(|| {
        WorkspaceBuilderError::setting_type(
            NAMESPACE_LODS.name,
            format!("level of detail for '{}' must be an integer", ns.name),
        )
    })?;
    Lod::try_from(raw).map_err(|e| WorkspaceBuilderError::setting_type(NAMESPACE_LODS.name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::context::test_support::{seed_clusters, test_context};
    use serde_json::json;
    use workspacebuilder_shared::SettingsSource;
    use workspacebuilder_storage::NamespaceKey;

    async fn seeded(source: SettingsSource) -> Context {
        let mut reg = ComponentRegistry::new();
        reg.register_enricher(LodEnricher).unwrap();
        let (ctx, _) = test_context(&reg, &source).await;
        seed_clusters(ctx.graph(), &["prod", "dev"]).await;
        for (cluster, name) in [("prod", "shop"), ("prod", "kube-system"), ("dev", "shop")] {
            ctx.graph()
                .namespaces()
                .save(&KubernetesNamespace {
                    cluster: cluster.into(),
                    name: name.into(),
                    lod: None,
                    resource: json!({"metadata": {"name": name}}),
                })
                .await
                .unwrap();
        }
        ctx
    }

    async fn lod_of(ctx: &Context, cluster: &str, name: &str) -> Option<Lod> {
        ctx.graph()
            .namespaces()
            .get(&NamespaceKey::new(cluster, name))
            .await
            .unwrap()
            .unwrap()
            .lod
    }

    #[tokio::test]
    async fn defaults_and_overrides() {
        let source = SettingsSource::from_pairs([(
            "NAMESPACE_LODS",
            r#"{"kube-system": 0, "dev/shop": 1}"#,
        )]);
        let ctx = seeded(source).await;
        LodEnricher.enrich(&ctx).await.unwrap();

        assert_eq!(lod_of(&ctx, "prod", "shop").await, Some(Lod::DETAILED));
        assert_eq!(lod_of(&ctx, "prod", "kube-system").await, Some(Lod::NONE));
        assert_eq!(lod_of(&ctx, "dev", "shop").await, Some(Lod::BASIC));
    }

    #[tokio::test]
    async fn default_lod_setting_applies() {
        let ctx = seeded(SettingsSource::from_pairs([("DEFAULT_LOD", "1")])).await;
        LodEnricher.enrich(&ctx).await.unwrap();
        assert_eq!(lod_of(&ctx, "prod", "shop").await, Some(Lod::BASIC));
    }

    #[tokio::test]
    async fn out_of_range_lod_rejected() {
        let ctx = seeded(SettingsSource::from_pairs([("NAMESPACE_LODS", r#"{"shop": 7}"#)])).await;
        let err = LodEnricher.enrich(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("NAMESPACE_LODS"));
    }
}
