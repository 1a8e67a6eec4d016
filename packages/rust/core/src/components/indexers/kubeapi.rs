//! `indexer:kubeapi`: captures live cluster state.
//!
//! Fetching is delegated to a [`ResourceSource`]; the default source shells
//! out to `kubectl`. Every list call for a cluster runs as its own task,
//! bounded by a shared semaphore, and results are saved to the graph
//! sequentially once all of a cluster's fetches are in.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use workspacebuilder_shared::{
    KubernetesCluster, KubernetesNamespace, KubernetesResource, ResourceKind, Result,
    WorkspaceBuilderError, metadata_name, metadata_namespace,
};
use workspacebuilder_storage::Repository;

use crate::component::{ComponentInfo, Indexer};
use crate::context::Context;
use crate::setting::{Setting, SettingDependency, SettingType};

static KUBERNETES_CONTEXTS: Setting = Setting::new(
    "KUBERNETES_CONTEXTS",
    "KUBERNETES_CONTEXTS",
    SettingType::Dict,
    "JSON object mapping cluster name to kubeconfig context",
);

static KUBECONFIG: Setting = Setting::new(
    "KUBECONFIG",
    "KUBECONFIG",
    SettingType::File,
    "Kubeconfig file passed to kubectl",
);

static KUBEAPI_MAX_CONCURRENCY: Setting = Setting::new(
    "KUBEAPI_MAX_CONCURRENCY",
    "KUBEAPI_MAX_CONCURRENCY",
    SettingType::Integer,
    "Maximum concurrent list calls against the Kubernetes API",
)
.with_default("4");

static SETTINGS: &[SettingDependency] = &[
    SettingDependency::required(&KUBERNETES_CONTEXTS),
    SettingDependency::optional(&KUBECONFIG),
    SettingDependency::optional(&KUBEAPI_MAX_CONCURRENCY),
];

// ---------------------------------------------------------------------------
// Resource sources
// ---------------------------------------------------------------------------

/// One cluster to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTarget {
    pub cluster: String,
    pub context: String,
    pub kubeconfig: Option<PathBuf>,
}

/// Lists raw objects from a cluster.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// All objects of the API resource `plural` (`namespaces`, `pods`, ...)
    /// across every namespace of the target cluster.
    async fn list(&self, target: &ClusterTarget, plural: &str) -> Result<Vec<Value>>;
}

/// Runs `kubectl get <plural> --all-namespaces -o json`.
#[derive(Debug, Clone)]
pub struct KubectlSource {
    program: String,
}

impl KubectlSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for KubectlSource {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

#[async_trait]
impl ResourceSource for KubectlSource {
    async fn list(&self, target: &ClusterTarget, plural: &str) -> Result<Vec<Value>> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("--context").arg(&target.context);
        if let Some(kubeconfig) = &target.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(["get", plural, "--all-namespaces", "-o", "json"])
            .kill_on_drop(true);

        debug!(program = %self.program, context = %target.context, plural, "listing resources");
        let output = cmd.output().await.map_err(|e| {
            WorkspaceBuilderError::ExternalSystem(format!(
                "failed to run {}: {e}. Is it installed?",
                self.program
            ))
        })?;

        if !output.status.success() {
            return Err(WorkspaceBuilderError::ExternalSystem(format!(
                "{} get {plural} (context {}) exited with {}: {}",
                self.program,
                target.context,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_item_list(&output.stdout)
    }
}

/// Extract `items` from a Kubernetes `List` object.
pub(crate) fn parse_item_list(raw: &[u8]) -> Result<Vec<Value>> {
    let list: Value = serde_json::from_slice(raw).map_err(|e| {
        WorkspaceBuilderError::ExternalSystem(format!("invalid list response: {e}"))
    })?;
    match list.get("items") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(WorkspaceBuilderError::ExternalSystem(
            "list response has no items array".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// Captured objects per list call; `None` is the namespace list.
type Fetched = Vec<(Option<ResourceKind>, Vec<Value>)>;

pub struct KubeApiIndexer {
    source: Arc<dyn ResourceSource>,
}

impl KubeApiIndexer {
    pub fn new(source: impl ResourceSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

impl Default for KubeApiIndexer {
    fn default() -> Self {
        Self::new(KubectlSource::default())
    }
}

impl ComponentInfo for KubeApiIndexer {
    fn name(&self) -> &'static str {
        "kubeapi"
    }

    fn documentation(&self) -> &'static str {
        "Captures namespaces and workloads from live clusters through the Kubernetes API."
    }

    fn settings(&self) -> &'static [SettingDependency] {
        SETTINGS
    }
}

#[async_trait]
impl Indexer for KubeApiIndexer {
    async fn index(&self, ctx: &Context) -> Result<()> {
        let targets = cluster_targets(ctx)?;
        let limit = ctx.setting_int(KUBEAPI_MAX_CONCURRENCY.name)?.unwrap_or(4);
        let semaphore = Arc::new(Semaphore::new(fetch_permits(limit)?));

        for target in targets {
            ctx.check_cancelled()?;
            index_cluster(ctx, self.source.clone(), semaphore.clone(), &target).await?;
        }
        Ok(())
    }
}

/// Permits for the fetch limiter: between 1 and [`Semaphore::MAX_PERMITS`].
fn fetch_permits(limit: i64) -> Result<usize> {
    usize::try_from(limit)
        .ok()
        .filter(|permits| (1..=Semaphore::MAX_PERMITS).contains(permits))
        .ok_or_else(|| {
            WorkspaceBuilderError::setting_type(
                KUBEAPI_MAX_CONCURRENCY.name,
                format!(
                    "must be between 1 and {}, got {limit}",
                    Semaphore::MAX_PERMITS
                ),
            )
        })
}

fn cluster_targets(ctx: &Context) -> Result<Vec<ClusterTarget>> {
    let contexts = ctx.require_dict(KUBERNETES_CONTEXTS.name)?;
    let kubeconfig = ctx.setting_path(KUBECONFIG.name)?.map(|p| p.to_path_buf());

    contexts
        .iter()
        .map(|(cluster, value)| {
            let context = value.as_str().ok_or_else(|| {
                WorkspaceBuilderError::setting_type(
                    KUBERNETES_CONTEXTS.name,
                    format!("context for cluster '{cluster}' must be a string"),
                )
            })?;
            Ok(ClusterTarget {
                cluster: cluster.clone(),
                context: context.to_string(),
                kubeconfig: kubeconfig.clone(),
            })
        })
        .collect()
}

#[instrument(skip_all, fields(cluster = %target.cluster, context = %target.context))]
async fn index_cluster(
    ctx: &Context,
    source: Arc<dyn ResourceSource>,
    semaphore: Arc<Semaphore>,
    target: &ClusterTarget,
) -> Result<()> {
    ctx.graph()
        .clusters()
        .save(&KubernetesCluster {
            name: target.cluster.clone(),
            context: target.context.clone(),
        })
        .await?;

    let fetched = match fetch_cluster(source, semaphore, target).await {
        Ok(fetched) => fetched,
        Err(e) => {
            warn!(error = %e, "cluster fetch failed, recording no resources");
            return Ok(());
        }
    };

    let mut namespaces = 0usize;
    let mut resources = 0usize;
    for (kind, items) in fetched {
        for item in items {
            let Some(name) = metadata_name(&item).map(String::from) else {
                warn!(kind = kind.map_or("namespace", |k| k.as_str()), "object without metadata.name, skipping");
                continue;
            };
            match kind {
                None => {
                    ctx.graph()
                        .namespaces()
                        .save(&KubernetesNamespace {
                            cluster: target.cluster.clone(),
                            name,
                            lod: None,
                            resource: item,
                        })
                        .await?;
                    namespaces += 1;
                }
                Some(kind) => {
                    let namespace = metadata_namespace(&item).map(String::from);
                    ctx.graph()
                        .resources()
                        .save(&KubernetesResource {
                            cluster: target.cluster.clone(),
                            kind,
                            namespace,
                            name,
                            resource: item,
                        })
                        .await?;
                    resources += 1;
                }
            }
        }
    }

    info!(namespaces, resources, "cluster indexed");
    Ok(())
}

/// Run every list call for one cluster, at most `semaphore` permits at a time.
async fn fetch_cluster(
    source: Arc<dyn ResourceSource>,
    semaphore: Arc<Semaphore>,
    target: &ClusterTarget,
) -> Result<Fetched> {
    let kinds = std::iter::once(None).chain(ResourceKind::ALL.into_iter().map(Some));

    // Dropping the set on an early return aborts the fetches still running.
    let mut tasks = JoinSet::new();
    for (position, kind) in kinds.enumerate() {
        let source = source.clone();
        let sem = semaphore.clone();
        let target = target.clone();

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await.map_err(|e| {
                WorkspaceBuilderError::ExternalSystem(format!("fetch limiter closed: {e}"))
            })?;
            let plural = kind.map_or("namespaces", |k: ResourceKind| k.api_plural());
            let items = source.list(&target, plural).await?;
            Ok::<_, WorkspaceBuilderError>((position, kind, items))
        });
    }

    let mut fetched = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| {
            WorkspaceBuilderError::ExternalSystem(format!("fetch task failed: {e}"))
        })?;
        fetched.push(result?);
    }
    fetched.sort_by_key(|(position, _, _)| *position);
    let fetched = fetched
        .into_iter()
        .map(|(_, kind, items)| (kind, items))
        .collect();
    Ok(fetched)
}
