//! Core domain types: component identity and graph entities.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The role a component plays in a pipeline run.
///
/// Roles are ordered by execution phase: every indexer runs before any
/// enricher, every enricher before any renderer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Indexer,
    Enricher,
    Renderer,
}

impl Role {
    /// All roles in execution order.
    pub const ALL: [Role; 3] = [Role::Indexer, Role::Enricher, Role::Renderer];

    /// Role name as used in component identifiers (`indexer`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexer => "indexer",
            Self::Enricher => "enricher",
            Self::Renderer => "renderer",
        }
    }

    /// Name of the phase this role executes in (`index`, `enrich`, `render`).
    pub fn phase_name(&self) -> &'static str {
        match self {
            Self::Indexer => "index",
            Self::Enricher => "enrich",
            Self::Renderer => "render",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "indexer" | "index" => Ok(Self::Indexer),
            "enricher" | "enrich" => Ok(Self::Enricher),
            "renderer" | "render" => Ok(Self::Renderer),
            other => Err(format!(
                "unknown role '{other}': expected indexer, enricher or renderer"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Identity of a registered component: `(role, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub role: Role,
    pub name: String,
}

impl ComponentId {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
        }
    }

    pub fn indexer(name: impl Into<String>) -> Self {
        Self::new(Role::Indexer, name)
    }

    pub fn enricher(name: impl Into<String>) -> Self {
        Self::new(Role::Enricher, name)
    }

    pub fn renderer(name: impl Into<String>) -> Self {
        Self::new(Role::Renderer, name)
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.role, self.name)
    }
}

impl std::str::FromStr for ComponentId {
    type Err = String;

    /// Parse `role:name`, e.g. `indexer:kubeapi`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (role, name) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid component '{s}': expected <role>:<name>"))?;
        if name.is_empty() {
            return Err(format!("invalid component '{s}': empty name"));
        }
        Ok(Self::new(role.parse()?, name))
    }
}

// ---------------------------------------------------------------------------
// Level of detail
// ---------------------------------------------------------------------------

/// Level-of-detail annotation controlling how much is generated for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lod(pub u8);

impl Lod {
    /// Entity is excluded from generated output.
    pub const NONE: Lod = Lod(0);
    pub const BASIC: Lod = Lod(1);
    pub const DETAILED: Lod = Lod(2);

    /// Whether entities at this level produce any output at all.
    pub fn is_included(&self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<i64> for Lod {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0..=2 => Ok(Lod(value as u8)),
            other => Err(format!("level of detail must be 0, 1 or 2 (got {other})")),
        }
    }
}

impl std::fmt::Display for Lod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Resource kinds
// ---------------------------------------------------------------------------

/// Namespaced Kubernetes resource kinds captured by the indexers.
///
/// Namespaces themselves are modeled separately as [`KubernetesNamespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Ingress,
    Service,
    ConfigMap,
    StatefulSet,
    ReplicaSet,
    DaemonSet,
    Pod,
}

impl ResourceKind {
    /// All kinds, in resource dump field order.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Ingress,
        ResourceKind::Service,
        ResourceKind::ConfigMap,
        ResourceKind::StatefulSet,
        ResourceKind::ReplicaSet,
        ResourceKind::DaemonSet,
        ResourceKind::Pod,
    ];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Service => "service",
            Self::ConfigMap => "configmap",
            Self::StatefulSet => "statefulset",
            Self::ReplicaSet => "replicaset",
            Self::DaemonSet => "daemonset",
            Self::Pod => "pod",
        }
    }

    /// Plural resource name accepted by `kubectl get`.
    pub fn api_plural(&self) -> &'static str {
        match self {
            Self::Ingress => "ingresses",
            Self::Service => "services",
            Self::ConfigMap => "configmaps",
            Self::StatefulSet => "statefulsets",
            Self::ReplicaSet => "replicasets",
            Self::DaemonSet => "daemonsets",
            Self::Pod => "pods",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Graph entities
// ---------------------------------------------------------------------------

/// A Kubernetes cluster known to the workspace builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    /// Cluster name (unique).
    pub name: String,
    /// Kubeconfig context used to reach the cluster.
    pub context: String,
}

/// A namespace inside a cluster. Identity: `(cluster, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesNamespace {
    pub cluster: String,
    pub name: String,
    /// Level of detail, set by the LOD enricher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lod: Option<Lod>,
    /// Raw captured namespace object.
    pub resource: serde_json::Value,
}

/// Any other namespaced resource. Identity: `(cluster, kind, namespace, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesResource {
    pub cluster: String,
    pub kind: ResourceKind,
    /// Owning namespace (absent for cluster-scoped objects).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    /// Raw captured object.
    pub resource: serde_json::Value,
}

/// The RunWhen workspace the builder generates output for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunWhenWorkspace {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    pub default_lod: Lod,
}

/// A service-level unit owned by a workspace, generated per admitted namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slx {
    pub workspace: String,
    pub name: String,
    pub cluster: String,
    pub namespace: String,
    pub lod: Lod,
}

/// Read `metadata.name` from a raw Kubernetes object.
pub fn metadata_name(resource: &serde_json::Value) -> Option<&str> {
    resource.pointer("/metadata/name").and_then(|v| v.as_str())
}

/// Read `metadata.namespace` from a raw Kubernetes object.
pub fn metadata_namespace(resource: &serde_json::Value) -> Option<&str> {
    resource
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str())
}
