//! Resource dump file format.
//!
//! A dump is a YAML snapshot of everything the indexers captured, grouped by
//! cluster and resource kind:
//!
//! ```yaml
//! creationDate: 2025-01-01T00:00:00Z
//! description: Resources discovered by workspace builder
//! clusters:
//!   prod:
//!     context: prod-ctx
//!     namespaces: [...]
//!     ingresses: [...]
//!     services: [...]
//!     configMaps: [...]
//!     statefulSets: [...]
//!     replicaSets: [...]
//!     daemonSets: [...]
//!     pods: [...]
//! ```
//!
//! Each list entry is the raw Kubernetes object. Loading a dump and rendering
//! it again reproduces the same groupings; only `creationDate` changes.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use workspacebuilder_shared::{
    KubernetesCluster, KubernetesNamespace, KubernetesResource, ResourceKind, Result,
    WorkspaceBuilderError, metadata_name, metadata_namespace,
};

/// Top-level dump document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDump {
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterDump>,
}

/// Everything captured for one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDump {
    pub context: String,
    #[serde(default)]
    pub namespaces: Vec<Value>,
    #[serde(default)]
    pub ingresses: Vec<Value>,
    #[serde(default)]
    pub services: Vec<Value>,
    #[serde(default)]
    pub config_maps: Vec<Value>,
    #[serde(default)]
    pub stateful_sets: Vec<Value>,
    #[serde(default)]
    pub replica_sets: Vec<Value>,
    #[serde(default)]
    pub daemon_sets: Vec<Value>,
    #[serde(default)]
    pub pods: Vec<Value>,
}

impl ClusterDump {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            ..Self::default()
        }
    }

    /// Objects of one resource kind.
    pub fn resources(&self, kind: ResourceKind) -> &[Value] {
        match kind {
            ResourceKind::Ingress => &self.ingresses,
            ResourceKind::Service => &self.services,
            ResourceKind::ConfigMap => &self.config_maps,
            ResourceKind::StatefulSet => &self.stateful_sets,
            ResourceKind::ReplicaSet => &self.replica_sets,
            ResourceKind::DaemonSet => &self.daemon_sets,
            ResourceKind::Pod => &self.pods,
        }
    }

    pub fn resources_mut(&mut self, kind: ResourceKind) -> &mut Vec<Value> {
        match kind {
            ResourceKind::Ingress => &mut self.ingresses,
            ResourceKind::Service => &mut self.services,
            ResourceKind::ConfigMap => &mut self.config_maps,
            ResourceKind::StatefulSet => &mut self.stateful_sets,
            ResourceKind::ReplicaSet => &mut self.replica_sets,
            ResourceKind::DaemonSet => &mut self.daemon_sets,
            ResourceKind::Pod => &mut self.pods,
        }
    }

    /// Total number of captured objects, namespaces included.
    pub fn object_count(&self) -> usize {
        self.namespaces.len()
            + ResourceKind::ALL
                .iter()
                .map(|k| self.resources(*k).len())
                .sum::<usize>()
    }
}

impl ResourceDump {
    /// An empty dump stamped with the current time.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            creation_date: Utc::now(),
            description: description.into(),
            clusters: BTreeMap::new(),
        }
    }

    // ---- Graph conversion ----

    /// Build a dump from graph entities. Namespaces and resources whose
    /// cluster is not in `clusters` are dropped.
    pub fn from_entities(
        description: impl Into<String>,
        clusters: &[KubernetesCluster],
        namespaces: &[KubernetesNamespace],
        resources: &[KubernetesResource],
    ) -> Self {
        let mut dump = Self::new(description);
        for cluster in clusters {
            dump.clusters
                .insert(cluster.name.clone(), ClusterDump::new(&cluster.context));
        }
        for ns in namespaces {
            if let Some(cd) = dump.clusters.get_mut(&ns.cluster) {
                cd.namespaces.push(ns.resource.clone());
            }
        }
        for res in resources {
            if let Some(cd) = dump.clusters.get_mut(&res.cluster) {
                cd.resources_mut(res.kind).push(res.resource.clone());
            }
        }
        dump
    }

    /// Clusters in the dump as graph entities.
    pub fn cluster_entities(&self) -> Vec<KubernetesCluster> {
        self.clusters
            .iter()
            .map(|(name, cd)| KubernetesCluster {
                name: name.clone(),
                context: cd.context.clone(),
            })
            .collect()
    }

    /// Namespaces in the dump as graph entities (no LOD assigned yet).
    pub fn namespace_entities(&self) -> Result<Vec<KubernetesNamespace>> {
        let mut out = Vec::new();
        for (cluster, cd) in &self.clusters {
            for (i, ns) in cd.namespaces.iter().enumerate() {
                let name = metadata_name(ns).ok_or_else(|| missing_name(cluster, "namespaces", i))?;
                out.push(KubernetesNamespace {
                    cluster: cluster.clone(),
                    name: name.to_string(),
                    lod: None,
                    resource: ns.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Non-namespace objects in the dump as graph entities.
    pub fn resource_entities(&self) -> Result<Vec<KubernetesResource>> {
        let mut out = Vec::new();
        for (cluster, cd) in &self.clusters {
            for kind in ResourceKind::ALL {
                for (i, obj) in cd.resources(kind).iter().enumerate() {
                    let name = metadata_name(obj)
                        .ok_or_else(|| missing_name(cluster, section_name(kind), i))?;
                    out.push(KubernetesResource {
                        cluster: cluster.clone(),
                        kind,
                        namespace: metadata_namespace(obj).map(String::from),
                        name: name.to_string(),
                        resource: obj.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    // ---- Validation ----

    /// Check that every captured object carries `metadata.name`.
    pub fn validate(&self) -> Result<()> {
        for (cluster, cd) in &self.clusters {
            if cd.context.trim().is_empty() {
                return Err(WorkspaceBuilderError::dump(format!(
                    "cluster '{cluster}' has no context"
                )));
            }
            for (i, ns) in cd.namespaces.iter().enumerate() {
                if metadata_name(ns).is_none() {
                    return Err(missing_name(cluster, "namespaces", i));
                }
            }
            for kind in ResourceKind::ALL {
                for (i, obj) in cd.resources(kind).iter().enumerate() {
                    if metadata_name(obj).is_none() {
                        return Err(missing_name(cluster, section_name(kind), i));
                    }
                }
            }
        }
        Ok(())
    }

    // ---- YAML I/O ----

    /// Parse and validate a dump from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let dump: Self = serde_yaml::from_str(text)
            .map_err(|e| WorkspaceBuilderError::dump(format!("invalid YAML: {e}")))?;
        dump.validate()?;
        Ok(dump)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| WorkspaceBuilderError::dump(format!("serialize: {e}")))
    }

    /// Load a dump file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| WorkspaceBuilderError::io(path, e))?;
        let dump = Self::from_yaml(&text)?;
        debug!(
            path = %path.display(),
            clusters = dump.clusters.len(),
            "resource dump loaded"
        );
        Ok(dump)
    }

    /// Write a dump file, via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = self.to_yaml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| WorkspaceBuilderError::io(parent, e))?;
            }
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WorkspaceBuilderError::dump(format!("invalid dump path {path:?}")))?;
        let temp = path.with_file_name(format!(".{file_name}.tmp"));
        std::fs::write(&temp, yaml).map_err(|e| WorkspaceBuilderError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| WorkspaceBuilderError::io(path, e))?;
        Ok(())
    }
}

/// The YAML key holding a resource kind's objects.
pub fn section_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Ingress => "ingresses",
        ResourceKind::Service => "services",
        ResourceKind::ConfigMap => "configMaps",
        ResourceKind::StatefulSet => "statefulSets",
        ResourceKind::ReplicaSet => "replicaSets",
        ResourceKind::DaemonSet => "daemonSets",
        ResourceKind::Pod => "pods",
    }
}

fn missing_name(cluster: &str, section: &str, index: usize) -> WorkspaceBuilderError {
    WorkspaceBuilderError::dump(format!(
        "clusters.{cluster}.{section}[{index}] has no metadata.name"
    ))
}
