//! Indexers: populate the graph from a source of truth.

mod kubeapi;
mod load_resources;

pub use kubeapi::{ClusterTarget, KubeApiIndexer, KubectlSource, ResourceSource};
pub use load_resources::LoadResourcesIndexer;
