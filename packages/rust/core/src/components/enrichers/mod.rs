//! Enrichers: annotate and derive graph state after indexing.

mod lod;
mod workspace;

pub use lod::LodEnricher;
pub use workspace::{WorkspaceEnricher, slx_name};
