//! Renderers: produce output from the final graph.

mod debug;
mod dump_resources;
mod workspace_files;

pub use debug::DebugRenderer;
pub use dump_resources::DumpResourcesRenderer;
pub use workspace_files::WorkspaceFilesRenderer;
