//! Component pipeline orchestration for the workspace builder.
//!
//! Indexers, enrichers and renderers are registered into a
//! [`ComponentRegistry`] with the settings and upstream components they
//! declare. A [`Pipeline`] resolves the requested closure into a
//! deterministic order, validates every setting up front and then runs the
//! three phases against one shared [`Context`].

pub mod component;
pub mod components;
pub mod context;
pub mod order;
pub mod outputter;
pub mod pipeline;
pub mod setting;

pub use component::{
    ComponentDependency, ComponentInfo, ComponentRegistry, Enricher, EntryPoint, Indexer,
    RegisteredComponent, Renderer,
};
pub use components::{builtin_registry, default_request, register_builtin};
pub use context::{Context, ResolvedSettings};
pub use order::resolve_order;
pub use outputter::{DirectoryOutputter, MemoryOutputter, Outputter};
pub use pipeline::{
    ComponentFailure, ComponentOutcome, FailurePolicy, Pipeline, PipelineOptions,
    ProgressReporter, RunReport, SilentProgress,
};
pub use setting::{Setting, SettingDependency, SettingRegistry, SettingType, SettingValue};
