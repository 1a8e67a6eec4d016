//! Shared types, error model, and configuration for the workspace builder.
//!
//! This crate is the foundation depended on by all other workspace builder crates.
//! It provides:
//! - [`WorkspaceBuilderError`]: the unified error type
//! - Domain types ([`Role`], [`ComponentId`], graph entities, [`ResourceKind`])
//! - Configuration ([`AppConfig`], [`SettingsSource`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, PipelineConfig, SettingsSource, config_dir, config_file_path,
    init_config, load_config, load_config_from, parse_setting_override,
};
pub use error::{Result, WorkspaceBuilderError};
pub use types::{
    ComponentId, KubernetesCluster, KubernetesNamespace, KubernetesResource, Lod, ResourceKind,
    Role, RunWhenWorkspace, Slx, metadata_name, metadata_namespace,
};
