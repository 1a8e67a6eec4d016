//! Error types for the workspace builder.
//!
//! Library crates use [`WorkspaceBuilderError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::{ComponentId, Role};

/// Top-level error type for all workspace builder operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceBuilderError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Two different settings were registered under the same name.
    #[error("duplicate setting '{name}'")]
    DuplicateSetting { name: String },

    /// A raw setting value could not be converted to the declared type.
    #[error("setting '{name}' has an invalid value: {message}")]
    SettingType { name: String, message: String },

    /// A required setting has neither a value nor a default.
    #[error("required setting '{name}' (key {key}) is not set{}", required_by_suffix(.required_by))]
    MissingRequiredSetting {
        name: String,
        key: String,
        required_by: Option<ComponentId>,
    },

    /// A setting lookup for a name nobody declared.
    #[error("unknown setting '{name}'")]
    UnknownSetting { name: String },

    /// Two components were registered under the same (role, name).
    #[error("duplicate component {id}")]
    DuplicateComponent { id: ComponentId },

    /// An operator requested a component that is not registered.
    #[error("component {id} is not registered")]
    ComponentNotFound { id: ComponentId },

    /// A declared component dependency does not exist in the registry.
    #[error("component {declared_by} depends on {missing}, which is not registered")]
    ComponentDependencyNotFound {
        missing: ComponentId,
        declared_by: ComponentId,
    },

    /// Components of the same role depend on each other in a loop.
    #[error("dependency cycle involving {member}: {}", format_cycle(.cycle))]
    ComponentDependencyCycle {
        member: ComponentId,
        cycle: Vec<ComponentId>,
    },

    /// A component depends on a component of a role that runs later.
    #[error("component {declared_by} cannot depend on {dependency}: {} components run after {} components", .dependency.role, .declared_by.role)]
    InvalidDependencyRole {
        dependency: ComponentId,
        declared_by: ComponentId,
    },

    /// A component's entry point failed.
    #[error("component {component} failed during {} phase: {source}", .phase.phase_name())]
    ComponentExecution {
        component: ComponentId,
        phase: Role,
        #[source]
        source: Box<WorkspaceBuilderError>,
    },

    /// Failure talking to a cloud or cluster API.
    #[error("external system error: {0}")]
    ExternalSystem(String),

    /// Graph store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Resource dump parsing or serialization error.
    #[error("resource dump error: {message}")]
    Dump { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The run was cancelled before it completed.
    #[error("pipeline run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WorkspaceBuilderError>;

impl WorkspaceBuilderError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a resource dump error from any displayable message.
    pub fn dump(msg: impl Into<String>) -> Self {
        Self::Dump {
            message: msg.into(),
        }
    }

    /// Create a setting conversion error.
    pub fn setting_type(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SettingType {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a component failure with the component identity and phase.
    pub fn component_execution(component: ComponentId, source: WorkspaceBuilderError) -> Self {
        Self::ComponentExecution {
            phase: component.role,
            component,
            source: Box::new(source),
        }
    }

    /// Whether this error is a configuration error, fatal at startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::DuplicateSetting { .. }
                | Self::SettingType { .. }
                | Self::MissingRequiredSetting { .. }
                | Self::UnknownSetting { .. }
                | Self::DuplicateComponent { .. }
                | Self::ComponentNotFound { .. }
                | Self::ComponentDependencyNotFound { .. }
                | Self::ComponentDependencyCycle { .. }
                | Self::InvalidDependencyRole { .. }
        )
    }

    /// The failing component, if this is a component execution error.
    pub fn failed_component(&self) -> Option<&ComponentId> {
        match self {
            Self::ComponentExecution { component, .. } => Some(component),
            _ => None,
        }
    }
}

fn required_by_suffix(required_by: &Option<ComponentId>) -> String {
    required_by
        .as_ref()
        .map(|id| format!(", required by {id}"))
        .unwrap_or_default()
}

fn format_cycle(cycle: &[ComponentId]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}
