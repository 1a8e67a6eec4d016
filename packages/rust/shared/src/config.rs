//! Application configuration and the settings source for pipeline runs.
//!
//! User config lives at `~/.workspacebuilder/workspacebuilder.toml`.
//! CLI flags override config file values, which override defaults.
//! Environment variables override the config file's `[settings]` table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceBuilderError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "workspacebuilder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".workspacebuilder";

// ---------------------------------------------------------------------------
// Config structs (matching workspacebuilder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Orchestrator behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Raw setting values keyed by external key (e.g. `WORKSPACE_NAME`).
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory renderers write their files into.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Graph store database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Components to run when none are given on the command line
    /// (`role:name`). Empty means the live-cluster indexer plus every
    /// enricher and renderer.
    #[serde(default)]
    pub components: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            database_path: default_database_path(),
            components: Vec::new(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_database_path() -> String {
    "output/workspacebuilder.db".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Keep going after an enricher or renderer fails. Indexer failures
    /// always abort the run.
    #[serde(default)]
    pub continue_on_error: bool,
}

// ---------------------------------------------------------------------------
// Settings source
// ---------------------------------------------------------------------------

/// Immutable snapshot of raw setting values for one process.
///
/// Built once at startup from the config file and the environment, then
/// handed to every pipeline run by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSource {
    values: BTreeMap<String, String>,
}

impl SettingsSource {
    /// An empty source (every setting falls back to its default).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a source from explicit `(key, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot the config file's `[settings]` table overlaid with the
    /// current process environment for the given keys.
    pub fn from_config_and_env<'a>(
        config: &AppConfig,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut values = config.settings.clone();
        for key in keys {
            if let Ok(value) = std::env::var(key) {
                tracing::debug!(key, "setting taken from environment");
                values.insert(key.to_string(), value);
            }
        }
        Self { values }
    }

    /// Return a new source with `overrides` layered on top.
    pub fn with_overrides<K, V>(mut self, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in overrides {
            self.values.insert(k.into(), v.into());
        }
        self
    }

    /// Raw value for an external key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parse a `KEY=VALUE` pair from the command line.
pub fn parse_setting_override(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        WorkspaceBuilderError::config(format!("invalid setting '{raw}': expected KEY=VALUE"))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(WorkspaceBuilderError::config(format!(
            "invalid setting '{raw}': empty key"
        )));
    }
    Ok((key.to_string(), value.to_string()))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.workspacebuilder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WorkspaceBuilderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.workspacebuilder/workspacebuilder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| WorkspaceBuilderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        WorkspaceBuilderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| WorkspaceBuilderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config)
        .map_err(|e| WorkspaceBuilderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| WorkspaceBuilderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
