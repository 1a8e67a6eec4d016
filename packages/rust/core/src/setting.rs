//! Typed settings declared by components.
//!
//! A [`Setting`] is a `const` declaration: components keep them in statics
//! and reference them from their [`SettingDependency`] lists. Raw values come
//! from the [`SettingsSource`](workspacebuilder_shared::SettingsSource) and
//! are converted by [`SettingRegistry::resolve`]; defaults are written as raw
//! strings and go through the same conversion.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::{Map, Value};

use workspacebuilder_shared::{Result, WorkspaceBuilderError};

/// Declared type of a setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingType {
    String,
    Integer,
    Dict,
    File,
    Bool,
}

impl SettingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Dict => "dict",
            Self::File => "file",
            Self::Bool => "bool",
        }
    }
}

impl std::fmt::Display for SettingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    pub name: &'static str,
    /// External key (environment variable / config file key).
    pub key: &'static str,
    pub setting_type: SettingType,
    pub description: &'static str,
    /// Raw default, converted like an external value.
    pub default: Option<&'static str>,
}

impl Setting {
    pub const fn new(
        name: &'static str,
        key: &'static str,
        setting_type: SettingType,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            key,
            setting_type,
            description,
            default: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }
}

/// A component's use of a setting.
#[derive(Debug, Clone, Copy)]
pub struct SettingDependency {
    pub setting: &'static Setting,
    pub required: bool,
}

impl SettingDependency {
    pub const fn required(setting: &'static Setting) -> Self {
        Self {
            setting,
            required: true,
        }
    }

    pub const fn optional(setting: &'static Setting) -> Self {
        Self {
            setting,
            required: false,
        }
    }
}

/// A converted setting value.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    String(String),
    Integer(i64),
    Bool(bool),
    Dict(Map<String, Value>),
    File(PathBuf),
}

impl SettingValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(p) => Some(p),
            _ => None,
        }
    }
}

/// Convert a raw string to `setting_type`.
pub fn convert(name: &str, setting_type: SettingType, raw: &str) -> Result<SettingValue> {
    match setting_type {
        SettingType::String => Ok(SettingValue::String(raw.to_string())),
        SettingType::Integer => raw.trim().parse::<i64>().map(SettingValue::Integer).map_err(|e| {
            WorkspaceBuilderError::setting_type(name, format!("'{raw}' is not an integer: {e}"))
        }),
        SettingType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(SettingValue::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(SettingValue::Bool(false)),
            _ => Err(WorkspaceBuilderError::setting_type(
                name,
                format!("'{raw}' is not a boolean"),
            )),
        },
        SettingType::Dict => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(SettingValue::Dict(map)),
            Ok(_) => Err(WorkspaceBuilderError::setting_type(
                name,
                "expected a JSON object",
            )),
            Err(e) => Err(WorkspaceBuilderError::setting_type(
                name,
                format!("invalid JSON: {e}"),
            )),
        },
        SettingType::File => {
            let path = PathBuf::from(raw.trim());
            if path.exists() {
                Ok(SettingValue::File(path))
            } else {
                Err(WorkspaceBuilderError::setting_type(
                    name,
                    format!("file {} does not exist", path.display()),
                ))
            }
        }
    }
}

/// Every setting known to the process, in registration order.
#[derive(Debug, Default, Clone)]
pub struct SettingRegistry {
    settings: Vec<&'static Setting>,
    by_name: HashMap<&'static str, usize>,
}

impl SettingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a setting. Registering the same declaration twice is a no-op;
    /// a different declaration under an existing name is rejected.
    pub fn register(&mut self, setting: &'static Setting) -> Result<()> {
        if let Some(&idx) = self.by_name.get(setting.name) {
            if self.settings[idx] == setting {
                return Ok(());
            }
            return Err(WorkspaceBuilderError::DuplicateSetting {
                name: setting.name.to_string(),
            });
        }
        self.by_name.insert(setting.name, self.settings.len());
        self.settings.push(setting);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'static Setting> {
        self.by_name.get(name).map(|&idx| self.settings[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Setting> + '_ {
        self.settings.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Convert `raw` (or the default when absent) for the named setting.
    pub fn resolve(&self, name: &str, raw: Option<&str>) -> Result<Option<SettingValue>> {
        let setting = self
            .get(name)
            .ok_or_else(|| WorkspaceBuilderError::UnknownSetting {
                name: name.to_string(),
            })?;
        resolve_setting(setting, raw)
    }
}

/// Convert a raw value for `setting`, falling back to its default.
pub fn resolve_setting(setting: &Setting, raw: Option<&str>) -> Result<Option<SettingValue>> {
    match raw.or(setting.default) {
        Some(value) => convert(setting.name, setting.setting_type, value).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LOD: Setting = Setting::new("DEFAULT_LOD", "WB_DEFAULT_LOD", SettingType::Integer, "lod")
        .with_default("2");
    static LOD_AGAIN: Setting =
        Setting::new("DEFAULT_LOD", "OTHER_KEY", SettingType::Integer, "lod");
    static NAME: Setting = Setting::new("NAME", "NAME", SettingType::String, "name");

    #[test]
    fn default_goes_through_conversion() {
        let mut reg = SettingRegistry::new();
        reg.register(&LOD).unwrap();
        assert_eq!(reg.resolve("DEFAULT_LOD", None).unwrap(), Some(SettingValue::Integer(2)));
        assert_eq!(
            reg.resolve("DEFAULT_LOD", Some(" 5 ")).unwrap(),
            Some(SettingValue::Integer(5))
        );
    }

    #[test]
    fn absent_without_default_is_none() {
        let mut reg = SettingRegistry::new();
        reg.register(&NAME).unwrap();
        assert_eq!(reg.resolve("NAME", None).unwrap(), None);
    }

    #[test]
    fn duplicate_names_rejected_unless_identical() {
        let mut reg = SettingRegistry::new();
        reg.register(&LOD).unwrap();
        reg.register(&LOD).unwrap();
        assert_eq!(reg.len(), 1);

        let err = reg.register(&LOD_AGAIN).unwrap_err();
        assert!(matches!(err, WorkspaceBuilderError::DuplicateSetting { ref name } if name == "DEFAULT_LOD"));
    }

    #[test]
    fn iteration_follows_registration_order() {
        let mut reg = SettingRegistry::new();
        reg.register(&NAME).unwrap();
        reg.register(&LOD).unwrap();
        let names: Vec<_> = reg.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["NAME", "DEFAULT_LOD"]);
    }

    #[test]
    fn unknown_setting() {
        let reg = SettingRegistry::new();
        assert!(matches!(
            reg.resolve("NOPE", Some("x")),
            Err(WorkspaceBuilderError::UnknownSetting { .. })
        ));
    }

    #[test]
    fn conversions_per_type() {
        assert_eq!(
            convert("b", SettingType::Bool, "Yes").unwrap(),
            SettingValue::Bool(true)
        );
        assert_eq!(
            convert("b", SettingType::Bool, "off").unwrap(),
            SettingValue::Bool(false)
        );
        assert!(convert("b", SettingType::Bool, "maybe").is_err());

        assert!(convert("i", SettingType::Integer, "two").is_err());

        let dict = convert("d", SettingType::Dict, r#"{"shop": 1}"#).unwrap();
        assert_eq!(dict.as_dict().unwrap()["shop"], 1);
        assert!(convert("d", SettingType::Dict, "[1, 2]").is_err());
        assert!(convert("d", SettingType::Dict, "{not json").is_err());

        let here = std::env::temp_dir();
        let file = convert("f", SettingType::File, here.to_str().unwrap()).unwrap();
        assert_eq!(file.as_path(), Some(here.as_path()));
        assert!(convert("f", SettingType::File, "/definitely/not/here.yaml").is_err());

        assert_eq!(
            convert("s", SettingType::String, " raw ").unwrap().as_str(),
            Some(" raw ")
        );
    }

    #[test]
    fn type_error_names_setting() {
        let err = convert("DEFAULT_LOD", SettingType::Integer, "high").unwrap_err();
        assert!(err.to_string().contains("DEFAULT_LOD"));
        assert!(err.is_configuration());
    }
}
