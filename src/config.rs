use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which kinds of members the member store discovers by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberKinds {
    pub fields: bool,
    pub properties: bool,
}

impl Default for MemberKinds {
    fn default() -> Self {
        MemberKinds {
            fields: true,
            properties: false,
        }
    }
}

/// Which access levels the member store discovers by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberAccess {
    pub public: bool,
    pub non_public: bool,
    pub instance: bool,
    #[serde(rename = "static")]
    pub statics: bool,
}

impl Default for MemberAccess {
    fn default() -> Self {
        MemberAccess {
            public: true,
            non_public: false,
            instance: true,
            statics: false,
        }
    }
}

/// Settings for one loading session.
///
/// Every field has a default, so a configuration file only needs to name the
/// settings it changes:
///
/// ```yaml
/// list_item_name: item
/// member_kinds:
///   properties: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub member_kinds: MemberKinds,
    pub member_access: MemberAccess,
    pub case_sensitive_members: bool,
    /// Tag expected on list items, and used to decide whether a child list
    /// appends to its parent's list during inheritance.
    pub list_item_name: String,
    pub do_post_load: bool,
    pub do_late_post_load: bool,
    pub do_validation: bool,
    /// Unresolvable type descriptors become errors instead of warnings.
    pub strict_types: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            member_kinds: MemberKinds::default(),
            member_access: MemberAccess::default(),
            case_sensitive_members: true,
            list_item_name: "li".to_string(),
            do_post_load: true,
            do_late_post_load: true,
            do_validation: true,
            strict_types: false,
        }
    }
}

impl LoadConfig {
    /// # Errors
    /// Returns a [`ConfigError::Json`] if the text is not a valid configuration.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// # Errors
    /// Returns a [`ConfigError::Yaml`] if the text is not a valid configuration.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads a configuration file, picking the format from its extension.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, has an unknown
    /// extension, or does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Self::from_json_str(&std::fs::read_to_string(path)?),
            Some("yaml" | "yml") => Self::from_yaml_str(&std::fs::read_to_string(path)?),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoadConfig::default();
        assert!(config.member_kinds.fields);
        assert!(!config.member_kinds.properties);
        assert!(config.member_access.public);
        assert!(!config.member_access.statics);
        assert_eq!(config.list_item_name, "li");
        assert!(config.case_sensitive_members);
        assert!(!config.strict_types);
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{ "list_item_name": "item", "member_access": { "static": true } }"#;
        let config = LoadConfig::from_json_str(json).unwrap();
        assert_eq!(config.list_item_name, "item");
        assert!(config.member_access.statics);
        assert!(config.member_access.public);
        assert!(config.do_post_load);
    }

    #[test]
    fn test_partial_yaml() {
        let config =
            LoadConfig::from_yaml_str("case_sensitive_members: false\ndo_validation: false\n")
                .unwrap();
        assert!(!config.case_sensitive_members);
        assert!(!config.do_validation);
        assert!(config.do_late_post_load);
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            LoadConfig::from_file("settings.toml"),
            Err(ConfigError::UnsupportedFormat { .. })
        ));
    }
}
