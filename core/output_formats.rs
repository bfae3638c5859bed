use crate::error::{AppError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct BuiltinDefaults {
    #[serde(default)]
    pub always_ignore: Vec<String>,
    #[serde(default)]
    pub smart_defaults: Vec<String>,
}

static BUILTIN_DEFAULTS: Lazy<BuiltinDefaults> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../data/builtin.yaml"));
    serde_yml::from_str(yaml_content).expect("Failed to parse embedded data/builtin.yaml")
});

pub fn get_builtin_defaults() -> &'static BuiltinDefaults {
    &BUILTIN_DEFAULTS
}

pub fn serialize_to_json<T: Serialize>(data: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(data).map_err(AppError::JsonSerialize)
    } else {
        serde_json::to_string(data).map_err(AppError::JsonSerialize)
    }
}

pub fn serialize_to_yaml<T: Serialize>(data: &T) -> Result<String> {
    serde_yml::to_string(data).map_err(AppError::YamlError)
}

#[cfg(feature = "serde_support")]
pub fn serialize_to_xml<T: Serialize>(data: &T, root_name: &str) -> Result<String> {
    quick_xml::se::to_string_with_root(root_name, data)
        .map_err(|e| AppError::XmlSerialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults_parse() {
        let defaults = get_builtin_defaults();
        assert!(defaults.always_ignore.iter().any(|d| d == ".git"));
        assert!(defaults.smart_defaults.iter().any(|p| p == "README*"));
    }

    #[test]
    fn test_builtin_smart_defaults_are_valid_rules() {
        for pattern in &get_builtin_defaults().smart_defaults {
            assert!(crate::rules::validate_pattern(pattern).is_ok(), "{}", pattern);
        }
    }
}
