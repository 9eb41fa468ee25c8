//! Optional TOML configuration file.
//!
//! ```toml
//! [environment]
//! sample_count = 5000
//! xy_point_length = 1000
//! seed = 42
//!
//! # Used when no params file is given on the command line.
//! [params]
//! growth = 0.05
//! regions = ["eu", "us"]
//! ```
//!
//! Command-line flags take precedence over the file, and the file over
//! built-in defaults.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value as Json};
use sqexport_eval::Environment;

use crate::export::ExportError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub environment: EnvironmentSettings,
    /// Default parameter object.
    #[serde(default)]
    pub params: toml::Table,
}

/// Every field is optional; unset fields fall through to the next layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSettings {
    pub sample_count: Option<usize>,
    pub xy_point_length: Option<usize>,
    pub seed: Option<u64>,
}

impl EnvironmentSettings {
    /// Fields set in `self` win over those in `lower`.
    pub fn or(self, lower: EnvironmentSettings) -> EnvironmentSettings {
        EnvironmentSettings {
            sample_count: self.sample_count.or(lower.sample_count),
            xy_point_length: self.xy_point_length.or(lower.xy_point_length),
            seed: self.seed.or(lower.seed),
        }
    }

    pub fn resolve(self) -> Result<Environment, ExportError> {
        let defaults = Environment::default();
        let env = Environment {
            sample_count: self.sample_count.unwrap_or(defaults.sample_count),
            xy_point_length: self.xy_point_length.unwrap_or(defaults.xy_point_length),
            seed: self.seed.or(defaults.seed),
        };
        if env.sample_count == 0 {
            return Err(ExportError::Config(
                "sample_count must be at least 1".to_owned(),
            ));
        }
        if env.xy_point_length == 0 {
            return Err(ExportError::Config(
                "xy_point_length must be at least 1".to_owned(),
            ));
        }
        Ok(env)
    }
}

impl FileConfig {
    pub fn default_params(&self) -> Result<Map<String, Json>, ExportError> {
        match serde_json::to_value(&self.params) {
            Ok(Json::Object(map)) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(e) => Err(ExportError::Config(format!(
                "could not convert [params] to JSON: {}",
                e
            ))),
        }
    }
}

/// Read and parse a config file from `path`.
pub fn read_config(path: &Path) -> Result<FileConfig, ExportError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ExportError::Config(format!("could not read config '{}': {}", path.display(), e))
    })?;
    toml::from_str(&content).map_err(|e| {
        ExportError::Config(format!(
            "could not parse config '{}': {}",
            path.display(),
            e.message()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> FileConfig {
        toml::from_str(text).expect("valid config")
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = parse("");
        assert_eq!(config.environment.resolve().unwrap(), Environment::default());
        assert!(config.default_params().unwrap().is_empty());
    }

    #[test]
    fn environment_and_params() {
        let config = parse(
            r#"
            [environment]
            sample_count = 500
            seed = 9

            [params]
            growth = 0.05
            regions = ["eu", "us"]
            nested = { a = 1 }
            "#,
        );
        let env = config.environment.resolve().unwrap();
        assert_eq!(env.sample_count, 500);
        assert_eq!(env.xy_point_length, 1000);
        assert_eq!(env.seed, Some(9));
        assert_eq!(
            Json::Object(config.default_params().unwrap()),
            json!({"growth": 0.05, "regions": ["eu", "us"], "nested": {"a": 1}})
        );
    }

    #[test]
    fn flags_override_file() {
        let file = EnvironmentSettings {
            sample_count: Some(500),
            xy_point_length: Some(20),
            seed: Some(1),
        };
        let flags = EnvironmentSettings {
            sample_count: Some(7),
            ..EnvironmentSettings::default()
        };
        let env = flags.or(file).resolve().unwrap();
        assert_eq!(env.sample_count, 7);
        assert_eq!(env.xy_point_length, 20);
        assert_eq!(env.seed, Some(1));
    }

    #[test]
    fn zero_sample_count_rejected() {
        let settings = EnvironmentSettings {
            sample_count: Some(0),
            ..EnvironmentSettings::default()
        };
        let err = settings.resolve().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("sample_count"));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("[environment]\nsamples = 3\n").is_err());
    }

    #[test]
    fn unreadable_file() {
        let err = read_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().starts_with("could not read config"));
    }
}
