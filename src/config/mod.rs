use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use toml::Value;

use crate::heartbeat::{self, HeartbeatConfig};

pub const DEFAULT_CONFIG_PATH: &str = "balancer.cfg";

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub frontend: String,
    pub backend: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    #[serde(default)]
    pub broker: BrokerSection,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub human_friendly: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            human_friendly: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeartbeatSection {
    pub interval_ms: u64,
    pub liveness: u32,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_ms: heartbeat::DEFAULT_INTERVAL_MS,
            liveness: heartbeat::DEFAULT_LIVENESS,
        }
    }
}

impl From<HeartbeatSection> for HeartbeatConfig {
    fn from(value: HeartbeatSection) -> Self {
        Self {
            interval_ms: value.interval_ms,
            liveness: value.liveness,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientViolationPolicy {
    #[default]
    Fatal,
    Drop,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerSection {
    pub client_violations: ClientViolationPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub explicit_path: bool,
    pub overrides: Vec<String>,
}

impl ConfigSource {
    pub fn from_args(args: impl IntoIterator<Item = String>) -> Self {
        let mut args: Vec<String> = args.into_iter().collect();
        let explicit_path = args.first().is_some_and(|arg| !arg.starts_with("--"));
        let path = if explicit_path {
            PathBuf::from(args.remove(0))
        } else {
            PathBuf::from(DEFAULT_CONFIG_PATH)
        };

        Self {
            path,
            explicit_path,
            overrides: args,
        }
    }
}

impl AppConfig {
    pub fn load(source: &ConfigSource) -> Result<Self, ConfigError> {
        Self::load_from_toml_with_args(&source.path, source.overrides.clone())
    }

    pub fn load_from_toml_with_args(
        path: impl AsRef<Path>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ConfigError> {
        let toml_content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source,
        })?;

        let mut root_value: Value =
            toml_content
                .parse()
                .map_err(|source| ConfigError::TomlParse {
                    path: path.as_ref().to_string_lossy().to_string(),
                    source,
                })?;
        fill_section_defaults(&mut root_value)?;

        let overrides = parse_cli_overrides(args)?;
        for (key_path, raw_value) in overrides {
            apply_override(&mut root_value, &key_path, &raw_value)?;
        }

        root_value.try_into().map_err(ConfigError::Deserialize)
    }

    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig::from(self.heartbeat)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    TomlParse {
        path: String,
        source: toml::de::Error,
    },
    Deserialize(toml::de::Error),
    Defaults(toml::ser::Error),
    MissingValueForArg {
        key: String,
    },
    InvalidArgFormat {
        arg: String,
    },
    InvalidPath {
        key: String,
    },
    UnknownPath {
        key: String,
    },
    UnsupportedOverrideType {
        key: String,
    },
    InvalidValueForType {
        key: String,
        expected: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config file '{path}': {source}")
            }
            Self::TomlParse { path, source } => {
                write!(f, "failed to parse TOML config '{path}': {source}")
            }
            Self::Deserialize(source) => write!(f, "failed to deserialize config: {source}"),
            Self::Defaults(source) => write!(f, "failed to render default config values: {source}"),
            Self::MissingValueForArg { key } => {
                write!(f, "missing value for CLI override '--{key}'")
            }
            Self::InvalidArgFormat { arg } => write!(
                f,
                "invalid CLI argument format '{arg}', expected '--section.key value'"
            ),
            Self::InvalidPath { key } => write!(f, "invalid override key path '{key}'"),
            Self::UnknownPath { key } => write!(f, "unknown override key path '{key}'"),
            Self::UnsupportedOverrideType { key } => {
                write!(f, "override not supported for complex TOML type at '{key}'")
            }
            Self::InvalidValueForType {
                key,
                expected,
                value,
            } => write!(
                f,
                "invalid value '{value}' for '{key}', expected type {expected}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

fn fill_section_defaults(root: &mut Value) -> Result<(), ConfigError> {
    let defaults = [
        ("logging", Value::try_from(LoggingConfig::default())),
        ("heartbeat", Value::try_from(HeartbeatSection::default())),
        ("broker", Value::try_from(BrokerSection::default())),
    ];

    let Some(root_table) = root.as_table_mut() else {
        return Ok(());
    };

    for (section, default_value) in defaults {
        let default_value = default_value.map_err(ConfigError::Defaults)?;
        let Value::Table(default_table) = default_value else {
            continue;
        };

        let entry = root_table
            .entry(section.to_owned())
            .or_insert_with(|| Value::Table(toml::map::Map::new()));
        // A non-table value is left for deserialization to reject.
        if let Value::Table(section_table) = entry {
            for (key, value) in default_table {
                section_table.entry(key).or_insert(value);
            }
        }
    }

    Ok(())
}

fn parse_cli_overrides(args: impl IntoIterator<Item = String>) -> Result<Vec<(String, String)>, ConfigError> {
    let mut parsed = Vec::new();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        let Some(stripped) = arg.strip_prefix("--") else {
            return Err(ConfigError::InvalidArgFormat { arg });
        };

        if stripped.is_empty() {
            return Err(ConfigError::InvalidArgFormat { arg });
        }

        let value = iter.next().ok_or_else(|| ConfigError::MissingValueForArg {
            key: stripped.to_owned(),
        })?;

        parsed.push((stripped.to_owned(), value));
    }

    Ok(parsed)
}

fn apply_override(root: &mut Value, key_path: &str, raw_value: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = key_path.split('.').collect();
    if parts.is_empty() || parts.iter().any(|part| part.is_empty()) {
        return Err(ConfigError::InvalidPath {
            key: key_path.to_owned(),
        });
    }

    let unknown = || ConfigError::UnknownPath {
        key: key_path.to_owned(),
    };

    let mut current = root;
    for section in &parts[..parts.len() - 1] {
        current = current
            .as_table_mut()
            .ok_or_else(unknown)?
            .get_mut(*section)
            .ok_or_else(unknown)?;
    }

    let final_key = parts[parts.len() - 1];
    let current_value = current
        .as_table_mut()
        .ok_or_else(unknown)?
        .get_mut(final_key)
        .ok_or_else(unknown)?;

    *current_value = parse_value_using_current_type(key_path, raw_value, current_value)?;
    Ok(())
}

fn parse_value_using_current_type(
    key_path: &str,
    raw_value: &str,
    current_value: &Value,
) -> Result<Value, ConfigError> {
    let invalid = |expected: &'static str| ConfigError::InvalidValueForType {
        key: key_path.to_owned(),
        expected,
        value: raw_value.to_owned(),
    };

    match current_value {
        Value::String(_) => Ok(Value::String(raw_value.to_owned())),
        Value::Integer(_) => raw_value
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid("integer")),
        Value::Float(_) => raw_value
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("float")),
        Value::Boolean(_) => raw_value
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| invalid("boolean")),
        Value::Datetime(_) | Value::Array(_) | Value::Table(_) => {
            Err(ConfigError::UnsupportedOverrideType {
                key: key_path.to_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::{AppConfig, ClientViolationPolicy, ConfigError, ConfigSource, DEFAULT_CONFIG_PATH};

    fn write_temp_config(content: &str, suffix: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "balancer-config-test-{suffix}-{}.cfg",
            std::process::id()
        ));
        fs::write(&path, content).expect("failed to write temp config");
        path
    }

    const MINIMAL: &str = r#"
frontend = "tcp://*:5555"
backend = "tcp://*:5556"
"#;

    #[test]
    fn minimal_config_gets_defaults_for_optional_sections() {
        let path = write_temp_config(MINIMAL, "minimal");

        let config = AppConfig::load_from_toml_with_args(&path, Vec::<String>::new())
            .expect("config should load");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert_eq!(config.frontend, "tcp://*:5555");
        assert_eq!(config.backend, "tcp://*:5556");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.human_friendly);
        assert_eq!(config.heartbeat.interval_ms, 1_000);
        assert_eq!(config.heartbeat.liveness, 3);
        assert_eq!(config.heartbeat_config().liveness_window_ms(), 3_000);
        assert_eq!(config.broker.client_violations, ClientViolationPolicy::Fatal);
    }

    #[test]
    fn partial_sections_are_completed_and_explicit_values_win() {
        let path = write_temp_config(
            r#"
frontend = "tcp://127.0.0.1:7000"
backend = "tcp://127.0.0.1:7001"

[heartbeat]
interval_ms = 500

[broker]
client_violations = "drop"
"#,
            "partial",
        );

        let config = AppConfig::load_from_toml_with_args(&path, Vec::<String>::new())
            .expect("config should load");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert_eq!(config.heartbeat.interval_ms, 500);
        assert_eq!(config.heartbeat.liveness, 3);
        assert_eq!(config.broker.client_violations, ClientViolationPolicy::Drop);
    }

    #[test]
    fn argv_overrides_matching_paths_including_defaulted_ones() {
        let path = write_temp_config(MINIMAL, "override");

        let config = AppConfig::load_from_toml_with_args(
            &path,
            vec![
                "--frontend".to_owned(),
                "tcp://127.0.0.1:9000".to_owned(),
                "--logging.level".to_owned(),
                "debug".to_owned(),
                "--heartbeat.liveness".to_owned(),
                "5".to_owned(),
            ],
        )
        .expect("config with overrides should load");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert_eq!(config.frontend, "tcp://127.0.0.1:9000");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.heartbeat.liveness, 5);
    }

    #[test]
    fn rejects_unknown_override_path_and_bad_values() {
        let path = write_temp_config(MINIMAL, "unknown-path");

        let unknown = AppConfig::load_from_toml_with_args(
            &path,
            vec!["--logging.nonexistent".to_owned(), "x".to_owned()],
        )
        .expect_err("unknown override key should fail");
        let bad_type = AppConfig::load_from_toml_with_args(
            &path,
            vec!["--heartbeat.interval_ms".to_owned(), "soon".to_owned()],
        )
        .expect_err("non-integer interval should fail");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert!(matches!(unknown, ConfigError::UnknownPath { .. }));
        assert!(matches!(
            bad_type,
            ConfigError::InvalidValueForType {
                expected: "integer",
                ..
            }
        ));
    }

    #[test]
    fn missing_endpoints_fail_deserialization() {
        let path = write_temp_config("frontend = \"tcp://*:5555\"\n", "missing-backend");

        let error = AppConfig::load_from_toml_with_args(&path, Vec::<String>::new())
            .expect_err("missing backend should fail");
        fs::remove_file(path).expect("temp config cleanup should succeed");

        assert!(matches!(error, ConfigError::Deserialize(_)));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let error = AppConfig::load_from_toml_with_args(
            "/nonexistent/balancer.cfg",
            Vec::<String>::new(),
        )
        .expect_err("missing file should fail");

        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn config_source_uses_default_path_unless_first_arg_is_a_path() {
        let default_source = ConfigSource::from_args(vec![
            "--logging.level".to_owned(),
            "debug".to_owned(),
        ]);
        assert_eq!(default_source.path, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!default_source.explicit_path);
        assert_eq!(default_source.overrides.len(), 2);

        let explicit = ConfigSource::from_args(vec!["/etc/balancer.cfg".to_owned()]);
        assert_eq!(explicit.path, PathBuf::from("/etc/balancer.cfg"));
        assert!(explicit.explicit_path);
        assert!(explicit.overrides.is_empty());
    }
}
