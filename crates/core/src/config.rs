use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Prefix for generated reference codes, e.g. `REQ` in `REQ-2026-K4PX7N`.
    pub reference_prefix: String,
    /// Applied to steps that do not set their own SLA.
    pub default_sla_hours: Option<u32>,
    /// Non-working dates excluded from leave day counts.
    pub holidays: Vec<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub reference_prefix: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://greenlight.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                reference_prefix: "REQ".to_string(),
                default_sla_hours: None,
                holidays: Vec::new(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    reference_prefix: Option<String>,
    default_sla_hours: Option<u32>,
    holidays: Option<Vec<NaiveDate>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("greenlight.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(reference_prefix) = workflow.reference_prefix {
                self.workflow.reference_prefix = reference_prefix;
            }
            if let Some(default_sla_hours) = workflow.default_sla_hours {
                self.workflow.default_sla_hours = Some(default_sla_hours);
            }
            if let Some(holidays) = workflow.holidays {
                self.workflow.holidays = holidays;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("GREENLIGHT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("GREENLIGHT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("GREENLIGHT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("GREENLIGHT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("GREENLIGHT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("GREENLIGHT_WORKFLOW_REFERENCE_PREFIX") {
            self.workflow.reference_prefix = value;
        }
        if let Some(value) = read_env("GREENLIGHT_WORKFLOW_DEFAULT_SLA_HOURS") {
            self.workflow.default_sla_hours =
                Some(parse_u32("GREENLIGHT_WORKFLOW_DEFAULT_SLA_HOURS", &value)?);
        }

        let log_level =
            read_env("GREENLIGHT_LOGGING_LEVEL").or_else(|| read_env("GREENLIGHT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("GREENLIGHT_LOGGING_FORMAT").or_else(|| read_env("GREENLIGHT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(reference_prefix) = overrides.reference_prefix {
            self.workflow.reference_prefix = reference_prefix;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("greenlight.toml"), PathBuf::from("config/greenlight.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    let prefix = workflow.reference_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(
            "workflow.reference_prefix must be non-empty and alphanumeric".to_string(),
        ));
    }

    if let Some(hours) = workflow.default_sla_hours {
        if hours == 0 {
            return Err(ConfigError::Validation(
                "workflow.default_sla_hours must be greater than zero when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use chrono::NaiveDate;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        config.validate().expect("defaults must be valid");
        assert_eq!(config.workflow.reference_prefix, "REQ");
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[workflow]\nreference_prefix = \"HRR\"\nholidays = [\"2026-01-01\", \"2026-06-12\"]\n\n[logging]\nlevel = \"debug\"\nformat = \"json\"\n"
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.workflow.reference_prefix, "HRR");
        assert_eq!(
            config.workflow.holidays,
            vec![
                NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
                NaiveDate::from_ymd_opt(2026, 6, 12).expect("date"),
            ]
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let error = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here.toml")),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect_err("missing file");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }

    #[test]
    fn invalid_reference_prefix_fails_validation() {
        let mut config = AppConfig::default();
        config.workflow.reference_prefix = "R Q".to_string();

        let error = config.validate().expect_err("space in prefix");
        assert!(matches!(error, ConfigError::Validation(_)));
    }

    #[test]
    fn explicit_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/definitely/not/here.toml")),
            require_file: false,
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                log_level: Some("warn".to_string()),
                reference_prefix: Some("LVE".to_string()),
            },
        })
        .expect("load with overrides");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.workflow.reference_prefix, "LVE");
    }
}
