//! Layered engine configuration: defaults, then a TOML file, then `FLAG_ENGINE_*` environment
//! variables.

use crate::schedule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "FLAG_ENGINE_";

const DEFAULT_REFRESH_SCHEDULE: &str = "* * * * *";
const DEFAULT_EVALUATION_LOG_PATH: &str = "./logs/evaluation.log";
const DEFAULT_EVALUATION_LOG_CAPACITY: usize = 1024;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationLogConfigLayer {
    pub enabled: Option<bool>,
    pub path: Option<PathBuf>,
    pub capacity: Option<usize>,
}

impl EvaluationLogConfigLayer {
    pub fn merge(&mut self, other: Self) {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.path.is_some() {
            self.path = other.path;
        }
        if other.capacity.is_some() {
            self.capacity = other.capacity;
        }
    }

    pub fn finalize(self) -> Result<EvaluationLogConfig, ConfigError> {
        let capacity = self.capacity.unwrap_or(DEFAULT_EVALUATION_LOG_CAPACITY);
        if capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "evaluation_log.capacity".to_owned(),
                message: "capacity must be at least 1".to_owned(),
            });
        }

        Ok(EvaluationLogConfig {
            enabled: self.enabled.unwrap_or(false),
            path: self
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EVALUATION_LOG_PATH)),
            capacity,
        })
    }
}

/// Where and how the evaluation results are written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationLogConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub capacity: usize,
}

impl Default for EvaluationLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from(DEFAULT_EVALUATION_LOG_PATH),
            capacity: DEFAULT_EVALUATION_LOG_CAPACITY,
        }
    }
}

/// One layer of configuration where every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfigLayer {
    pub refresh_schedule: Option<String>,
    pub flags_path: Option<PathBuf>,
    pub evaluation_log: Option<EvaluationLogConfigLayer>,
    pub log_filter: Option<String>,
}

impl EngineConfigLayer {
    /// Read a layer from a TOML file; a missing file yields an empty layer.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(Self::default());
        }

        debug!(path = %path.display(), "loading config file");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Read a layer from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read a layer from the `FLAG_ENGINE_*` variables returned by `lookup`. Empty values are
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        let evaluation_log = EvaluationLogConfigLayer {
            enabled: parse_bool("EVALUATION_LOG_ENABLED", var("EVALUATION_LOG_ENABLED"))?,
            path: var("EVALUATION_LOG_PATH").map(PathBuf::from),
            capacity: parse_usize("EVALUATION_LOG_CAPACITY", var("EVALUATION_LOG_CAPACITY"))?,
        };

        Ok(Self {
            refresh_schedule: var("REFRESH_SCHEDULE"),
            flags_path: var("FLAGS_PATH").map(PathBuf::from),
            evaluation_log: Some(evaluation_log),
            log_filter: var("LOG_FILTER"),
        })
    }

    pub fn merge(&mut self, other: Self) {
        if other.refresh_schedule.is_some() {
            self.refresh_schedule = other.refresh_schedule;
        }
        if other.flags_path.is_some() {
            self.flags_path = other.flags_path;
        }
        if let Some(other_log) = other.evaluation_log {
            match &mut self.evaluation_log {
                Some(log) => log.merge(other_log),
                None => self.evaluation_log = Some(other_log),
            }
        }
        if other.log_filter.is_some() {
            self.log_filter = other.log_filter;
        }
    }

    pub fn finalize(self) -> Result<EngineConfig, ConfigError> {
        let refresh_schedule = self
            .refresh_schedule
            .unwrap_or_else(|| DEFAULT_REFRESH_SCHEDULE.to_owned());
        schedule::parse_refresh(&refresh_schedule).map_err(|error| ConfigError::InvalidValue {
            key: "refresh_schedule".to_owned(),
            message: error.to_string(),
        })?;

        Ok(EngineConfig {
            refresh_schedule,
            flags_path: self.flags_path,
            evaluation_log: self.evaluation_log.unwrap_or_default().finalize()?,
            log_filter: self
                .log_filter
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub refresh_schedule: String,
    pub flags_path: Option<PathBuf>,
    pub evaluation_log: EvaluationLogConfig,
    pub log_filter: String,
}

impl EngineConfig {
    /// Load the configuration from the optional TOML file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut layer = EngineConfigLayer::default();
        if let Some(path) = path {
            layer.merge(EngineConfigLayer::from_toml_file(path)?);
        }
        layer.merge(EngineConfigLayer::from_env()?);
        layer.finalize()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_schedule: DEFAULT_REFRESH_SCHEDULE.to_owned(),
            flags_path: None,
            evaluation_log: EvaluationLogConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
        }
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{name}"),
        message,
    }
}

fn parse_bool(name: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    match value.as_deref() {
        None => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
        Some(v) => Err(invalid(name, format!("invalid boolean value '{v}'"))),
    }
}

fn parse_usize(name: &str, value: Option<String>) -> Result<Option<usize>, ConfigError> {
    match value {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, format!("invalid usize value '{v}'"))),
        None => Ok(None),
    }
}
