//! Simulator configuration.
//!
//! Precedence: defaults, then the optional TOML file, then `LBSIM_*`
//! environment variables. The result is validated before use.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    Algorithm, DurationRange, DurationTable, TASK_CATALOG, TaskType, WorkerId,
};
use crate::routing::WorkerPool;
use crate::store::DEFAULT_VISIBLE_WINDOW_MS;
use crate::worker::DEFAULT_MAX_IN_FLIGHT;

#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub server: ServerConfig,
    pub capacity: CapacityConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CapacityConfig {
    pub max_in_flight: usize,
    pub workers: Vec<String>,
    pub weights: Vec<u32>,
    pub default_duration: DurationRange,
    /// Overrides on top of the built-in task catalog ranges.
    pub durations: BTreeMap<String, DurationRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DispatchConfig {
    pub algorithm: Algorithm,
    pub visible_window_ms: i64,
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for SimConfig {
    fn default() -> Self {
        let pool = WorkerPool::standard();
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
            },
            capacity: CapacityConfig {
                max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                workers: pool.ids().iter().map(|id| id.to_string()).collect(),
                weights: pool.weights().to_vec(),
                default_duration: DurationRange::DEFAULT,
                durations: BTreeMap::new(),
            },
            dispatch: DispatchConfig {
                algorithm: Algorithm::default(),
                visible_window_ms: DEFAULT_VISIBLE_WINDOW_MS,
                seed: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Compact,
            },
        }
    }
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

impl SimConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = path {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
            let patch: ConfigPatch =
                toml::from_str(&raw).map_err(|source| ConfigError::ParseFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            config.apply_patch(patch);
        }
        config.apply_env_overrides(read_env)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML document. No environment lookup.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let patch: ConfigPatch = toml::from_str(raw).map_err(|source| ConfigError::ParseFile {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        let mut config = Self::default();
        config.apply_patch(patch);
        config.validate()?;
        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(capacity) = patch.capacity {
            if let Some(max_in_flight) = capacity.max_in_flight {
                self.capacity.max_in_flight = max_in_flight;
            }
            if let Some(workers) = capacity.workers {
                self.capacity.workers = workers;
            }
            if let Some(weights) = capacity.weights {
                self.capacity.weights = weights;
            }
            if let Some(default_duration) = capacity.default_duration {
                self.capacity.default_duration = default_duration;
            }
            if let Some(durations) = capacity.durations {
                self.capacity.durations.extend(durations);
            }
        }

        if let Some(dispatch) = patch.dispatch {
            if let Some(algorithm) = dispatch.algorithm {
                self.dispatch.algorithm = algorithm;
            }
            if let Some(visible_window_ms) = dispatch.visible_window_ms {
                self.dispatch.visible_window_ms = visible_window_ms;
            }
            if let Some(seed) = dispatch.seed {
                self.dispatch.seed = Some(seed);
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

    /// `lookup` is `env::var` in production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LBSIM_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = lookup("LBSIM_PORT") {
            self.server.port = parse_env("LBSIM_PORT", &value)?;
        }
        if let Some(value) = lookup("LBSIM_MAX_IN_FLIGHT") {
            self.capacity.max_in_flight = parse_env("LBSIM_MAX_IN_FLIGHT", &value)?;
        }
        if let Some(value) = lookup("LBSIM_SEED") {
            self.dispatch.seed = Some(parse_env("LBSIM_SEED", &value)?);
        }
        if let Some(value) = lookup("LBSIM_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("LBSIM_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_capacity(&self.capacity)?;
        validate_dispatch(&self.dispatch)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    pub fn worker_pool(&self) -> Result<WorkerPool, ConfigError> {
        let ids = self
            .capacity
            .workers
            .iter()
            .map(|id| WorkerId::new(id.as_str()))
            .collect();
        WorkerPool::new(ids, self.capacity.weights.clone())
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }

    /// Catalog ranges, overridden per type by `capacity.durations`.
    pub fn duration_table(&self) -> DurationTable {
        let ranges = TASK_CATALOG
            .iter()
            .map(|def| (TaskType::new(def.task_type), def.range))
            .chain(
                self.capacity
                    .durations
                    .iter()
                    .map(|(task_type, range)| (TaskType::new(task_type.as_str()), *range)),
            )
            .collect();
        DurationTable::new(ranges, self.capacity.default_duration)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server.bind_address must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_capacity(capacity: &CapacityConfig) -> Result<(), ConfigError> {
    if capacity.max_in_flight == 0 {
        return Err(ConfigError::Validation(
            "capacity.max_in_flight must be greater than zero".to_string(),
        ));
    }
    if capacity.workers.is_empty() {
        return Err(ConfigError::Validation(
            "capacity.workers must list at least one worker".to_string(),
        ));
    }
    if capacity.workers.len() != capacity.weights.len() {
        return Err(ConfigError::Validation(format!(
            "capacity.weights has {} entries for {} workers",
            capacity.weights.len(),
            capacity.workers.len()
        )));
    }
    if capacity.weights.contains(&0) {
        return Err(ConfigError::Validation(
            "capacity.weights must all be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_dispatch(dispatch: &DispatchConfig) -> Result<(), ConfigError> {
    if dispatch.visible_window_ms <= 0 {
        return Err(ConfigError::Validation(
            "dispatch.visible_window_ms must be greater than zero".to_string(),
        ));
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
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    capacity: Option<CapacityPatch>,
    dispatch: Option<DispatchPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct CapacityPatch {
    max_in_flight: Option<usize>,
    workers: Option<Vec<String>>,
    weights: Option<Vec<u32>>,
    default_duration: Option<DurationRange>,
    durations: Option<BTreeMap<String, DurationRange>>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatchPatch {
    algorithm: Option<Algorithm>,
    visible_window_ms: Option<i64>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
