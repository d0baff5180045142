//! Analyzer configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via UDTF_BRIDGE_CONFIG or --config)
//! 3. Environment variables

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default I/O buffer size (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum I/O buffer size (1 KiB).
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Maximum I/O buffer size (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Environment variables handed to workers.
pub const ENV_REUSE_WORKER: &str = "UDTF_REUSE_WORKER";
pub const ENV_SIMPLIFIED_TRACEBACK: &str = "UDTF_SIMPLIFIED_TRACEBACK";
pub const ENV_PLANNER_MEMORY_MB: &str = "UDTF_PLANNER_MEMORY_MB";
pub const ENV_AUTH_SOCKET_TIMEOUT: &str = "UDTF_AUTH_SOCKET_TIMEOUT";
pub const ENV_BUFFER_SIZE: &str = "UDTF_BUFFER_SIZE";
pub const ENV_JOB_ARTIFACT_UUID: &str = "UDTF_JOB_ARTIFACT_UUID";
pub const ENV_WORKDIR: &str = "UDTF_WORKDIR";

/// Analyzer configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Worker configuration.
    pub worker: WorkerConfig,
    /// Pool configuration.
    pub pool: PoolConfig,
}

impl AnalyzerConfig {
    /// Loads configuration from `path` (or UDTF_BRIDGE_CONFIG when `path` is
    /// `None`), then applies environment variable overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    fn load_with(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = path
            .map(Path::to_path_buf)
            .or_else(|| lookup("UDTF_BRIDGE_CONFIG").map(PathBuf::from));
        let mut config = match file {
            Some(file) => Self::from_file(file)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.worker.apply_overrides(&lookup);
        self.pool.apply_overrides(&lookup);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.worker.validate()
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_yaml().map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn to_yaml(&self) -> Result<String, String> {
        serde_yaml::to_string(self).map_err(|e| e.to_string())
    }
}

/// How workers are launched and talked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker role (module) id passed to the executable.
    pub module: String,
    /// Return workers that finish cleanly to the pool.
    pub reuse: bool,
    /// Ask workers to trim their tracebacks.
    pub simplified_traceback: bool,
    /// Memory budget for one worker in MiB.
    pub memory_mb: Option<u64>,
    /// Worker authentication timeout in seconds.
    pub auth_timeout_secs: u64,
    /// Stream buffer size in bytes.
    pub buffer_size: usize,
    /// Directory workers resolve auxiliary files against.
    pub workdir: PathBuf,
    /// Largest single block accepted from a worker.
    pub max_response_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            module: "udtf.worker.analyze".to_string(),
            reuse: true,
            simplified_traceback: true,
            memory_mb: None,
            auth_timeout_secs: 15,
            buffer_size: DEFAULT_BUFFER_SIZE,
            workdir: std::env::temp_dir().join("udtf-bridge"),
            max_response_size: udtf_protocol::MAX_BLOCK_SIZE,
        }
    }
}

impl WorkerConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(module) = lookup("UDTF_BRIDGE_WORKER_MODULE") {
            self.module = module;
        }

        if let Some(reuse) = lookup("UDTF_BRIDGE_REUSE_WORKER") {
            self.reuse = parse_flag(&reuse);
        }

        if let Some(simplified) = lookup("UDTF_BRIDGE_SIMPLIFIED_TRACEBACK") {
            self.simplified_traceback = parse_flag(&simplified);
        }

        if let Some(mb) = lookup("UDTF_BRIDGE_WORKER_MEMORY_MB") {
            if let Ok(n) = mb.parse() {
                self.memory_mb = Some(n);
            }
        }

        if let Some(timeout) = lookup("UDTF_BRIDGE_AUTH_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.auth_timeout_secs = secs;
            }
        }

        if let Some(size) = lookup("UDTF_BRIDGE_BUFFER_SIZE") {
            if let Ok(n) = size.parse() {
                self.buffer_size = n;
            }
        }

        if let Some(dir) = lookup("UDTF_BRIDGE_WORKDIR") {
            self.workdir = PathBuf::from(dir);
        }

        if let Some(size) = lookup("UDTF_BRIDGE_MAX_RESPONSE_SIZE") {
            if let Ok(n) = size.parse() {
                self.max_response_size = n;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module.trim().is_empty() {
            return Err(ConfigError::Validation(
                "worker.module must not be empty".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Validation(
                "worker.buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ConfigError::Validation(
                "worker.max_response_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The buffer size clamped to the supported range.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
    }

    /// Builds the environment for a worker: `base` plus the analyzer's
    /// settings.
    pub fn worker_env(
        &self,
        base: &BTreeMap<String, String>,
        job_artifact_id: &str,
    ) -> BTreeMap<String, String> {
        let mut env = base.clone();
        env.insert(ENV_WORKDIR.to_string(), self.workdir.display().to_string());
        if self.reuse {
            env.insert(ENV_REUSE_WORKER.to_string(), "1".to_string());
        }
        if self.simplified_traceback {
            env.insert(ENV_SIMPLIFIED_TRACEBACK.to_string(), "1".to_string());
        }
        if let Some(mb) = self.memory_mb {
            env.insert(ENV_PLANNER_MEMORY_MB.to_string(), mb.to_string());
        }
        env.insert(
            ENV_AUTH_SOCKET_TIMEOUT.to_string(),
            self.auth_timeout_secs.to_string(),
        );
        env.insert(
            ENV_BUFFER_SIZE.to_string(),
            self.effective_buffer_size().to_string(),
        );
        env.insert(ENV_JOB_ARTIFACT_UUID.to_string(), job_artifact_id.to_string());
        env
    }
}

/// Idle worker retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle workers kept per key; extra released workers are destroyed.
    pub max_idle_per_key: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_key: 4,
        }
    }
}

impl PoolConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(max) = lookup("UDTF_BRIDGE_MAX_IDLE_WORKERS") {
            if let Ok(n) = max.parse() {
                self.max_idle_per_key = n;
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
