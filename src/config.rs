//! Environment-driven configuration for the engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

fn parse_env_value<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("could not parse '{raw}'"),
            }),
        Err(_) => Ok(None),
    }
}

fn parse_env_bool(key: &str) -> bool {
    match std::env::var(key) {
        Ok(raw) => {
            let raw = raw.trim().to_ascii_lowercase();
            !(raw.is_empty() || raw == "0" || raw == "false" || raw == "no")
        }
        Err(_) => false,
    }
}

/// Engine-wide configuration, assembled from the environment at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the external model binary. `WQDSS_MODEL_EXE`.
    pub model_exe: PathBuf,
    /// Root directory backing the model registry. `WQDSS_BASE_MODEL_DIR`.
    pub base_model_dir: PathBuf,
    /// Root directory for best-run artifacts, partitioned by exec id.
    /// `WQDSS_BEST_RUNS_DIR`.
    pub best_runs_dir: PathBuf,
    /// Slice width for bounded-parallel dispatch. `-1` means unbounded.
    /// `NUM_PARALLEL_EXECS`.
    pub num_parallel_execs: i64,
    /// Hostname of a remote model-registry HTTP service, used by the queue
    /// dispatcher's worker side to fetch archives it cannot read locally.
    /// `MODEL_REGISTRY_SERVICE`.
    pub model_registry_service: Option<String>,
    /// Truthy enables verbose (debug) logging. `DEBUG`.
    pub debug: bool,
    /// Polling interval for the queue dispatcher.
    pub queue_poll_interval: Duration,
    /// Redis connection string backing the queue dispatcher.
    pub redis_url: String,
    /// Redis list name the queue dispatcher uses.
    pub queue_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_exe: PathBuf::from("/dss-bin/w2_exe_linux_par"),
            base_model_dir: PathBuf::from("/models"),
            best_runs_dir: PathBuf::from("/best_runs"),
            num_parallel_execs: -1,
            model_registry_service: None,
            debug: false,
            queue_poll_interval: Duration::from_millis(500),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            queue_name: "wqdss".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build configuration from the process environment, falling back to
    /// defaults for anything unset, then validate the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("WQDSS_MODEL_EXE") {
            config.model_exe = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("WQDSS_BASE_MODEL_DIR") {
            config.base_model_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("WQDSS_BEST_RUNS_DIR") {
            config.best_runs_dir = PathBuf::from(val);
        }
        if let Some(val) = parse_env_value::<i64>("NUM_PARALLEL_EXECS")? {
            config.num_parallel_execs = val;
        }
        if let Ok(val) = std::env::var("MODEL_REGISTRY_SERVICE") {
            config.model_registry_service = Some(val);
        }
        config.debug = parse_env_bool("DEBUG");
        if let Some(val) = parse_env_value::<u64>("WQDSS_QUEUE_POLL_INTERVAL_MS")? {
            config.queue_poll_interval = Duration::from_millis(val);
        }
        if let Ok(val) = std::env::var("WQDSS_REDIS_URL") {
            config.redis_url = val;
        }
        if let Ok(val) = std::env::var("WQDSS_QUEUE_NAME") {
            config.queue_name = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Derive the effective `tracing` log filter: `DEBUG` maps to `debug`
    /// when `RUST_LOG` is not separately set by the caller.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_exe.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model_exe must not be empty".to_string(),
            ));
        }
        if self.num_parallel_execs == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_parallel_execs must be -1 (unbounded) or a positive slice width"
                    .to_string(),
            ));
        }
        if self.queue_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.model_exe, PathBuf::from("/dss-bin/w2_exe_linux_par"));
        assert_eq!(config.base_model_dir, PathBuf::from("/models"));
        assert_eq!(config.best_runs_dir, PathBuf::from("/best_runs"));
        assert_eq!(config.num_parallel_execs, -1);
        assert!(!config.debug);
    }

    #[test]
    fn rejects_zero_parallelism() {
        let mut config = EngineConfig::default();
        config.num_parallel_execs = 0;
        assert!(config.validate().is_err());
    }
}
