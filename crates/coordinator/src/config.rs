//! Coordinator configuration.

use std::time::Duration;

use thiserror::Error;

use reprsim_protocol::TaskKind;

pub const ENV_RETRY_WINDOW_MS: &str = "REPRSIM_RETRY_WINDOW_MS";
pub const ENV_CALC_TIMEOUT_MS: &str = "REPRSIM_CALC_TIMEOUT_MS";
pub const ENV_FETCH_TIMEOUT_MS: &str = "REPRSIM_FETCH_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Timing knobs for the bridge and the retry throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Leading/trailing throttle window for retries.
    pub retry_window: Duration,
    /// Give up on a calculation job after this long. `None` waits forever,
    /// which stalls the calculation chain if the worker never answers.
    pub calc_timeout: Option<Duration>,
    /// Give up on a fetch job after this long.
    pub fetch_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry_window: Duration::from_millis(200),
            calc_timeout: Some(Duration::from_secs(30)),
            fetch_timeout: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    pub fn with_calc_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.calc_timeout = timeout;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn timeout_for(&self, kind: TaskKind) -> Option<Duration> {
        match kind {
            TaskKind::Calc => self.calc_timeout,
            TaskKind::Fetch => self.fetch_timeout,
        }
    }

    /// Defaults overlaid with `REPRSIM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// All values are milliseconds; a timeout of `0` disables it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_RETRY_WINDOW_MS) {
            match parse_millis(ENV_RETRY_WINDOW_MS, &raw)? {
                0 => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_RETRY_WINDOW_MS,
                        value: raw,
                        reason: "must be positive",
                    });
                }
                ms => config.retry_window = Duration::from_millis(ms),
            }
        }
        if let Some(raw) = lookup(ENV_CALC_TIMEOUT_MS) {
            config.calc_timeout = optional_millis(parse_millis(ENV_CALC_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_FETCH_TIMEOUT_MS) {
            config.fetch_timeout = optional_millis(parse_millis(ENV_FETCH_TIMEOUT_MS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: "expected milliseconds",
    })
}

fn optional_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
