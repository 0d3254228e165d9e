//! Console configuration.
//!
//! Everything the core needs is carried by [`ConsoleConfig`]; there is no
//! ambient global state. `from_env` reads `ROBODECK_*` variables (after loading
//! `.env` files), everything else uses defaults.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::application::services::TimerMode;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const DEFAULT_STATS_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_STATS_HISTORY: usize = 60;
pub const DEFAULT_REFRESH_SETTLE_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MATCH_DURATION_SECS: u64 = 120;

/// Environment variable names
pub mod env_vars {
    pub const API_URL: &str = "ROBODECK_API_URL";
    pub const WS_URL: &str = "ROBODECK_WS_URL";
    pub const RECONNECT_DELAY_MS: &str = "ROBODECK_RECONNECT_DELAY_MS";
    pub const LOG_CAPACITY: &str = "ROBODECK_LOG_CAPACITY";
    pub const STATS_INTERVAL_MS: &str = "ROBODECK_STATS_INTERVAL_MS";
    pub const STATS_HISTORY: &str = "ROBODECK_STATS_HISTORY";
    pub const REFRESH_SETTLE_MS: &str = "ROBODECK_REFRESH_SETTLE_MS";
    pub const REQUEST_TIMEOUT_MS: &str = "ROBODECK_REQUEST_TIMEOUT_MS";
    pub const TIMER_MODE: &str = "ROBODECK_TIMER_MODE";
    pub const MATCH_DURATION_SECS: &str = "ROBODECK_MATCH_DURATION_SECS";
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var} is not a usable URL '{value}': {reason}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Base URL of the REST request surface
    pub api_url: Url,
    /// Push channel endpoint
    pub ws_url: Url,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Bound on the operator log and on the diagnostics record
    pub log_capacity: usize,
    pub stats_interval: Duration,
    /// Number of network samples kept by the monitor
    pub stats_history: usize,
    /// Delay before re-fetching after a `*_refreshing` event, giving discovery time to finish
    pub refresh_settle_delay: Duration,
    pub request_timeout: Duration,
    pub timer_mode: TimerMode,
    /// Initial configured match duration
    pub match_duration: Duration,
}

impl ConsoleConfig {
    /// Defaults against the given backend. The push channel URL is derived.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        let api_url = parse_http_url(env_vars::API_URL, api_url)?;
        let ws_url = derive_ws_url(&api_url)?;
        Ok(Self {
            api_url,
            ws_url,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            log_capacity: DEFAULT_LOG_CAPACITY,
            stats_interval: Duration::from_millis(DEFAULT_STATS_INTERVAL_MS),
            stats_history: DEFAULT_STATS_HISTORY,
            refresh_settle_delay: Duration::from_millis(DEFAULT_REFRESH_SETTLE_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            timer_mode: TimerMode::Authoritative,
            match_duration: Duration::from_secs(DEFAULT_MATCH_DURATION_SECS),
        })
    }

    /// Load `.env` files from the working directory, then read the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        for filename in [".env.local", ".env"] {
            if std::path::Path::new(filename).exists() {
                let _ = dotenvy::from_filename(filename);
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = VarSource { lookup };

        let api_url = vars
            .raw(env_vars::API_URL)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(&api_url)?;

        if let Some(ws_url) = vars.raw(env_vars::WS_URL) {
            config.ws_url = parse_ws_url(env_vars::WS_URL, &ws_url)?;
        }
        if let Some(ms) = vars.positive::<u64>(env_vars::RECONNECT_DELAY_MS)? {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(capacity) = vars.positive::<usize>(env_vars::LOG_CAPACITY)? {
            config.log_capacity = capacity;
        }
        if let Some(ms) = vars.positive::<u64>(env_vars::STATS_INTERVAL_MS)? {
            config.stats_interval = Duration::from_millis(ms);
        }
        if let Some(samples) = vars.positive::<usize>(env_vars::STATS_HISTORY)? {
            config.stats_history = samples;
        }
        if let Some(ms) = vars.parse::<u64>(env_vars::REFRESH_SETTLE_MS)? {
            config.refresh_settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = vars.positive::<u64>(env_vars::REQUEST_TIMEOUT_MS)? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = vars.parse::<TimerMode>(env_vars::TIMER_MODE)? {
            config.timer_mode = mode;
        }
        if let Some(secs) = vars.positive::<u64>(env_vars::MATCH_DURATION_SECS)? {
            config.match_duration = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn match_duration_ms(&self) -> u64 {
        u64::try_from(self.match_duration.as_millis()).unwrap_or(u64::MAX)
    }
}

struct VarSource<F> {
    lookup: F,
}

impl<F> VarSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank counts as unset.
    fn raw(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw(var)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
                    var,
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn positive<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + Default + PartialEq + ToString,
        T::Err: std::fmt::Display,
    {
        match self.parse::<T>(var)? {
            Some(value) if value == T::default() => Err(ConfigError::InvalidValue {
                var,
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            other => Ok(other),
        }
    }
}

fn parse_http_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            value: value.to_string(),
            reason: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

fn parse_ws_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            var,
            value: value.to_string(),
            reason: format!("unsupported scheme '{other}', expected ws or wss"),
        }),
    }
}

/// `http://host:port/base` -> `ws://host:port/base/ws`
fn derive_ws_url(api_url: &Url) -> Result<Url, ConfigError> {
    let mut ws_url = api_url.clone();
    let scheme = if api_url.scheme() == "https" { "wss" } else { "ws" };
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        var: env_vars::API_URL,
        value: api_url.to_string(),
        reason: reason.to_string(),
    };

    ws_url
        .set_scheme(scheme)
        .map_err(|_| invalid("cannot derive a WebSocket URL"))?;
    let path = format!("{}/ws", api_url.path().trim_end_matches('/'));
    ws_url.set_path(&path);
    ws_url.set_query(None);
    ws_url.set_fragment(None);
    Ok(ws_url)
}
