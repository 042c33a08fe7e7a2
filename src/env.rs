//! Environment variables understood by [`Config::from_env`].
//!
//! These are purely helpers; nothing else in the crate reads the
//! environment.

use crate::config::Config;
use crate::error::ConfigError;

/// Comma-separated list of modules to debug, e.g. `db,http` or `all`.
pub const CHAINLOG_DEBUG_ENV: &str = "CHAINLOG_DEBUG";

/// strftime layout for the timestamp prefix.
pub const CHAINLOG_FMT_TIME_ENV: &str = "CHAINLOG_FMT_TIME";

/// `1`/`true`/`yes` to color level labels, `0`/`false`/`no` to disable.
pub const CHAINLOG_COLORS_ENV: &str = "CHAINLOG_COLORS";

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
        }),
    }
}

impl Config {
    /// The default configuration, adjusted by the `CHAINLOG_*`
    /// environment variables.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let mut config = Config::new();
        if let Some(debug) = get(CHAINLOG_DEBUG_ENV) {
            config.set_debug(&debug);
        }
        if let Some(layout) = get(CHAINLOG_FMT_TIME_ENV) {
            config = config.with_fmt_time(&layout)?;
        }
        if let Some(colors) = get(CHAINLOG_COLORS_ENV) {
            config.colors = parse_bool(CHAINLOG_COLORS_ENV, &colors)?;
        }
        Ok(config)
    }
}
