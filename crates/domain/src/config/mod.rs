//! Gateway configuration, grouped by concern.
//!
//! Everything is environment-driven (the service runs co-located with its
//! engines inside one container), with serde-compatible structs so a config
//! snapshot can be dumped as JSON by `banter config show`.

mod engines;
mod limits;
mod sampling;
mod server;

pub use engines::*;
pub use limits::*;
pub use sampling::*;
pub use server::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub sampling: SamplingBounds,
    #[serde(default)]
    pub engines: EnginesConfig,
}

impl Config {
    /// Build the full configuration from process environment variables.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            limits: LimitsConfig::from_env(),
            sampling: SamplingBounds::from_env(),
            engines: EnginesConfig::from_env(),
        }
    }

    /// Validate the assembled configuration. Error-severity issues abort
    /// startup; warnings are only logged.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.api_key.is_empty() {
            issues.push(ConfigIssue::error(
                "TEXT_API_KEY is not set; all connections will be rejected",
            ));
        }
        if self.server.max_concurrent_connections == 0 {
            issues.push(ConfigIssue::error(
                "MAX_CONCURRENT_CONNECTIONS must be at least 1",
            ));
        }
        if self.limits.idle_timeout_s < 10.0 {
            issues.push(ConfigIssue::warning(
                "WS_IDLE_TIMEOUT_S below 10s will drop slow clients",
            ));
        }
        if self.limits.message_limit == 0 {
            issues.push(ConfigIssue::warning(
                "WS_MAX_MESSAGES_PER_WINDOW is 0; message rate limiting is disabled",
            ));
        }
        if let Err(msg) = self.sampling.check() {
            issues.push(ConfigIssue::error(msg));
        }
        if self.engines.chat_url.is_empty() {
            issues.push(ConfigIssue::error("CHAT_ENGINE_URL is not set"));
        }
        if self.engines.tool_url.is_empty() {
            issues.push(ConfigIssue::warning(
                "TOOL_ENGINE_URL is not set; tool decisions fall back to the prefilter only",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation issues
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl ConfigIssue {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ── env parse helpers ───────────────────────────────────────────────

pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_flags_missing_api_key() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("TEXT_API_KEY")));
    }

    #[test]
    fn populated_config_passes() {
        let config = Config {
            server: ServerConfig {
                api_key: "secret".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let config = Config {
            server: ServerConfig {
                api_key: "secret".into(),
                max_concurrent_connections: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error
                && i.message.contains("MAX_CONCURRENT_CONNECTIONS")));
    }
}
