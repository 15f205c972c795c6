//! Configuration for the gateway service.

use std::env;
use std::time::Duration;

use crate::operations::DEFAULT_CALL_TIMEOUT;

/// Default base URL of published ORT reports.
pub const DEFAULT_REPORT_BASE_URL: &str = "https://ortruns.inocybe.io";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,
    /// Namespace holding `OrtRun` resources and their pods.
    pub namespace: String,
    /// Deadline for each Kubernetes API call.
    pub call_timeout: Duration,
    /// Base URL for report links in chat list replies.
    pub report_base_url: String,
    /// Matrix bot settings, if enabled.
    pub matrix: Option<MatrixConfig>,
    /// Slack bot settings, if enabled.
    pub slack: Option<SlackConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env::var("ORT_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4000),
            namespace: non_empty("ORT_NAMESPACE").unwrap_or_else(|| "ort".to_string()),
            call_timeout: env::var("ORT_CALL_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map_or(DEFAULT_CALL_TIMEOUT, Duration::from_secs),
            report_base_url: non_empty("ORT_REPORT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REPORT_BASE_URL.to_string()),
            matrix: MatrixConfig::from_env(),
            slack: SlackConfig::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            namespace: "ort".to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            report_base_url: DEFAULT_REPORT_BASE_URL.to_string(),
            matrix: None,
            slack: None,
        }
    }
}

/// Matrix bot configuration.
#[derive(Clone)]
pub struct MatrixConfig {
    /// Homeserver URL, e.g. `https://matrix.example.com`.
    pub server: String,
    /// Bot user id, e.g. `@ortbot:example.com`.
    pub user: String,
    pub access_token: String,
}

impl MatrixConfig {
    /// Enabled when `MATRIX_SERVER`, `MATRIX_USER` and `MATRIX_ACCESS_TOKEN` are all set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Some(Self {
            server: non_empty("MATRIX_SERVER")?,
            user: non_empty("MATRIX_USER")?,
            access_token: non_empty("MATRIX_ACCESS_TOKEN")?,
        })
    }
}

impl std::fmt::Debug for MatrixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixConfig")
            .field("server", &self.server)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Slack bot configuration.
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`).
    pub bot_token: String,
    /// Signing secret for Events API requests.
    pub signing_secret: String,
    /// Web API base URL.
    pub api_base_url: String,
}

impl SlackConfig {
    /// Enabled when `SLACK_TOKEN` and `SLACK_SIGNING_SECRET` are set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Some(Self {
            bot_token: non_empty("SLACK_TOKEN")?,
            signing_secret: non_empty("SLACK_SIGNING_SECRET")?,
            api_base_url: non_empty("SLACK_API_BASE_URL")
                .unwrap_or_else(|| "https://slack.com/api".to_string()),
        })
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "ORT_PORT",
        "ORT_NAMESPACE",
        "ORT_CALL_TIMEOUT_SECS",
        "ORT_REPORT_BASE_URL",
        "MATRIX_SERVER",
        "MATRIX_USER",
        "MATRIX_ACCESS_TOKEN",
        "SLACK_TOKEN",
        "SLACK_SIGNING_SECRET",
        "SLACK_API_BASE_URL",
    ];

    #[allow(unused_unsafe)]
    fn clear_env() {
        for key in KEYS {
            // SAFETY: tests touching the environment run serially via #[serial]
            unsafe { env::remove_var(key) };
        }
    }

    #[allow(unused_unsafe)]
    fn set(key: &str, value: &str) {
        // SAFETY: tests touching the environment run serially via #[serial]
        unsafe { env::set_var(key, value) };
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env();
        assert_eq!(config.port, 4000);
        assert_eq!(config.namespace, "ort");
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(config.report_base_url, DEFAULT_REPORT_BASE_URL);
        assert!(config.matrix.is_none());
        assert!(config.slack.is_none());
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear_env();
        set("ORT_PORT", "8080");
        set("ORT_NAMESPACE", "scans");
        set("ORT_CALL_TIMEOUT_SECS", "5");
        let config = Config::from_env();
        assert_eq!(config.port, 8080);
        assert_eq!(config.namespace, "scans");
        assert_eq!(config.call_timeout, Duration::from_secs(5));

        set("ORT_PORT", "not-a-port");
        set("ORT_CALL_TIMEOUT_SECS", "0");
        let config = Config::from_env();
        assert_eq!(config.port, 4000);
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_matrix_requires_all_settings() {
        clear_env();
        set("MATRIX_SERVER", "https://matrix.example.com");
        set("MATRIX_USER", "@ortbot:matrix.example.com");
        assert!(MatrixConfig::from_env().is_none());

        set("MATRIX_ACCESS_TOKEN", "secret-token");
        let matrix = MatrixConfig::from_env().unwrap();
        assert_eq!(matrix.user, "@ortbot:matrix.example.com");
        assert!(!format!("{matrix:?}").contains("secret-token"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_slack_requires_token_and_secret() {
        clear_env();
        set("SLACK_TOKEN", "xoxb-1");
        assert!(SlackConfig::from_env().is_none());

        set("SLACK_SIGNING_SECRET", "shh");
        let slack = SlackConfig::from_env().unwrap();
        assert_eq!(slack.api_base_url, "https://slack.com/api");
        clear_env();
    }
}
