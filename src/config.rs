//! Configuration management with environment variable support.
//!
//! Every tunable of the replayer can be set through the environment; CLI
//! flags override it.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CRUSHER_BACKEND_URL` | Backend API base URL | `http://localhost:8000` |
//! | `CRUSHER_TOKEN` | Backend access token | unset |
//! | `CRUSHER_PROJECT_ID` | Project new tests are created in | unset |
//! | `CRUSHER_REQUEST_TIMEOUT` | Backend request timeout in seconds | `30` |
//! | `CRUSHER_WEBDRIVER_URL` | WebDriver endpoint | `http://localhost:4444` |
//! | `CRUSHER_ELEMENT_TIMEOUT_MS` | How long to wait for an element | `10000` |
//! | `CRUSHER_NAVIGATION_TIMEOUT_MS` | Page load bound | `30000` |
//! | `CRUSHER_ACTION_TIMEOUT_MS` | Bound for any other driver call | `15000` |
//! | `CRUSHER_POLL_INTERVAL_MS` | Element polling interval | `250` |
//! | `CRUSHER_ABORT_ON_ASSERTION` | Stop the replay on the first failed assertion | `false` |
//! | `CRUSHER_ARTIFACTS_DIR` | Base directory for run artifacts | `/tmp/crusher-replay` |
//! | `CRUSHER_DEFAULT_DEVICE` | Device applied before replay when none is recorded | `GoogleChromeLargeScreen` |
//!
//! # Example
//!
//! ```bash
//! export CRUSHER_BACKEND_URL="https://backend.crusher.dev"
//! export CRUSHER_TOKEN="..."
//! export CRUSHER_ELEMENT_TIMEOUT_MS=20000
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Default backend request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Default element wait (milliseconds)
pub const DEFAULT_ELEMENT_TIMEOUT_MS: u64 = 10_000;

/// Default navigation bound (milliseconds)
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Default bound for other driver calls (milliseconds)
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 15_000;

/// Default element polling interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

pub const DEFAULT_ARTIFACTS_DIR: &str = "/tmp/crusher-replay";

pub const DEFAULT_DEVICE: &str = "GoogleChromeLargeScreen";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_BACKEND_URL: &str = "CRUSHER_BACKEND_URL";
pub const ENV_TOKEN: &str = "CRUSHER_TOKEN";
pub const ENV_PROJECT_ID: &str = "CRUSHER_PROJECT_ID";
pub const ENV_REQUEST_TIMEOUT: &str = "CRUSHER_REQUEST_TIMEOUT";
pub const ENV_WEBDRIVER_URL: &str = "CRUSHER_WEBDRIVER_URL";
pub const ENV_ELEMENT_TIMEOUT: &str = "CRUSHER_ELEMENT_TIMEOUT_MS";
pub const ENV_NAVIGATION_TIMEOUT: &str = "CRUSHER_NAVIGATION_TIMEOUT_MS";
pub const ENV_ACTION_TIMEOUT: &str = "CRUSHER_ACTION_TIMEOUT_MS";
pub const ENV_POLL_INTERVAL: &str = "CRUSHER_POLL_INTERVAL_MS";
pub const ENV_ABORT_ON_ASSERTION: &str = "CRUSHER_ABORT_ON_ASSERTION";
pub const ENV_ARTIFACTS_DIR: &str = "CRUSHER_ARTIFACTS_DIR";
pub const ENV_DEFAULT_DEVICE: &str = "CRUSHER_DEFAULT_DEVICE";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendSettings,
    pub driver: DriverSettings,
    pub execution: ExecutionSettings,
    pub artifacts: ArtifactSettings,
}

/// Backend API settings
#[derive(Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub token: Option<String>,
    pub project_id: Option<String>,
    /// Request timeout (seconds)
    pub request_timeout: u64,
}

/// Browser driver settings
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub webdriver_url: String,
    /// Device applied when a recording has no SET_DEVICE
    pub default_device: String,
}

/// Replay timing and failure policy
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub element_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub abort_on_assertion_failure: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            backend: BackendSettings::from_env(),
            driver: DriverSettings::from_env(),
            execution: ExecutionSettings::from_env(),
            artifacts: ArtifactSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            backend: BackendSettings::defaults(),
            driver: DriverSettings::defaults(),
            execution: ExecutionSettings::defaults(),
            artifacts: ArtifactSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("project_id", &self.project_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl BackendSettings {
    pub fn from_env() -> Self {
        Self {
            base_url: env::var(ENV_BACKEND_URL).unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
            token: non_empty_var(ENV_TOKEN),
            project_id: non_empty_var(ENV_PROJECT_ID),
            request_timeout: parse_var(ENV_REQUEST_TIMEOUT).unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            token: None,
            project_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl DriverSettings {
    pub fn from_env() -> Self {
        Self {
            webdriver_url: env::var(ENV_WEBDRIVER_URL).unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
            default_device: env::var(ENV_DEFAULT_DEVICE).unwrap_or_else(|_| DEFAULT_DEVICE.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            default_device: DEFAULT_DEVICE.to_string(),
        }
    }
}

impl ExecutionSettings {
    pub fn from_env() -> Self {
        Self {
            element_timeout_ms: parse_var(ENV_ELEMENT_TIMEOUT).unwrap_or(DEFAULT_ELEMENT_TIMEOUT_MS),
            navigation_timeout_ms: parse_var(ENV_NAVIGATION_TIMEOUT).unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
            action_timeout_ms: parse_var(ENV_ACTION_TIMEOUT).unwrap_or(DEFAULT_ACTION_TIMEOUT_MS),
            poll_interval_ms: parse_var(ENV_POLL_INTERVAL).unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            abort_on_assertion_failure: env::var(ENV_ABORT_ON_ASSERTION)
                .ok()
                .and_then(|s| parse_bool(&s))
                .unwrap_or(false),
        }
    }

    pub fn defaults() -> Self {
        Self {
            element_timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            abort_on_assertion_failure: false,
        }
    }
}

impl ArtifactSettings {
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_ARTIFACTS_DIR).unwrap_or_else(|_| DEFAULT_ARTIFACTS_DIR.to_string()),
        }
    }

    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_ARTIFACTS_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Accepts 1/0, true/false, yes/no, on/off
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get the artifacts base directory (convenience function)
pub fn artifacts_base_dir() -> String {
    get().artifacts.base_dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.backend.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.backend.token, None);
        assert_eq!(config.execution.element_timeout_ms, 10_000);
        assert!(!config.execution.abort_on_assertion_failure);
        assert_eq!(config.artifacts.base_dir, DEFAULT_ARTIFACTS_DIR);
        assert_eq!(config.driver.default_device, DEFAULT_DEVICE);
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let mut backend = BackendSettings::defaults();
        backend.token = Some("s3cret".to_string());
        let rendered = format!("{:?}", backend);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
