//! Configuration resolution for xlio-import
//!
//! Each value is resolved independently with CLI → ENV → TOML → default
//! priority. The CLI layer is passed in as [`ConfigOverrides`] so library
//! callers can skip it.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use xlio_common::config::{write_toml_config, ImportToml, TomlConfig};
use xlio_common::{Error, Result};

use crate::channel::ReconnectPolicy;

/// Environment variable for the REST base URL
pub const API_URL_ENV_VAR: &str = "XLIO_API_URL";

/// Environment variable for the notification channel address
pub const NOTIFY_URL_ENV_VAR: &str = "XLIO_NOTIFY_URL";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_NOTIFY_URL: &str = "ws://localhost:8000/ws/notify";
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub notify_url: Option<String>,
}

/// Fully resolved import configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub api_base_url: String,
    pub notify_url: String,
    /// Lowercase, without the leading dot
    pub accepted_extensions: Vec<String>,
    pub max_file_bytes: u64,
    pub reconnect: ReconnectPolicy,
    /// Silence tolerated from a queued task before it is reported stalled
    pub watchdog: Duration,
    /// Grace period before a terminal session resets to idle
    pub reset_delay: Duration,
    pub http_timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            notify_url: DEFAULT_NOTIFY_URL.to_string(),
            accepted_extensions: vec!["xls".to_string(), "xlsx".to_string()],
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            reconnect: ReconnectPolicy::default(),
            watchdog: Duration::from_secs(60),
            reset_delay: Duration::from_millis(3000),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl ImportConfig {
    /// Resolve every field from CLI overrides, environment, TOML and defaults
    pub fn resolve(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();
        let toml = &toml_config.import;

        let api_base_url = resolve_string(
            "api_base_url",
            overrides.api_base_url.as_deref(),
            API_URL_ENV_VAR,
            toml.api_base_url.as_deref(),
            &defaults.api_base_url,
        );
        let notify_url = resolve_string(
            "notify_url",
            overrides.notify_url.as_deref(),
            NOTIFY_URL_ENV_VAR,
            toml.notify_url.as_deref(),
            &defaults.notify_url,
        );

        let accepted_extensions = toml
            .accepted_extensions
            .as_ref()
            .map(|exts| {
                exts.iter()
                    .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.accepted_extensions);

        let reconnect = ReconnectPolicy::new(
            toml.reconnect_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.base_delay),
            toml.reconnect_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect.max_delay),
            toml.max_reconnect_attempts
                .unwrap_or(defaults.reconnect.max_attempts),
        );

        let config = Self {
            api_base_url,
            notify_url,
            accepted_extensions,
            max_file_bytes: toml.max_file_bytes.unwrap_or(defaults.max_file_bytes),
            reconnect,
            watchdog: toml
                .watchdog_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.watchdog),
            reset_delay: toml
                .reset_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reset_delay),
            http_timeout: toml
                .http_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the import core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(Error::Config("api_base_url must not be empty".to_string()));
        }
        if self.notify_url.trim().is_empty() {
            return Err(Error::Config("notify_url must not be empty".to_string()));
        }
        if self.accepted_extensions.is_empty() {
            return Err(Error::Config(
                "accepted_extensions must list at least one extension".to_string(),
            ));
        }
        if self.max_file_bytes == 0 {
            return Err(Error::Config("max_file_bytes must be greater than zero".to_string()));
        }
        if self.watchdog.is_zero() {
            return Err(Error::Config("watchdog_secs must be greater than zero".to_string()));
        }
        if self.reconnect.base_delay.is_zero() {
            return Err(Error::Config(
                "reconnect_base_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(Error::Config(format!(
                "reconnect base delay ({} ms) exceeds the cap ({} ms)",
                self.reconnect.base_delay.as_millis(),
                self.reconnect.max_delay.as_millis()
            )));
        }
        Ok(())
    }

    /// Every setting as an explicit `[import]` section
    pub fn to_toml(&self) -> ImportToml {
        ImportToml {
            api_base_url: Some(self.api_base_url.clone()),
            notify_url: Some(self.notify_url.clone()),
            accepted_extensions: Some(self.accepted_extensions.clone()),
            max_file_bytes: Some(self.max_file_bytes),
            reconnect_base_delay_ms: Some(self.reconnect.base_delay.as_millis() as u64),
            reconnect_max_delay_ms: Some(self.reconnect.max_delay.as_millis() as u64),
            max_reconnect_attempts: Some(self.reconnect.max_attempts),
            watchdog_secs: Some(self.watchdog.as_secs()),
            reset_delay_ms: Some(self.reset_delay.as_millis() as u64),
            http_timeout_secs: Some(self.http_timeout.as_secs()),
        }
    }

    /// Write the resolved settings to `path`, keeping the rest of `base`
    pub fn save(&self, base: &TomlConfig, path: &Path) -> Result<()> {
        let config = TomlConfig {
            import: self.to_toml(),
            ..base.clone()
        };
        write_toml_config(&config, path)?;
        info!("Import settings saved to {}", path.display());
        Ok(())
    }

    /// Whether `extension` (no dot, any case) is accepted
    pub fn accepts_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.accepted_extensions.iter().any(|e| *e == extension)
    }

    /// Accepted extensions for messages, e.g. ".xls, .xlsx"
    pub fn accepted_list(&self) -> String {
        self.accepted_extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn resolve_string(
    field: &str,
    cli_value: Option<&str>,
    env_var: &str,
    toml_value: Option<&str>,
    default: &str,
) -> String {
    if let Some(value) = cli_value.filter(|v| !v.trim().is_empty()) {
        info!("{} from command line: {}", field, value);
        return value.to_string();
    }

    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            info!("{} from environment variable {}: {}", field, env_var, value);
            return value;
        }
    }

    if let Some(value) = toml_value.filter(|v| !v.trim().is_empty()) {
        info!("{} from TOML config: {}", field, value);
        return value.to_string();
    }

    debug!("{} using default: {}", field, default);
    default.to_string()
}
