use std::str::FromStr;
use std::time::Duration;

use crate::errors::ConfigError;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8787/api";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Runtime configuration shared by the workbench components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkbenchConfig {
    /// Base URL of the hosted service layer (generation, validation, agents, chat).
    pub api_base_url: String,
    /// Bearer token of the current session, when signed in.
    pub api_token: Option<String>,
    /// Model name sent with conversational requests.
    pub chat_model: String,
    /// Minimum validation score that moves a proposal to `pending_approval`.
    pub pass_threshold: u8,
    /// Number of sandbox console entries kept for display.
    pub console_capacity: usize,
    /// Delay between successive agent activations in a collaborative session.
    pub agent_stagger: Duration,
    /// HTTP request timeout applied by the service clients.
    pub request_timeout: Duration,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            pass_threshold: 70,
            console_capacity: 100,
            agent_stagger: Duration::from_millis(300),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl WorkbenchConfig {
    /// Builds a config from `WORKBENCH_*` environment variables, falling back
    /// to defaults for unset keys.
    ///
    /// - `WORKBENCH_API_BASE_URL`, `WORKBENCH_API_TOKEN`, `WORKBENCH_CHAT_MODEL`
    /// - `WORKBENCH_PASS_THRESHOLD` (0-100), `WORKBENCH_CONSOLE_CAPACITY` (> 0)
    /// - `WORKBENCH_AGENT_STAGGER_MS`, `WORKBENCH_REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorkbenchConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pass_threshold = parse_or(&read, "WORKBENCH_PASS_THRESHOLD", defaults.pass_threshold)?;
        if pass_threshold > 100 {
            return Err(invalid(
                "WORKBENCH_PASS_THRESHOLD",
                pass_threshold.to_string(),
                "must be between 0 and 100",
            ));
        }
        let console_capacity =
            parse_or(&read, "WORKBENCH_CONSOLE_CAPACITY", defaults.console_capacity)?;
        if console_capacity == 0 {
            return Err(invalid(
                "WORKBENCH_CONSOLE_CAPACITY",
                "0".into(),
                "must be greater than 0",
            ));
        }
        let stagger_ms = parse_or(
            &read,
            "WORKBENCH_AGENT_STAGGER_MS",
            defaults.agent_stagger.as_millis() as u64,
        )?;
        let timeout_secs = parse_or(
            &read,
            "WORKBENCH_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            api_base_url: read("WORKBENCH_API_BASE_URL").unwrap_or(defaults.api_base_url),
            api_token: read("WORKBENCH_API_TOKEN"),
            chat_model: read("WORKBENCH_CHAT_MODEL").unwrap_or(defaults.chat_model),
            pass_threshold,
            console_capacity,
            agent_stagger: Duration::from_millis(stagger_ms),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Overrides the service base URL.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the session token used for bearer auth.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

fn parse_or<T>(read: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, raw.clone(), &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &str, value: String, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value,
        reason: reason.to_string(),
    }
}
