//! Configuration types, read from the environment once at startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::filters::normalize_address;
use crate::error::ConfigError;

/// Default control-plane port.
pub const DEFAULT_API_PORT: u16 = 3456;

/// Default seconds between polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default number of recent messages requested from the channel per poll.
pub const DEFAULT_POLL_PAGE_LIMIT: usize = 50;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Counterparty to monitor. `None` admits every sender.
    pub monitored_address: Option<String>,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Messages requested from the channel per poll.
    pub poll_page_limit: usize,
    /// Control-plane HTTP port.
    pub api_port: u16,
    /// Base URL of the reply / extraction backend.
    pub backend_url: String,
    /// Optional bearer token for the backend.
    pub backend_api_key: Option<SecretString>,
    /// User id sent with chat requests.
    pub chat_user_id: String,
    /// Base URL of the local messaging bridge.
    pub bridge_url: String,
    /// Database file.
    pub db_path: PathBuf,
    /// Directory for rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitored_address: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_page_limit: DEFAULT_POLL_PAGE_LIMIT,
            api_port: DEFAULT_API_PORT,
            backend_url: "http://localhost:5000".to_string(),
            backend_api_key: None,
            chat_user_id: "default".to_string(),
            bridge_url: "http://127.0.0.1:3457".to_string(),
            db_path: PathBuf::from("./data/receipt-agent.db"),
            log_dir: None,
        }
    }
}

impl Config {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, Vec<ConfigError>> {
        Self::from_vars(&std::env::vars().collect())
    }

    /// Build and validate config from a variable map.
    ///
    /// Every violation is collected; the caller reports them all at once.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut config = Config::default();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        if let Some(phone) = get("MONITORED_PHONE") {
            let digits = normalize_address(&phone).len() - 1;
            if digits < 7 {
                errors.push(invalid(
                    "MONITORED_PHONE",
                    format!("'{phone}' does not look like a phone number"),
                ));
            } else {
                config.monitored_address = Some(phone);
            }
        }

        if let Some(raw) = get("POLL_INTERVAL_SECONDS") {
            match raw.parse::<u64>() {
                Ok(secs) if (1..=3600).contains(&secs) => {
                    config.poll_interval = Duration::from_secs(secs);
                }
                _ => errors.push(invalid(
                    "POLL_INTERVAL_SECONDS",
                    format!("expected an integer between 1 and 3600, got '{raw}'"),
                )),
            }
        }

        if let Some(raw) = get("POLL_PAGE_LIMIT") {
            match raw.parse::<usize>() {
                Ok(limit) if (1..=500).contains(&limit) => config.poll_page_limit = limit,
                _ => errors.push(invalid(
                    "POLL_PAGE_LIMIT",
                    format!("expected an integer between 1 and 500, got '{raw}'"),
                )),
            }
        }

        if let Some(raw) = get("API_PORT") {
            match raw.parse::<u16>() {
                Ok(port) if port != 0 => config.api_port = port,
                _ => errors.push(invalid(
                    "API_PORT",
                    format!("expected a port between 1 and 65535, got '{raw}'"),
                )),
            }
        }

        if let Some(url) = get("BACKEND_URL") {
            match validate_http_url(&url) {
                Ok(()) => config.backend_url = url.trim_end_matches('/').to_string(),
                Err(message) => errors.push(invalid("BACKEND_URL", message)),
            }
        }

        if let Some(url) = get("CHANNEL_BRIDGE_URL") {
            match validate_http_url(&url) {
                Ok(()) => config.bridge_url = url.trim_end_matches('/').to_string(),
                Err(message) => errors.push(invalid("CHANNEL_BRIDGE_URL", message)),
            }
        }

        config.backend_api_key = get("BACKEND_API_KEY").map(SecretString::from);

        if let Some(user) = vars.get("CHAT_USER_ID") {
            if user.trim().is_empty() {
                errors.push(ConfigError::MissingRequired {
                    key: "CHAT_USER_ID".to_string(),
                    hint: "Set a non-empty user id or unset the variable.".to_string(),
                });
            } else {
                config.chat_user_id = user.trim().to_string();
            }
        }

        if let Some(path) = get("RECEIPT_AGENT_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        config.log_dir = get("RECEIPT_AGENT_LOG_DIR").map(PathBuf::from);

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

fn invalid(key: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    }
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = reqwest::Url::parse(raw).map_err(|e| format!("'{raw}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{other}' in '{raw}'")),
    }
}
