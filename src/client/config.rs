use dotenvy::dotenv;
use log::info;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1/";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub pusher_key: Option<String>,
    pub pusher_cluster: String,
    /// Overrides `ws-<cluster>.pusher.com`, e.g. a local soketi.
    pub pusher_host: Option<String>,
    pub poll_interval: Duration,
    pub log_level: String,
    pub keyring_fallback: bool,
    pub session_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(15),
            pusher_key: None,
            pusher_cluster: "ap2".to_string(),
            pusher_host: None,
            poll_interval: Duration::from_secs(20),
            log_level: "info".to_string(),
            keyring_fallback: false,
            session_file: PathBuf::from("data").join("auth_tokens.json"),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenv().ok();
        let defaults = Self::default();
        let config = Self {
            api_url: env::var("QUICKASSIST_API_URL").unwrap_or(defaults.api_url),
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            pusher_key: env::var("PUSHER_APP_KEY").ok().filter(|k| !k.trim().is_empty()),
            pusher_cluster: env::var("PUSHER_CLUSTER").unwrap_or(defaults.pusher_cluster),
            pusher_host: env::var("PUSHER_HOST").ok().filter(|h| !h.trim().is_empty()),
            poll_interval: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            keyring_fallback: env::var("KEYRING_FALLBACK").map(|v| v == "true" || v == "1").unwrap_or(false),
            session_file: env::var("SESSION_FILE").map(PathBuf::from).unwrap_or(defaults.session_file),
        };

        info!("Client configuration loaded:");
        info!("  API: {}", config.api_url);
        info!("  Realtime: {}", if config.pusher_key.is_some() { "enabled" } else { "disabled (no PUSHER_APP_KEY)" });
        info!("  Poll interval: {:?}", config.poll_interval);
        config
    }

    pub fn fallback_file(&self) -> Option<PathBuf> {
        if self.keyring_fallback { Some(self.session_file.clone()) } else { None }
    }
}
