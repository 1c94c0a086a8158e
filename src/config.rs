use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub ws_base: String,
    pub session_db: PathBuf,
    pub export_dir: PathBuf,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let api_base = "http://localhost:8080".to_string();
        Self {
            ws_base: ws_base_for(&api_base),
            api_base,
            session_db: PathBuf::from("./txdash.sqlite"),
            export_dir: PathBuf::from("."),
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_base = std::env::var("API_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        Self {
            ws_base: std::env::var("WS_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| ws_base_for(&api_base)),
            api_base,
            session_db: std::env::var("SESSION_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_db),
            export_dir: std::env::var("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_dir),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

/// `http://host` -> `ws://host`, `https://host` -> `wss://host`.
pub fn ws_base_for(api_base: &str) -> String {
    if let Some(rest) = api_base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_base.to_string()
    }
}
