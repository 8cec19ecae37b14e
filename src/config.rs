//! Runtime configuration read from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::cache::LoadMode;
#[cfg(feature = "client")]
use crate::openf1::ClientConfig;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub model_dir: PathBuf,
    pub season: u16,
    pub total_rounds: u32,
    pub cache_mode: LoadMode,
    pub openf1_base_url: String,
    pub openf1_delay_ms: u64,
    pub openf1_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            model_dir: PathBuf::from("models"),
            season: 2025,
            total_rounds: 24,
            cache_mode: LoadMode::Warm,
            openf1_base_url: "https://api.openf1.org/v1".to_string(),
            openf1_delay_ms: 350,
            openf1_timeout_secs: 30,
        }
    }
}

/// Environment markers of short-lived serverless runtimes
const SERVERLESS_MARKERS: [&str; 2] = ["VERCEL", "AWS_LAMBDA_FUNCTION_NAME"];

impl AppConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let cache_mode = match get("STRATX_CACHE_MODE") {
            Some(value) => LoadMode::parse(&value).unwrap_or_else(|| {
                warn!("Invalid STRATX_CACHE_MODE {:?}, detecting from environment", value);
                detect_mode(&get)
            }),
            None => detect_mode(&get),
        };

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "PORT", defaults.port),
            model_dir: get("MODEL_DIR").map(PathBuf::from).unwrap_or(defaults.model_dir),
            season: parse_or(&get, "STRATX_SEASON", defaults.season),
            total_rounds: parse_or(&get, "STRATX_TOTAL_ROUNDS", defaults.total_rounds),
            cache_mode,
            openf1_base_url: get("OPENF1_BASE_URL").unwrap_or(defaults.openf1_base_url),
            openf1_delay_ms: parse_or(&get, "OPENF1_DELAY_MS", defaults.openf1_delay_ms),
            openf1_timeout_secs: parse_or(&get, "OPENF1_TIMEOUT_SECS", defaults.openf1_timeout_secs),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upstream client settings
    #[cfg(feature = "client")]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.openf1_base_url.clone(),
            delay_ms: self.openf1_delay_ms,
            timeout_secs: self.openf1_timeout_secs,
            ..Default::default()
        }
    }
}

fn detect_mode<G: Fn(&str) -> Option<String>>(get: &G) -> LoadMode {
    if SERVERLESS_MARKERS.iter().any(|&key| get(key).is_some()) {
        LoadMode::Restricted
    } else {
        LoadMode::Warm
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid {}={:?}, using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}
