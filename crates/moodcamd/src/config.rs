use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Daemon configuration: optional TOML file, then `MOODCAM_*` / `GEMINI_API_KEY`
/// environment variables on top, then defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Address the HTTP server binds (default: 127.0.0.1:3000).
    pub listen_addr: String,
    /// Gemini credential. Requests fail with 500 while unset.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// API root, without the `/models/...` suffix.
    pub gemini_base_url: String,
    /// Upstream request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Language the advice is written in.
    pub advice_language: String,
}

/// Shape of the optional config file. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen_addr: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub advice_language: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}

impl Config {
    /// Load from `MOODCAM_CONFIG` (if set) and the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let file = match std::env::var("MOODCAM_CONFIG") {
            Ok(path) => FileConfig::load(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Ok(Self::from_sources(file, |key| std::env::var(key).ok()))
    }

    /// Merge a file config with an environment lookup. Environment wins.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        Self {
            listen_addr: env("MOODCAM_LISTEN_ADDR")
                .or(file.listen_addr)
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            gemini_api_key: env("GEMINI_API_KEY").or(file.gemini_api_key),
            gemini_model: env("MOODCAM_GEMINI_MODEL")
                .or(file.gemini_model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env("MOODCAM_GEMINI_BASE_URL")
                .or(file.gemini_base_url)
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            request_timeout_secs: env("MOODCAM_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .or(file.request_timeout_secs)
                .unwrap_or(30),
            advice_language: env("MOODCAM_ADVICE_LANGUAGE")
                .or(file.advice_language)
                .unwrap_or_else(|| "Vietnamese".to_string()),
        }
    }
}
