use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "feed.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid api base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub page_size: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            request_timeout_ms: 10_000,
            page_size: 20,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Base URL with a trailing slash so relative endpoint paths join below it.
    pub fn base_url(&self) -> Result<Url, SettingsError> {
        let raw = self.api_base_url.trim();
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&normalized).map_err(|source| SettingsError::InvalidBaseUrl {
            url: raw.to_string(),
            source,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    request_timeout_ms: Option<u64>,
    page_size: Option<u32>,
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE))
}

/// Defaults, then the TOML file at `path` if readable, then `FEED_*` environment variables.
pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut ClientSettings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<FileSettings>(raw) else {
        tracing::warn!("ignoring malformed client settings file");
        return;
    };
    if let Some(v) = file_cfg.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = file_cfg.request_timeout_ms {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = file_cfg.page_size {
        settings.page_size = v.max(1);
    }
}

fn apply_env(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("FEED_API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("FEED_REQUEST_TIMEOUT_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_ms = parsed;
        }
    }
    if let Some(v) = lookup("FEED_PAGE_SIZE") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.page_size = parsed.max(1);
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
