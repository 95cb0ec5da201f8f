use std::fs;

use serde::Deserialize;

pub const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub seed_posts: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            jwt_secret: "dev-community-secret".into(),
            access_token_ttl_seconds: 15 * 60,
            refresh_token_ttl_seconds: 7 * 24 * 3600,
            seed_posts: 45,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    jwt_secret: Option<String>,
    access_token_ttl_seconds: Option<i64>,
    refresh_token_ttl_seconds: Option<i64>,
    seed_posts: Option<usize>,
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    resolve_settings(raw.as_deref(), |key| std::env::var(key).ok())
}

pub fn resolve_settings(
    file_contents: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_contents {
        match toml::from_str::<FileSettings>(raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.bind_addr {
                    settings.server_bind = v;
                }
                if let Some(v) = file_cfg.jwt_secret {
                    settings.jwt_secret = v;
                }
                if let Some(v) = file_cfg.access_token_ttl_seconds {
                    settings.access_token_ttl_seconds = v;
                }
                if let Some(v) = file_cfg.refresh_token_ttl_seconds {
                    settings.refresh_token_ttl_seconds = v;
                }
                if let Some(v) = file_cfg.seed_posts {
                    settings.seed_posts = v;
                }
            }
            Err(error) => tracing::warn!(%error, "ignoring malformed {SETTINGS_FILE}"),
        }
    }

    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = lookup("APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }

    if let Some(v) = lookup("APP__ACCESS_TOKEN_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.access_token_ttl_seconds = parsed;
        }
    }
    if let Some(v) = lookup("APP__REFRESH_TOKEN_TTL_SECONDS") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.refresh_token_ttl_seconds = parsed;
        }
    }

    if let Some(v) = lookup("APP__SEED_POSTS") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.seed_posts = parsed;
        }
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
