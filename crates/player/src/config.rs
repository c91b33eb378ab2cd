//! Client configuration from `.env` files and environment variables.

use std::num::ParseIntError;
use std::time::Duration;

use url::Url;

use crate::infrastructure::websocket::ReconnectConfig;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

pub mod env_keys {
    pub const BACKEND_URL: &str = "STORYFORGE_BACKEND_URL";
    pub const WS_URL: &str = "STORYFORGE_WS_URL";
    pub const RECONNECT_ATTEMPTS: &str = "STORYFORGE_RECONNECT_ATTEMPTS";
    pub const RECONNECT_INITIAL_DELAY_MS: &str = "STORYFORGE_RECONNECT_INITIAL_DELAY_MS";
    pub const RECONNECT_MAX_DELAY_MS: &str = "STORYFORGE_RECONNECT_MAX_DELAY_MS";
    pub const AUTH_TOKEN: &str = "STORYFORGE_AUTH_TOKEN";
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is not a valid URL ({value}): {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must be a non-negative integer, got {value:?}: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Cannot derive a WebSocket address from {0}; set STORYFORGE_WS_URL")]
    UnsupportedScheme(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST API root
    pub backend_url: Url,
    /// WebSocket root; derived from the backend URL unless set explicitly
    pub ws_url: Url,
    pub reconnect: ReconnectConfig,
    /// Initial bearer token, if any
    pub auth_token: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let backend_url = parse_url(
            env_keys::BACKEND_URL,
            &get(env_keys::BACKEND_URL).unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
        )?;
        let ws_url = match get(env_keys::WS_URL) {
            Some(value) => parse_url(env_keys::WS_URL, &value)?,
            None => websocket_url_for(&backend_url)?,
        };

        let defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay: get(env_keys::RECONNECT_INITIAL_DELAY_MS)
                .map(|v| parse_number(env_keys::RECONNECT_INITIAL_DELAY_MS, &v))
                .transpose()?
                .map_or(defaults.initial_delay, Duration::from_millis),
            max_delay: get(env_keys::RECONNECT_MAX_DELAY_MS)
                .map(|v| parse_number(env_keys::RECONNECT_MAX_DELAY_MS, &v))
                .transpose()?
                .map_or(defaults.max_delay, Duration::from_millis),
            max_attempts: get(env_keys::RECONNECT_ATTEMPTS)
                .map(|v| parse_number(env_keys::RECONNECT_ATTEMPTS, &v))
                .transpose()?
                .map_or(defaults.max_attempts, |n| u32::try_from(n).unwrap_or(u32::MAX)),
        };

        Ok(Self {
            backend_url,
            ws_url,
            reconnect,
            auth_token: get(env_keys::AUTH_TOKEN),
        })
    }

    /// `{ws}/api/game/ws/scenes/{scene}/characters/{character}`
    pub fn scene_chat_url(&self, scene_id: &str, character_id: &str) -> String {
        format!(
            "{}/api/game/ws/scenes/{scene_id}/characters/{character_id}",
            trimmed(&self.ws_url)
        )
    }

    /// `{ws}/api/game/ws/stories/{story}/scene`
    pub fn scene_generation_url(&self, story_id: &str) -> String {
        format!("{}/api/game/ws/stories/{story_id}/scene", trimmed(&self.ws_url))
    }

    /// `{ws}/ws/game`
    pub fn story_generation_url(&self) -> String {
        format!("{}/ws/game", trimmed(&self.ws_url))
    }
}

/// Swap `http`/`https` for `ws`/`wss`, keeping host, port and path.
pub fn websocket_url_for(backend: &Url) -> Result<Url, ConfigError> {
    let scheme = match backend.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ConfigError::UnsupportedScheme(backend.to_string())),
    };
    let mut ws = backend.clone();
    ws.set_scheme(scheme)
        .map_err(|()| ConfigError::UnsupportedScheme(backend.to_string()))?;
    Ok(ws)
}

/// Load `.env.local` then `.env` from the working directory, if present.
pub fn load_dotenv() {
    for filename in [".env.local", ".env"] {
        match dotenvy::from_filename(filename) {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(file = filename, error = %e, "Failed to load environment file"),
        }
    }
}

fn trimmed(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        var,
        value: value.to_string(),
        source,
    })
}

fn parse_number(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_point_at_localhost() {
        let config = config(&[]).unwrap();
        assert_eq!(config.backend_url.as_str(), "http://localhost:8000/");
        assert_eq!(config.ws_url.as_str(), "ws://localhost:8000/");
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn https_backend_derives_wss() {
        let config = config(&[(env_keys::BACKEND_URL, "https://api.example.com")]).unwrap();
        assert_eq!(config.story_generation_url(), "wss://api.example.com/ws/game");
    }

    #[test]
    fn channel_urls() {
        let config = config(&[(env_keys::WS_URL, "ws://game.local:9000/")]).unwrap();
        assert_eq!(
            config.scene_chat_url("s1", "c2"),
            "ws://game.local:9000/api/game/ws/scenes/s1/characters/c2"
        );
        assert_eq!(
            config.scene_generation_url("st3"),
            "ws://game.local:9000/api/game/ws/stories/st3/scene"
        );
    }

    #[test]
    fn reconnect_overrides() {
        let config = config(&[
            (env_keys::RECONNECT_ATTEMPTS, "3"),
            (env_keys::RECONNECT_INITIAL_DELAY_MS, "250"),
            (env_keys::RECONNECT_MAX_DELAY_MS, " 5000 "),
            (env_keys::AUTH_TOKEN, "tok"),
        ])
        .unwrap();
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(5_000));
        assert_eq!(config.auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[(env_keys::RECONNECT_ATTEMPTS, "many")]),
            Err(ConfigError::InvalidNumber { var: env_keys::RECONNECT_ATTEMPTS, .. })
        ));
        assert!(matches!(
            config(&[(env_keys::BACKEND_URL, "not a url")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config(&[(env_keys::BACKEND_URL, "ftp://files.example.com")]),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}
