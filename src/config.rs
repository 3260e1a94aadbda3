use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::utils::is_valid_url;

pub const API_URL_VAR: &str = "VIDEO_FETCH_API_URL";
pub const WS_URL_VAR: &str = "VIDEO_FETCH_WS_URL";
pub const DOWNLOAD_DIR_VAR: &str = "VIDEO_FETCH_DOWNLOAD_DIR";

const DEFAULT_HTTP_BASE: &str = "http://127.0.0.1:8000";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be an http(s) URL, got {1:?}")]
    InvalidHttpBase(&'static str, String),

    #[error("{0} must be a ws(s) URL, got {1:?}")]
    InvalidStreamBase(&'static str, String),
}

/// How a slot polls the backend for task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 5,
        }
    }
}

/// Configuration handed to every component at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend HTTP address, without trailing slash.
    pub http_base: String,
    /// Backend WebSocket address, without trailing slash.
    pub stream_base: String,
    /// Where finished files are written. `None` asks the user each time.
    pub download_dir: Option<PathBuf>,
    pub poll: PollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_base: DEFAULT_HTTP_BASE.to_string(),
            stream_base: "ws://127.0.0.1:8000".to_string(),
            download_dir: None,
            poll: PollPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Build a config from explicit base addresses. The stream base is
    /// derived from the HTTP base when not given.
    pub fn new(http_base: &str, stream_base: Option<&str>) -> Result<Self, ConfigError> {
        if !is_valid_url(http_base) {
            return Err(ConfigError::InvalidHttpBase(API_URL_VAR, http_base.to_string()));
        }
        let stream_base = match stream_base {
            Some(base) => validate_stream_base(base)?,
            None => derive_stream_base(http_base)?,
        };

        Ok(Self {
            http_base: http_base.trim_end_matches('/').to_string(),
            stream_base,
            ..Default::default()
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let http_base = present(API_URL_VAR).unwrap_or_else(|| DEFAULT_HTTP_BASE.to_string());
        let stream_base = present(WS_URL_VAR);

        let config = Self::new(http_base.trim(), stream_base.as_deref().map(str::trim))?;
        Ok(match present(DOWNLOAD_DIR_VAR) {
            Some(dir) => config.with_download_dir(dir),
            None => config,
        })
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// Resolve a backend-relative reference (thumbnail or file path).
    pub fn resolve(&self, reference: &str) -> String {
        if is_valid_url(reference) {
            return reference.to_string();
        }
        if reference.starts_with('/') {
            format!("{}{}", self.http_base, reference)
        } else {
            format!("{}/{}", self.http_base, reference)
        }
    }

    pub fn download_channel_url(&self) -> String {
        format!("{}/video/download", self.stream_base)
    }
}

fn validate_stream_base(base: &str) -> Result<String, ConfigError> {
    match Url::parse(base) {
        Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => {
            Ok(base.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::InvalidStreamBase(WS_URL_VAR, base.to_string())),
    }
}

fn derive_stream_base(http_base: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidHttpBase(API_URL_VAR, http_base.to_string());
    let mut url = Url::parse(http_base).map_err(|_| invalid())?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    impl ClientConfig {
        pub fn with_poll(mut self, poll: PollPolicy) -> Self {
            self.poll = poll;
            self
        }
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.http_base, "http://127.0.0.1:8000");
        assert_eq!(config.stream_base, "ws://127.0.0.1:8000");
        assert_eq!(config.download_dir, None);
        assert_eq!(config.poll, PollPolicy::default());
    }

    #[test]
    fn test_stream_base_follows_https() {
        let config =
            ClientConfig::from_lookup(lookup(&[(API_URL_VAR, "https://media.example.com/")]))
                .unwrap();
        assert_eq!(config.http_base, "https://media.example.com");
        assert_eq!(config.stream_base, "wss://media.example.com");
    }

    #[test]
    fn test_explicit_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (API_URL_VAR, "http://10.0.0.2:9000"),
            (WS_URL_VAR, "ws://10.0.0.3:9001"),
            (DOWNLOAD_DIR_VAR, "/tmp/videos"),
        ]))
        .unwrap();
        assert_eq!(config.http_base, "http://10.0.0.2:9000");
        assert_eq!(config.stream_base, "ws://10.0.0.3:9001");
        assert_eq!(config.download_dir, Some(PathBuf::from("/tmp/videos")));
        assert_eq!(
            config.download_channel_url(),
            "ws://10.0.0.3:9001/video/download"
        );
    }

    #[test]
    fn test_rejects_bad_bases() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(API_URL_VAR, "ftp://host")])),
            Err(ConfigError::InvalidHttpBase(..))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(WS_URL_VAR, "http://host")])),
            Err(ConfigError::InvalidStreamBase(..))
        ));
    }

    #[test]
    fn test_resolve_relative_references() {
        let config = ClientConfig::default();
        assert_eq!(
            config.resolve("/thumbnails/a.jpg"),
            "http://127.0.0.1:8000/thumbnails/a.jpg"
        );
        assert_eq!(
            config.resolve("videos/a.mp4"),
            "http://127.0.0.1:8000/videos/a.mp4"
        );
        assert_eq!(
            config.resolve("https://cdn.example.com/a.jpg"),
            "https://cdn.example.com/a.jpg"
        );
    }
}
