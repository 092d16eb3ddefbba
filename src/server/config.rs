//! Demo server configuration.

use crate::router::{RouterConfig, PING_PERIOD};
use crate::stomp::StompConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ServerError;

/// Static file serving.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    /// Document root holding `index.html` and the static directories.
    pub root: PathBuf,
    /// Path prefixes served straight from `root`; every other path gets
    /// `index.html`.
    pub static_prefixes: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 1226,
            root: PathBuf::from("./public"),
            static_prefixes: vec!["/images".into(), "/js".into(), "/css".into()],
        }
    }
}

/// Top-level TOML config. Every field has a default, so an empty file is
/// a valid config.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub broker: StompConfig,
    pub http: HttpConfig,
    pub topic_prefix: String,
    pub resource: String,
    pub ping_period_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let router = RouterConfig::default();
        Self {
            broker: StompConfig::default(),
            http: HttpConfig::default(),
            topic_prefix: router.topic_prefix,
            resource: router.resource,
            ping_period_secs: PING_PERIOD.as_secs(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{}': {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: format!("'{}': {e}", path.display()),
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ServerError> {
        toml::from_str(content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: e.to_string(),
        })
    }

    pub fn router(&self) -> RouterConfig {
        RouterConfig {
            topic_prefix: self.topic_prefix.clone(),
            resource: self.resource.clone(),
        }
    }

    pub fn ping_period(&self) -> Duration {
        Duration::from_secs(self.ping_period_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 61613);
        assert_eq!(config.broker.login, "backbonestomp");
        assert_eq!(config.http.port, 1226);
        assert_eq!(config.http.static_prefixes, vec!["/images", "/js", "/css"]);
        assert_eq!(config.topic_prefix, "/topic/backbonestomp");
        assert_eq!(config.ping_period(), Duration::from_secs(240));
    }

    #[test]
    fn test_partial_override() {
        let config = ServerConfig::from_toml(
            r#"
            topic_prefix = "/topic/demo"
            ping_period_secs = 30

            [broker]
            host = "mq.internal"

            [http]
            root = "/srv/www"
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "mq.internal");
        assert_eq!(config.broker.port, 61613);
        assert_eq!(config.http.root, PathBuf::from("/srv/www"));
        assert_eq!(config.router().topic_prefix, "/topic/demo");
        assert_eq!(config.router().resource, "todos");
        assert_eq!(config.ping_period(), Duration::from_secs(30));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ServerConfig::from_toml("broker = 5").unwrap_err();
        assert!(matches!(err, ServerError::Config { context: "parse", .. }));
    }
}
