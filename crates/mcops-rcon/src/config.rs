//! Remote console configuration, normally read from `server.properties`.

use mcops_common::{duration_serde, RconError, RconResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::client::DEFAULT_TIMEOUT;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_RCON_PORT: u16 = 25575;
pub const DEFAULT_GAME_PORT: u16 = 25565;

#[derive(Clone, Serialize, Deserialize)]
pub struct RconConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_RCON_PORT
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
            password: String::new(),
            timeout: default_timeout(),
        }
    }
}

// Password stays out of logs.
impl std::fmt::Debug for RconConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &if self.password.is_empty() { "<empty>" } else { "<redacted>" })
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RconConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            enabled: true,
            host: host.into(),
            port,
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from the game server's `server.properties`.
    ///
    /// A missing file is not an error: the console is simply disabled.
    pub fn from_server_properties(path: impl AsRef<Path>) -> RconResult<Self> {
        let props = ServerProperties::load(path)?;
        Ok(props.rcon_config())
    }

    /// Fails with `NotConfigured` when a session could never succeed.
    pub fn ensure_usable(&self) -> RconResult<()> {
        if !self.enabled {
            return Err(RconError::not_configured("enable-rcon is false"));
        }
        if self.password.is_empty() {
            return Err(RconError::not_configured("rcon.password is empty"));
        }
        Ok(())
    }

    pub fn is_usable(&self) -> bool {
        self.ensure_usable().is_ok()
    }
}

/// Parsed `key=value` lines of `server.properties`.
#[derive(Debug, Clone, Default)]
pub struct ServerProperties {
    values: HashMap<String, String>,
}

impl ServerProperties {
    pub fn load(path: impl AsRef<Path>) -> RconResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No server.properties at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(RconError::not_configured(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn game_port(&self) -> u16 {
        self.get("server-port")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_GAME_PORT)
    }

    pub fn rcon_config(&self) -> RconConfig {
        RconConfig {
            enabled: self
                .get("enable-rcon")
                .map_or(false, |v| v.eq_ignore_ascii_case("true")),
            host: DEFAULT_HOST.to_string(),
            port: self
                .get("rcon.port")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RCON_PORT),
            password: self.get("rcon.password").unwrap_or_default().to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPERTIES: &str = "\
#Minecraft server properties
enable-rcon=true
rcon.port=25580
rcon.password = s3cret
server-port=25566
motd=A Minecraft Server
";

    #[test]
    fn test_parse_properties() {
        let props = ServerProperties::parse(PROPERTIES);
        let config = props.rcon_config();

        assert!(config.enabled);
        assert_eq!(config.port, 25580);
        assert_eq!(config.password, "s3cret");
        assert_eq!(props.game_port(), 25566);
        assert_eq!(props.get("motd"), Some("A Minecraft Server"));
    }

    #[test]
    fn test_missing_file_disables_console() {
        let dir = tempfile::tempdir().unwrap();
        let config = RconConfig::from_server_properties(dir.path().join("server.properties")).unwrap();

        assert!(!config.enabled);
        assert!(matches!(
            config.ensure_usable(),
            Err(RconError::NotConfigured { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = RconConfig::new("127.0.0.1", 25575, "topsecret");
        assert!(!format!("{:?}", config).contains("topsecret"));
    }

    #[test]
    fn test_empty_password_not_usable() {
        let mut config = RconConfig::new("127.0.0.1", 25575, "");
        assert!(!config.is_usable());
        config.password = "pw".to_string();
        assert!(config.is_usable());
    }
}
