//! Server settings
//!
//! Loaded from an optional TOML file with `CHAT_SERVER_*` environment
//! overrides, e.g. `CHAT_SERVER_PORT=4000` or
//! `CHAT_SERVER_POLICY__KICK_ON_HACK=false`.
//!
//! Note on `read_timeout_secs`: clients only send when their user types and
//! the protocol has no keepalive frame, so a participant who just listens is
//! disconnected once the timeout passes (300 seconds by default) and the
//! others see it leave. Set it to 0 for channels with quiet listeners.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use chat_protocol::Framing;

pub const DEFAULT_CONFIG: &str = "chat_server";
const ENV_PREFIX: &str = "CHAT_SERVER";

/// How strictly the server treats its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerPolicy {
    /// Frames naming a registered participant must come from the address and
    /// port that registered it
    pub check_client_ip_and_port: bool,
    /// Refuse `new` for a name that is already registered
    pub check_new_client_name: bool,
    /// Close the connection on any violation or malformed frame
    pub kick_on_hack: bool,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            check_client_ip_and_port: true,
            check_new_client_name: true,
            kick_on_hack: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub framing: Framing,
    pub policy: ServerPolicy,
    /// Seconds a connection may go without sending a frame before it is
    /// closed, 0 disables the limit. Listening alone does not count as
    /// activity.
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 4321,
            framing: Framing::Text,
            policy: ServerPolicy::default(),
            read_timeout_secs: 300,
            write_timeout_secs: 5,
        }
    }
}

impl ServerSettings {
    /// Load settings from `path`, or from `chat_server.toml` in the working
    /// directory when no path is given (that file may be absent).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };

        let settings: ServerSettings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Message("bind_address cannot be empty".into()));
        }

        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Message("write_timeout_secs must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<ServerSettings, ConfigError> {
        let settings: ServerSettings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn defaults_are_strict() {
        let settings = ServerSettings::default();

        assert_eq!(settings.policy, ServerPolicy {
            check_client_ip_and_port: true,
            check_new_client_name: true,
            kick_on_hack: true,
        });
        assert_eq!(settings.framing, Framing::Text);
        assert_eq!(settings.read_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(settings.socket_addr(), "127.0.0.1:4321");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let settings = from_toml(r#"
            port = 5000
            framing = "object"
            read_timeout_secs = 0

            [policy]
            kick_on_hack = false
        "#).unwrap();

        assert_eq!(settings.port, 5000);
        assert_eq!(settings.framing, Framing::Object);
        assert_eq!(settings.read_timeout(), None);
        assert!(!settings.policy.kick_on_hack);
        assert!(settings.policy.check_new_client_name);
        assert_eq!(settings.bind_address, "127.0.0.1");
    }

    #[test]
    fn rejects_zero_write_timeout() {
        assert!(from_toml("write_timeout_secs = 0").is_err());
    }

    #[test]
    fn missing_default_file_is_fine() {
        let settings = ServerSettings::load(None);
        assert!(settings.is_ok());
    }
}
