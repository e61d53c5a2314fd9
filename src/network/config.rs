//! Server Configuration
//!
//! Layered: compiled defaults, then an optional TOML file, then `PLASMA_*`
//! environment variables. JWT settings come from the `AUTH_*` variables
//! read by [`AuthConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::core::crypt::CipherAlgorithm;
use crate::core::dh::{DhError, DhParams, DEFAULT_PRIVATE_BYTES};
use crate::network::auth::AuthConfig;
use crate::network::handshake::HandshakeSettings;
use crate::protocol::{Limits, PROTOCOL_VERSION};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 14617;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema.
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed to parse or is out of range.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// Offending text.
        value: String,
    },

    /// DH group is unusable.
    #[error("dh parameters: {0}")]
    Dh(#[from] DhError),
}

/// Session cipher and DH group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Stream cipher for session traffic.
    pub cipher: CipherAlgorithm,
    /// DH generator, hex.
    pub dh_generator: String,
    /// DH prime modulus, hex. Unset selects the 768-bit Oakley group.
    pub dh_modulus: Option<String>,
    /// Private exponent length in bytes.
    pub private_bytes: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            cipher: CipherAlgorithm::ChaCha20,
            dh_generator: "2".into(),
            dh_modulus: None,
            private_bytes: DEFAULT_PRIVATE_BYTES,
        }
    }
}

impl CryptoConfig {
    /// Build and validate the DH group.
    pub fn dh_params(&self) -> Result<DhParams, ConfigError> {
        match &self.dh_modulus {
            Some(modulus) => Ok(DhParams::from_hex(&self.dh_generator, modulus, self.private_bytes)?),
            None => {
                let mut params = DhParams::default();
                if self.dh_generator != "2" {
                    params = DhParams::from_hex(
                        &self.dh_generator,
                        &params.modulus.to_hex(),
                        self.private_bytes,
                    )?;
                }
                params.private_bytes = self.private_bytes;
                params.validate()?;
                Ok(params)
            }
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Protocol version required of clients.
    pub protocol_version: u32,
    /// Seconds allowed for the key exchange.
    pub handshake_timeout_secs: u64,
    /// Seconds without traffic before a connection is dropped.
    pub connection_idle_secs: u64,
    /// Seconds without game input before a seat counts as disconnected.
    pub seat_idle_secs: u64,
    /// Game tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Period of the idle and reaping sweep.
    pub cleanup_interval_secs: u64,
    /// Per-connection outbound queue depth.
    pub send_queue: usize,
    /// Concurrent key-agreement jobs.
    pub crypto_workers: usize,
    /// Cipher and DH group.
    pub crypto: CryptoConfig,
    /// Frame and handshake size limits.
    pub limits: Limits,
    /// Vault snapshot file. Unset keeps the vault in memory.
    pub vault_path: Option<PathBuf>,
    /// Account names granted the admin flag on creation.
    pub admin_accounts: Vec<String>,
    /// Addresses handed out by the gatekeeper for auth servers.
    pub auth_servers: Vec<String>,
    /// Addresses handed out by the gatekeeper for file servers.
    pub file_servers: Vec<String>,
    /// Server version string.
    pub version: String,
    /// JWT validation settings.
    #[serde(skip)]
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1000,
            protocol_version: PROTOCOL_VERSION,
            handshake_timeout_secs: 10,
            connection_idle_secs: 300,
            seat_idle_secs: 60,
            tick_interval_ms: 100,
            cleanup_interval_secs: 30,
            send_queue: 64,
            crypto_workers: 4,
            crypto: CryptoConfig::default(),
            limits: Limits::default(),
            vault_path: None,
            admin_accounts: Vec::new(),
            auth_servers: Vec::new(),
            file_servers: Vec::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth: AuthConfig::default(),
        }
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl ServerConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.auth = AuthConfig::from_env();
        config.validate()?;
        Ok(config)
    }

    /// TOML file plus environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.auth = AuthConfig::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML; missing keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `PLASMA_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PLASMA_BIND_ADDR") {
            self.bind_addr = parse("PLASMA_BIND_ADDR", v)?;
        }
        if let Some(v) = lookup("PLASMA_MAX_CONNECTIONS") {
            self.max_connections = parse("PLASMA_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("PLASMA_PROTOCOL_VERSION") {
            self.protocol_version = parse("PLASMA_PROTOCOL_VERSION", v)?;
        }
        if let Some(v) = lookup("PLASMA_HANDSHAKE_TIMEOUT_SECS") {
            self.handshake_timeout_secs = parse("PLASMA_HANDSHAKE_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("PLASMA_CONNECTION_IDLE_SECS") {
            self.connection_idle_secs = parse("PLASMA_CONNECTION_IDLE_SECS", v)?;
        }
        if let Some(v) = lookup("PLASMA_SEAT_IDLE_SECS") {
            self.seat_idle_secs = parse("PLASMA_SEAT_IDLE_SECS", v)?;
        }
        if let Some(v) = lookup("PLASMA_TICK_INTERVAL_MS") {
            self.tick_interval_ms = parse("PLASMA_TICK_INTERVAL_MS", v)?;
        }
        if let Some(v) = lookup("PLASMA_CRYPTO_WORKERS") {
            self.crypto_workers = parse("PLASMA_CRYPTO_WORKERS", v)?;
        }
        if let Some(v) = lookup("PLASMA_CIPHER") {
            self.crypto.cipher = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { key: "PLASMA_CIPHER", value: v })?;
        }
        if let Some(v) = lookup("PLASMA_VAULT_PATH") {
            self.vault_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("PLASMA_ADMIN_ACCOUNTS") {
            self.admin_accounts = list(&v);
        }
        if let Some(v) = lookup("PLASMA_AUTH_SERVERS") {
            self.auth_servers = list(&v);
        }
        if let Some(v) = lookup("PLASMA_FILE_SERVERS") {
            self.file_servers = list(&v);
        }
        Ok(())
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_connections",
                value: "0".into(),
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval_ms",
                value: "0".into(),
            });
        }
        if self.send_queue == 0 {
            return Err(ConfigError::InvalidValue {
                key: "send_queue",
                value: "0".into(),
            });
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "cleanup_interval_secs",
                value: "0".into(),
            });
        }
        self.crypto.dh_params()?;
        Ok(())
    }

    /// Handshake parameters derived from this configuration.
    pub fn handshake_settings(&self) -> Result<HandshakeSettings, ConfigError> {
        Ok(HandshakeSettings {
            version: self.protocol_version,
            build_id: 0,
            cipher: self.crypto.cipher,
            dh: Arc::new(self.crypto.dh_params()?),
            timeout: Duration::from_secs(self.handshake_timeout_secs),
            max_message: self.limits.max_handshake,
        })
    }

    /// Seat idle timeout.
    pub fn seat_idle(&self) -> Duration {
        Duration::from_secs(self.seat_idle_secs)
    }

    /// Connection idle timeout.
    pub fn connection_idle(&self) -> Duration {
        Duration::from_secs(self.connection_idle_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert_eq!(config.crypto.cipher, CipherAlgorithm::ChaCha20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_only_named_keys() {
        let config = ServerConfig::from_toml(
            r#"
            max_connections = 12
            admin_accounts = ["atrus"]

            [crypto]
            cipher = "rc4"

            [limits]
            max_frame_payload = 4096
            "#,
        )
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.admin_accounts, vec!["atrus".to_string()]);
        assert_eq!(config.crypto.cipher, CipherAlgorithm::Rc4);
        assert_eq!(config.limits.max_frame_payload, 4096);
        assert_eq!(config.limits.max_handshake, Limits::default().max_handshake);
        assert_eq!(config.seat_idle_secs, 60);
    }

    #[test]
    fn test_env_overrides() {
        let vars: BTreeMap<&str, &str> = [
            ("PLASMA_BIND_ADDR", "127.0.0.1:9000"),
            ("PLASMA_CIPHER", "RC4"),
            ("PLASMA_SEAT_IDLE_SECS", "5"),
            ("PLASMA_FILE_SERVERS", "10.0.0.1:80, 10.0.0.2:80,"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.crypto.cipher, CipherAlgorithm::Rc4);
        assert_eq!(config.seat_idle(), Duration::from_secs(5));
        assert_eq!(config.file_servers, vec!["10.0.0.1:80", "10.0.0.2:80"]);
    }

    #[test]
    fn test_invalid_override_names_the_key() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PLASMA_MAX_CONNECTIONS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "PLASMA_MAX_CONNECTIONS", .. }
        ));
    }

    #[test]
    fn test_custom_dh_group() {
        let crypto = CryptoConfig {
            dh_generator: "5".into(),
            private_bytes: 16,
            ..CryptoConfig::default()
        };
        let params = crypto.dh_params().unwrap();
        assert_eq!(params.generator, crate::core::bignum::BigNum::from_u64(5));
        assert_eq!(params.private_bytes, 16);

        let broken = CryptoConfig {
            dh_modulus: Some("17".into()),
            ..CryptoConfig::default()
        };
        assert!(matches!(broken.dh_params(), Err(ConfigError::Dh(_))));
    }

    #[test]
    fn test_handshake_settings_follow_config() {
        let config = ServerConfig {
            handshake_timeout_secs: 3,
            ..ServerConfig::default()
        };
        let settings = config.handshake_settings().unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.dh.key_bytes(), 96);
        assert_eq!(settings.max_message, config.limits.max_handshake);
    }
}
