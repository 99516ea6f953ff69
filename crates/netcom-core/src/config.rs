//! Configuration system for Netcom.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $NETCOM_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/netcom/config.toml
//!   3. ~/.config/netcom/config.toml

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::endpoint::{parse_host, Endpoint, EndpointError, Protocol};
use crate::frame::DEFAULT_MAX_FRAME;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetcomConfig {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// "tcp" or "udp".
    pub protocol: Protocol,
    /// `localhost`, `@` for any, or an IP literal. A concrete non-loopback
    /// address restricts the service to that single remote.
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest payload a peer may declare in a frame header.
    pub max_frame_bytes: usize,
    /// Receive buffer for a single UDP datagram.
    pub recv_buffer_bytes: usize,
    /// Unregistered UDP peers allowed to hold a partial frame at once.
    /// The oldest is discarded when another one arrives.
    pub max_pending_peers: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            address: "localhost".to_string(),
            port: 7070,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME,
            recv_buffer_bytes: 65_536,
            max_pending_peers: 64,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("netcom")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NetcomConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a specific file, falling back to defaults when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(NetcomConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("NETCOM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NetcomConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply NETCOM_* overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("NETCOM_SERVER__PROTOCOL") {
            if let Ok(p) = v.parse() {
                self.server.protocol = p;
            }
        }
        if let Some(v) = var("NETCOM_SERVER__ADDRESS") {
            self.server.address = v;
        }
        if let Some(v) = var("NETCOM_SERVER__PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Some(v) = var("NETCOM_LIMITS__MAX_FRAME_BYTES") {
            if let Ok(n) = v.parse() {
                self.limits.max_frame_bytes = n;
            }
        }
        if let Some(v) = var("NETCOM_LIMITS__MAX_PENDING_PEERS") {
            if let Ok(n) = v.parse() {
                self.limits.max_pending_peers = n;
            }
        }
    }

    /// The endpoint described by the `[server]` section.
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        let address: IpAddr = parse_host(&self.server.address)?;
        Ok(Endpoint::new(self.server.protocol, address, self.server.port))
    }

    /// Replace the `[server]` section with an explicit endpoint.
    pub fn set_endpoint(&mut self, endpoint: &Endpoint) {
        self.server.protocol = endpoint.protocol;
        self.server.address = endpoint.address.to_string();
        self.server.port = endpoint.port;
    }
}
