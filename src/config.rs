//! Configuration management
//!
//! Loads `config.toml` (optional) with `FTP_DUPLEX_*` environment overrides.
//! Every key has a default, so an empty environment yields a working server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

/// A login accepted by the server.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
}

/// Complete server configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address the control listener binds to
    pub bind_address: IpAddr,

    /// Port for the control connection
    pub control_port: u16,

    /// Inclusive port range for PASV listeners
    pub passive_port_min: u16,
    pub passive_port_max: u16,

    /// Directory that RETR/STOR paths resolve under
    pub server_root: PathBuf,

    /// Chunk size used when copying transfer payloads
    pub buffer_size: usize,

    /// Longest accepted control line, in bytes
    pub max_command_length: usize,

    /// Concurrent control connections
    pub max_clients: usize,

    /// How long a PASV listener waits for the peer to dial in
    pub data_connection_timeout_secs: u64,

    /// Reject RETR with 530 until the session has logged in
    pub require_login_for_retr: bool,

    pub users: Vec<UserEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            control_port: 2121,
            passive_port_min: 2122,
            passive_port_max: 2222,
            server_root: PathBuf::from("./server_root"),
            buffer_size: 8192,
            max_command_length: 512,
            max_clients: 10,
            data_connection_timeout_secs: 30,
            require_login_for_retr: false,
            users: vec![UserEntry {
                name: "test".into(),
                password: "test".into(),
            }],
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("FTP_DUPLEX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.passive_port_min == 0 || self.passive_port_min > self.passive_port_max {
            return Err(config::ConfigError::Message(
                "passive_port_min must be non-zero and not above passive_port_max".into(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(config::ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.max_command_length < 8 {
            return Err(config::ConfigError::Message(
                "max_command_length must be at least 8".into(),
            ));
        }

        if self.max_clients == 0 {
            return Err(config::ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.server_root.as_os_str().is_empty() {
            return Err(config::ConfigError::Message(
                "server_root cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Bind address and control port as a socket address
    pub fn control_socket(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.control_port)
    }

    pub fn passive_ports(&self) -> RangeInclusive<u16> {
        self.passive_port_min..=self.passive_port_max
    }

    pub fn data_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.data_connection_timeout_secs)
    }
}
