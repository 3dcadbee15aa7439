//! FTP control-channel sessions and the dual-connection transfer model, for
//! both the server and a client driver.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use client::FtpClient;
pub use self::config::ServerConfig;
pub use server::Server;
