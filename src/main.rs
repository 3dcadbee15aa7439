//! ftp-duplex server - Entry Point
//!
//! Loads `config.toml` (or defaults), prepares the server root and serves
//! control connections until the process is stopped.

use std::process::ExitCode;

use log::{error, info, warn};

use ftp_duplex::{Server, ServerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Falling back to default configuration: {e}");
            ServerConfig::default()
        }
    };

    if let Err(e) = tokio::fs::create_dir_all(&config.server_root).await {
        error!("Failed to create server root {}: {e}", config.server_root.display());
        return ExitCode::FAILURE;
    }
    info!("Server root directory: {}", config.server_root.display());

    info!("Launching FTP server...");
    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    server.start().await;
    ExitCode::SUCCESS
}
