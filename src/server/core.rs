//! Module `core`
//!
//! Binds the control listener, caps concurrent clients and spawns a task per
//! accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::auth::{CredentialStore, MemoryCredentials};
use crate::config::ServerConfig;
use crate::error::FtpServerError;
use crate::protocol::{ControlChannel, Outcome};
use crate::server::handle_connection;
use crate::storage::LocalStorage;

/// Read-only state shared by every connection task.
pub struct ServerContext {
    pub config: ServerConfig,
    pub credentials: Arc<dyn CredentialStore>,
    pub storage: LocalStorage,
}

impl ServerContext {
    /// Builds a context whose credentials come from the configured user list.
    pub fn new(config: ServerConfig) -> Self {
        let credentials = Arc::new(MemoryCredentials::from_users(&config.users));
        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(config: ServerConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        let storage = LocalStorage::new(config.server_root.clone());
        Self {
            config,
            credentials,
            storage,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    permits: Arc<Semaphore>,
}

impl Server {
    /// Binds the control listener. Port 0 picks an ephemeral port.
    pub async fn bind(config: ServerConfig) -> Result<Self, FtpServerError> {
        Self::bind_context(ServerContext::new(config)).await
    }

    pub async fn bind_with_credentials(
        config: ServerConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, FtpServerError> {
        Self::bind_context(ServerContext::with_credentials(config, credentials)).await
    }

    async fn bind_context(context: ServerContext) -> Result<Self, FtpServerError> {
        let socket = context.config.control_socket();
        let listener = TcpListener::bind(socket)
            .await
            .map_err(|e| FtpServerError::Bind(socket.to_string(), e))?;
        info!("Server bound to {}", listener.local_addr()?);

        let permits = Arc::new(Semaphore::new(context.config.max_clients));
        Ok(Self {
            listener,
            context: Arc::new(context),
            permits,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, FtpServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one task per control connection.
    pub async fn start(self) {
        info!(
            "Starting FTP server on {:?} (max {} clients, root {})",
            self.listener.local_addr().ok(),
            self.context.config.max_clients,
            self.context.storage.root().display()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                        tokio::spawn(reject_busy(stream, addr));
                        continue;
                    };
                    info!("Accepted connection from {addr}");
                    let context = Arc::clone(&self.context);

                    // Spawn a task for each client so accept loop doesn't block
                    tokio::spawn(async move {
                        handle_connection(stream, addr, context).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
    }
}

async fn reject_busy(stream: TcpStream, addr: SocketAddr) {
    warn!("Rejecting {addr}: connection limit reached");
    let mut control = ControlChannel::from_tcp(stream);
    if let Err(e) = control.write_reply(&Outcome::ServiceUnavailable.into()).await {
        warn!("Failed to notify {addr} of rejection: {e}");
    }
}
