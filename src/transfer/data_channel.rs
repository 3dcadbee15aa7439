//! Module `data_channel`
//!
//! Owns the secondary connection used for payload bytes. A session holds at
//! most one data connection at a time: a new `PORT` or `PASV` replaces (and
//! closes) the previous one, and a transfer consumes it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::ops::RangeInclusive;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::error::TransferError;

/// A data connection that exists on the session, either already dialed
/// (active mode) or waiting for the peer to dial in (passive mode).
#[derive(Debug)]
pub enum DataConnection {
    Active(TcpStream),
    Passive(TcpListener),
}

/// Per-session data connection manager.
#[derive(Debug, Default)]
pub struct DataChannel {
    connection: Option<DataConnection>,
}

impl DataChannel {
    /// Returns whether a data connection (dialed or pending) exists.
    pub fn is_open(&self) -> bool {
        self.connection.is_some()
    }

    /// Active mode: dials `addr` and keeps the stream. Any previous connection
    /// is closed first; on failure the channel is left empty.
    pub async fn connect_active(&mut self, addr: SocketAddrV4) -> Result<(), TransferError> {
        self.close();

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransferError::ConnectFailed(SocketAddr::V4(addr), e))?;
        info!("Active mode: connected to data port {addr}");
        self.connection = Some(DataConnection::Active(stream));
        Ok(())
    }

    /// Passive mode: binds the first free port of `ports` on `ip` and keeps the
    /// listener until the next transfer accepts on it.
    pub async fn listen_passive(
        &mut self,
        ip: Ipv4Addr,
        ports: RangeInclusive<u16>,
    ) -> Result<SocketAddrV4, TransferError> {
        self.close();

        let (min, max) = (*ports.start(), *ports.end());
        for port in ports {
            match TcpListener::bind(SocketAddrV4::new(ip, port)).await {
                Ok(listener) => {
                    let local = match listener
                        .local_addr()
                        .map_err(TransferError::ListenerConfigurationFailed)?
                    {
                        SocketAddr::V4(addr) => addr,
                        SocketAddr::V6(_) => SocketAddrV4::new(ip, port),
                    };
                    info!("Passive mode: listening for data connection on {local}");
                    self.connection = Some(DataConnection::Passive(listener));
                    return Ok(local);
                }
                Err(e) => debug!("Passive port {ip}:{port} unavailable: {e}"),
            }
        }
        Err(TransferError::NoAvailablePort { min, max })
    }

    /// Takes the connection out of the session, accepting the peer first in
    /// passive mode. Only a peer from `owner` may use a passive listener.
    ///
    /// Returns `Ok(None)` if no data connection exists.
    pub async fn take_stream(
        &mut self,
        owner: IpAddr,
        accept_timeout: Duration,
    ) -> Result<Option<TcpStream>, TransferError> {
        match self.connection.take() {
            None => Ok(None),
            Some(DataConnection::Active(stream)) => Ok(Some(stream)),
            Some(DataConnection::Passive(listener)) => {
                let local = listener
                    .local_addr()
                    .map_err(TransferError::ListenerConfigurationFailed)?;
                let (stream, peer) = tokio::time::timeout(accept_timeout, listener.accept())
                    .await
                    .map_err(|_| TransferError::ConnectionTimeout(local))?
                    .map_err(TransferError::AcceptFailed)?;

                if peer.ip() != owner {
                    warn!("Rejected data connection from {peer}, session belongs to {owner}");
                    return Err(TransferError::ForeignPeer {
                        peer,
                        expected: owner,
                    });
                }
                info!("Passive mode: accepted data connection from {peer}");
                Ok(Some(stream))
            }
        }
    }

    /// Drops any live stream or pending listener.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            match connection {
                DataConnection::Active(stream) => {
                    debug!("Closing data connection {:?}", stream.peer_addr().ok())
                }
                DataConnection::Passive(listener) => {
                    debug!("Closing passive listener {:?}", listener.local_addr().ok())
                }
            }
        }
    }
}
