//! Error types
//!
//! Defines domain-specific error types for each part of the FTP server and
//! the client driver.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::{Outcome, Reply};

/// Command line parse errors. Each one is answered with a single negative
/// reply and the session keeps reading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0} requires a parameter")]
    MissingParameter(&'static str),
    #[error("invalid host-port specification: {0}")]
    InvalidHostPort(String),
    #[error("invalid parameter for {verb}: {param}")]
    InvalidParameter { verb: &'static str, param: String },
    #[error("unsupported parameter for {verb}: {param}")]
    UnsupportedParameter { verb: &'static str, param: String },
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

impl ParseError {
    /// The reply sent back for a command that failed to parse.
    pub fn reply(&self) -> Reply {
        match self {
            ParseError::UnsupportedParameter { .. } => Outcome::ModeNotSupported.into(),
            _ => Outcome::ParameterSyntaxError.into(),
        }
    }
}

/// Storage (filesystem collaborator) errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("path traversal attempt: {0}")]
    PathTraversal(String),
    #[error("invalid path: {0:?}")]
    InvalidPath(String),
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Data connection and transfer errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("failed to connect to data port {0}: {1}")]
    ConnectFailed(SocketAddr, #[source] io::Error),
    #[error("no free passive port in {min}..={max}")]
    NoAvailablePort { min: u16, max: u16 },
    #[error("passive listener has no local address: {0}")]
    ListenerConfigurationFailed(#[source] io::Error),
    #[error("timed out waiting for data connection on {0}")]
    ConnectionTimeout(SocketAddr),
    #[error("rejected data connection from {peer}, expected {expected}")]
    ForeignPeer {
        peer: SocketAddr,
        expected: std::net::IpAddr,
    },
    #[error("data connection accept failed: {0}")]
    AcceptFailed(#[source] io::Error),
    #[error("transfer failed: {0}")]
    TransferFailed(#[source] io::Error),
}

impl TransferError {
    /// The reply sent on the control connection when a transfer cannot go on.
    pub fn outcome(&self) -> Outcome {
        match self {
            TransferError::TransferFailed(_) => Outcome::TransferAborted,
            _ => Outcome::CantOpenData,
        }
    }
}

/// Server-side failures surfaced to the connection loop or the bootstrap code.
#[derive(Debug, Error)]
pub enum FtpServerError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, #[source] io::Error),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by the client driver, keyed off the reply actually received.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("username not found: {0}")]
    UsernameNotFound(Reply),
    #[error("password does not match: {0}")]
    PasswordMismatch(Reply),
    #[error("transfer mode not supported by server: {0}")]
    ModeNotSupported(Reply),
    #[error("server not ready: {0}")]
    NotReady(Reply),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(Reply),
    #[error(transparent)]
    MalformedReply(#[from] ParseError),
    #[error("control connection closed by server")]
    ConnectionClosed,
    #[error("active mode needs an IPv4 control connection, got {0}")]
    Ipv6NotSupported(SocketAddr),
    #[error("server did not open the data connection within the timeout")]
    DataConnectionTimeout,
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
