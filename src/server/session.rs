//! Module `session`
//!
//! Per-connection state on the server: login progress, the negotiated
//! mode/type/structure and the session's data connection. A session is owned
//! by the task serving its control connection and never shared.

use std::net::SocketAddr;

use crate::transfer::{DataChannel, DataType, FileStructure, TransferMode};

/// State of one control connection.
#[derive(Debug)]
pub struct Session {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    username: Option<String>,
    authenticated: bool,
    mode: TransferMode,
    type_: DataType,
    stru: FileStructure,
    data: DataChannel,
}

impl Session {
    pub fn new(peer_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            local_addr,
            username: None,
            authenticated: false,
            mode: TransferMode::default(),
            type_: DataType::default(),
            stru: FileStructure::default(),
            data: DataChannel::default(),
        }
    }

    /// Forgets the login. Negotiated parameters and the data connection are
    /// left as they are.
    pub fn logout(&mut self) {
        self.username = None;
        self.authenticated = false;
    }

    // --------------------
    // Getter methods
    // --------------------

    /// Address of the client on the control connection.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Server side address of the control connection; PASV listens on its IP.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Name accepted by the last `USER`, if any.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns whether a `PASS` matching the pending username has succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn data_type(&self) -> DataType {
        self.type_
    }

    pub fn structure(&self) -> FileStructure {
        self.stru
    }

    pub fn data_channel(&self) -> &DataChannel {
        &self.data
    }

    pub fn data_channel_mut(&mut self) -> &mut DataChannel {
        &mut self.data
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    pub fn set_mode(&mut self, mode: TransferMode) {
        self.mode = mode;
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.type_ = data_type;
    }

    pub fn set_structure(&mut self, stru: FileStructure) {
        self.stru = stru;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let addr: SocketAddr = "127.0.0.1:2121".parse().unwrap();
        let session = Session::new(addr, addr);
        assert!(!session.is_authenticated());
        assert_eq!(session.username(), None);
        assert_eq!(session.mode(), TransferMode::Stream);
        assert_eq!(session.data_type(), DataType::Ascii);
        assert_eq!(session.structure(), FileStructure::File);
        assert!(!session.data_channel().is_open());
    }

    #[test]
    fn test_logout_keeps_negotiated_mode() {
        let addr: SocketAddr = "127.0.0.1:2121".parse().unwrap();
        let mut session = Session::new(addr, addr);
        session.set_username(Some("test".into()));
        session.set_authenticated(true);
        session.set_mode(TransferMode::Compressed);

        session.logout();
        assert!(!session.is_authenticated());
        assert_eq!(session.username(), None);
        assert_eq!(session.mode(), TransferMode::Compressed);
    }
}
