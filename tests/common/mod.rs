#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use ftp_duplex::auth::CredentialStore;
use ftp_duplex::{Server, ServerConfig};

fn scratch_config(config: ServerConfig, root: &tempfile::TempDir) -> ServerConfig {
    ServerConfig {
        control_port: 0,
        server_root: root.path().to_path_buf(),
        ..config
    }
}

/// Starts a server on an ephemeral port with a scratch root.
pub async fn start_server(config: ServerConfig) -> (SocketAddr, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let server = Server::bind(scratch_config(config, &root)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.start());
    (addr, root)
}

/// Same as [`start_server`] but with a caller-supplied credential store.
pub async fn start_server_with_credentials(
    config: ServerConfig,
    credentials: Arc<dyn CredentialStore>,
) -> (SocketAddr, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let server = Server::bind_with_credentials(scratch_config(config, &root), credentials)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.start());
    (addr, root)
}

/// Raw control connection speaking wire lines.
pub struct RawControl {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RawControl {
    pub async fn connect(addr: SocketAddr) -> Self {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(r),
            writer: w,
        }
    }

    /// Writes bytes as they are, without a line terminator.
    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\r\n").await.unwrap();
    }

    /// Next reply line including its CRLF, empty at end of stream.
    pub async fn reply(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line
    }

    pub async fn command(&mut self, line: &str) -> String {
        self.send(line).await;
        self.reply().await
    }

    pub async fn login(&mut self) {
        assert_eq!(self.command("USER test").await, "331 User name okay, need password.\r\n");
        assert_eq!(self.command("PASS test").await, "230 User logged in, proceed.\r\n");
    }
}
