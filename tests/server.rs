mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{RawControl, start_server, start_server_with_credentials};
use ftp_duplex::ServerConfig;
use ftp_duplex::auth::CredentialStore;
use ftp_duplex::protocol::{format_host_port, parse_host_port};

async fn data_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let SocketAddr::V4(addr) = listener.local_addr().unwrap() else {
        unreachable!()
    };
    (listener, format!("PORT {}", format_host_port(addr)))
}

fn passive_addr(reply: &str) -> SocketAddr {
    let start = reply.find('(').unwrap() + 1;
    let end = reply.find(')').unwrap();
    SocketAddr::V4(parse_host_port(&reply[start..end]).unwrap())
}

#[tokio::test]
async fn test_store_scenario_wire_exact() {
    let (addr, root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;

    assert_eq!(control.reply().await, "220 Service ready for new user.\r\n");
    control.login().await;

    // No data connection yet: preliminary reply only.
    assert_eq!(
        control.command("STOR test.txt").await,
        "150 File status okay; about to open data connection.\r\n"
    );
    assert!(!root.path().join("test.txt").exists());

    let (listener, port) = data_listener().await;
    assert_eq!(control.command(&port).await, "200 Command okay.\r\n");
    let (mut data, _) = listener.accept().await.unwrap();

    assert_eq!(
        control.command("STOR test.txt").await,
        "125 Data connection already open; transfer starting.\r\n"
    );
    data.write_all(b"test data\r\n").await.unwrap();
    drop(data);
    assert_eq!(
        control.reply().await,
        "250 Requested file action okay, completed.\r\n"
    );
    assert_eq!(
        std::fs::read(root.path().join("test.txt")).unwrap(),
        b"test data\r\n"
    );

    assert_eq!(
        control.command("QUIT").await,
        "221 Service closing control connection.\r\n"
    );
    assert_eq!(control.reply().await, "");
}

#[tokio::test]
async fn test_stor_requires_login() {
    let (addr, root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    assert_eq!(
        control.command("STOR test.txt").await,
        "532 Need account for storing files.\r\n"
    );
    assert_eq!(control.command("PORT 127,0,0,1,21,80").await, "530 Not logged in.\r\n");
    assert!(!root.path().join("test.txt").exists());
}

#[tokio::test]
async fn test_noise_and_errors_keep_session_alive() {
    let (addr, _root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    control.send("").await;
    control.send("ab").await;
    assert_eq!(control.command("NOOP").await, "200 Command okay.\r\n");
    assert_eq!(
        control.command("XPWD").await,
        "500 Syntax error, command unrecognized.\r\n"
    );
    assert_eq!(
        control.command("PORT 1,2,3").await,
        "501 Syntax error in parameters or arguments.\r\n"
    );
    assert_eq!(
        control.command(&format!("NOOP {}", "x".repeat(600))).await,
        "500 Command line too long.\r\n"
    );
    assert_eq!(control.command("PASS test").await, "503 Bad sequence of commands.\r\n");
    assert_eq!(control.command("noop").await, "200 Command okay.\r\n");
}

#[tokio::test]
async fn test_oversize_line_answered_before_newline() {
    let (addr, _root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    // Far more than max_command_length, sent in pieces with no newline.
    for _ in 0..64 {
        control.write_raw(&[b'A'; 1024]).await;
    }
    let reply = tokio::time::timeout(Duration::from_secs(5), control.reply())
        .await
        .expect("no reply to an unterminated oversize line");
    assert_eq!(reply, "500 Command line too long.\r\n");

    // The rest of the line is dropped and the session carries on.
    control.write_raw(&[b'A'; 4096]).await;
    control.write_raw(b"\r\n").await;
    assert_eq!(control.command("NOOP").await, "200 Command okay.\r\n");
}

/// Accepts any user name whose password is the name reversed.
struct ReversedPassword;

impl CredentialStore for ReversedPassword {
    fn user_exists(&self, name: &str) -> bool {
        !name.is_empty()
    }

    fn verify_credentials(&self, name: &str, password: &str) -> bool {
        name.chars().rev().eq(password.chars())
    }
}

#[tokio::test]
async fn test_custom_credential_store() {
    let credentials: Arc<dyn CredentialStore> = Arc::new(ReversedPassword);
    let (addr, _root) = start_server_with_credentials(ServerConfig::default(), credentials).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    // The configured test/test user is not consulted.
    control.command("USER test").await;
    assert_eq!(control.command("PASS test").await, "530 Not logged in.\r\n");

    assert_eq!(
        control.command("USER alice").await,
        "331 User name okay, need password.\r\n"
    );
    assert_eq!(
        control.command("PASS ecila").await,
        "230 User logged in, proceed.\r\n"
    );
}

#[tokio::test]
async fn test_retr_without_login_is_allowed() {
    let (addr, _root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    assert_eq!(
        control.command("RETR anything.txt").await,
        "150 File status okay; about to open data connection.\r\n"
    );
}

#[tokio::test]
async fn test_retr_login_gate_when_configured() {
    let config = ServerConfig {
        require_login_for_retr: true,
        ..ServerConfig::default()
    };
    let (addr, _root) = start_server(config).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;

    assert_eq!(control.command("RETR a.txt").await, "530 Not logged in.\r\n");
}

#[tokio::test]
async fn test_retr_missing_file_closes_data_connection() {
    let (addr, _root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;
    control.login().await;

    let (listener, port) = data_listener().await;
    assert_eq!(control.command(&port).await, "200 Command okay.\r\n");
    let (mut data, _) = listener.accept().await.unwrap();

    assert_eq!(
        control.command("RETR missing.txt").await,
        "550 Requested action not taken. File unavailable.\r\n"
    );
    let mut buf = Vec::new();
    assert_eq!(data.read_to_end(&mut buf).await.unwrap(), 0);

    // The connection was consumed.
    assert_eq!(
        control.command("RETR missing.txt").await,
        "150 File status okay; about to open data connection.\r\n"
    );
}

#[tokio::test]
async fn test_traversal_is_refused() {
    let (addr, _root) = start_server(ServerConfig::default()).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;
    control.login().await;

    let (listener, port) = data_listener().await;
    control.command(&port).await;
    let _data = listener.accept().await.unwrap();
    assert_eq!(
        control.command("STOR ../escape.txt").await,
        "550 Requested action not taken. File unavailable.\r\n"
    );
}

#[tokio::test]
async fn test_active_retrieve() {
    let (addr, root) = start_server(ServerConfig::default()).await;
    std::fs::write(root.path().join("hello.txt"), b"hello over the wire").unwrap();

    let mut control = RawControl::connect(addr).await;
    control.reply().await;
    control.login().await;

    let (listener, port) = data_listener().await;
    control.command(&port).await;
    let (mut data, _) = listener.accept().await.unwrap();

    assert_eq!(
        control.command("RETR hello.txt").await,
        "125 Data connection already open; transfer starting.\r\n"
    );
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"hello over the wire");
    assert_eq!(
        control.reply().await,
        "250 Requested file action okay, completed.\r\n"
    );
}

#[tokio::test]
async fn test_passive_store_and_retrieve() {
    let config = ServerConfig {
        passive_port_min: 41000,
        passive_port_max: 41100,
        ..ServerConfig::default()
    };
    let (addr, root) = start_server(config).await;
    let mut control = RawControl::connect(addr).await;
    control.reply().await;
    control.login().await;

    let reply = control.command("PASV").await;
    assert!(reply.starts_with("227 Entering Passive Mode ("), "{reply}");
    let mut data = TcpStream::connect(passive_addr(&reply)).await.unwrap();
    assert_eq!(
        control.command("STOR passive.bin").await,
        "125 Data connection already open; transfer starting.\r\n"
    );
    data.write_all(&[0u8, 1, 2, 255]).await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    assert_eq!(
        control.reply().await,
        "250 Requested file action okay, completed.\r\n"
    );
    assert_eq!(
        std::fs::read(root.path().join("passive.bin")).unwrap(),
        [0u8, 1, 2, 255]
    );

    let reply = control.command("PASV").await;
    let mut data = TcpStream::connect(passive_addr(&reply)).await.unwrap();
    control.send("RETR passive.bin").await;
    assert_eq!(
        control.reply().await,
        "125 Data connection already open; transfer starting.\r\n"
    );
    let mut received = Vec::new();
    data.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, [0u8, 1, 2, 255]);
    assert_eq!(
        control.reply().await,
        "250 Requested file action okay, completed.\r\n"
    );
}

#[tokio::test]
async fn test_connection_limit() {
    let config = ServerConfig {
        max_clients: 1,
        ..ServerConfig::default()
    };
    let (addr, _root) = start_server(config).await;

    let mut first = RawControl::connect(addr).await;
    assert_eq!(first.reply().await, "220 Service ready for new user.\r\n");

    let mut second = RawControl::connect(addr).await;
    assert_eq!(
        second.reply().await,
        "421 Too many connections. Try again later.\r\n"
    );

    first.command("QUIT").await;
    assert_eq!(first.reply().await, "");
}
