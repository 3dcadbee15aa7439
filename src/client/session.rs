//! Module `session`
//!
//! Client side of a control connection. Every call writes one command and
//! blocks until its reply arrives; requests are never pipelined.

use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::error::{ClientError, TransferError};
use crate::error::ParseError;
use crate::protocol::{Command, ControlChannel, ControlLine, Outcome, Reply};
use crate::transfer::{DataType, TransferMode};

const DEFAULT_BUFFER_SIZE: usize = 8192;
const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REPLY_LINE: usize = 8192;

/// A logged-in (or not yet) session with an FTP server.
#[derive(Debug)]
pub struct FtpClient {
    control: ControlChannel<OwnedReadHalf, OwnedWriteHalf>,
    local_addr: SocketAddr,
    welcome: String,
    mode: TransferMode,
    data_type: DataType,
    buffer_size: usize,
    data_timeout: Duration,
}

impl FtpClient {
    /// Dials the control connection and consumes the greeting, which must be
    /// a 220.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let local_addr = stream.local_addr()?;
        debug!("Control connection {local_addr} -> {:?}", stream.peer_addr().ok());

        let mut client = Self {
            control: ControlChannel::from_tcp(stream),
            local_addr,
            welcome: String::new(),
            mode: TransferMode::default(),
            data_type: DataType::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            data_timeout: DEFAULT_DATA_TIMEOUT,
        };

        let greeting = client.read_reply().await?;
        if !greeting.is(Outcome::Ready) {
            return Err(ClientError::NotReady(greeting));
        }
        client.welcome = greeting.text;
        Ok(client)
    }

    /// Text of the server's greeting.
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    /// Mode that transfers currently use.
    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Bounds how long a transfer waits for the server to dial in.
    pub fn set_data_timeout(&mut self, timeout: Duration) {
        self.data_timeout = timeout;
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.max(1);
    }

    /// `USER` then, if asked for it, `PASS`.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<(), ClientError> {
        let reply = self.execute(Command::User(user.to_string())).await?;
        match reply.code {
            230 => return Ok(()),
            331 => {}
            _ => return Err(login_error(reply)),
        }

        let reply = self.execute(Command::Pass(password.to_string())).await?;
        if reply.is(Outcome::LoginProceed) {
            info!("Logged in as {user}");
            Ok(())
        } else {
            Err(login_error(reply))
        }
    }

    /// Sends `QUIT`; the server closes the control connection afterwards.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let reply = self.execute(Command::Quit).await?;
        expect(reply, &[Outcome::Closing])
    }

    pub async fn noop(&mut self) -> Result<(), ClientError> {
        let reply = self.execute(Command::Noop).await?;
        expect(reply, &[Outcome::CommandOk])
    }

    /// Negotiates the transfer mode; the local mode changes only on success.
    pub async fn set_mode(&mut self, mode: TransferMode) -> Result<(), ClientError> {
        let reply = self.execute(Command::Mode(mode)).await?;
        match reply.code {
            200 => {
                self.mode = mode;
                Ok(())
            }
            502 | 504 => Err(ClientError::ModeNotSupported(reply)),
            _ => Err(ClientError::UnexpectedReply(reply)),
        }
    }

    pub async fn set_type(&mut self, data_type: DataType) -> Result<(), ClientError> {
        let reply = self.execute(Command::Type(data_type)).await?;
        match reply.code {
            200 => {
                self.data_type = data_type;
                Ok(())
            }
            502 | 504 => Err(ClientError::ModeNotSupported(reply)),
            _ => Err(ClientError::UnexpectedReply(reply)),
        }
    }

    /// Downloads `remote` into the local file at `local`, replacing it once
    /// the server reports completion. A failed download leaves `local` as it
    /// was.
    pub async fn retrieve(
        &mut self,
        local: impl AsRef<Path>,
        remote: &str,
    ) -> Result<u64, ClientError> {
        let local = local.as_ref();
        let partial = partial_path(local);

        match self.retrieve_into(&partial, remote).await {
            Ok(received) => {
                tokio::fs::rename(&partial, local).await?;
                info!("Retrieved {remote}: {received} bytes");
                Ok(received)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    warn!("Failed to remove {}: {cleanup}", partial.display());
                }
                Err(e)
            }
        }
    }

    async fn retrieve_into(&mut self, partial: &Path, remote: &str) -> Result<u64, ClientError> {
        let mut file = File::create(partial).await?;
        let mut stream = self.open_data_connection().await?;

        let reply = self.execute(Command::Retr(remote.to_string())).await?;
        expect(reply, &[Outcome::AlreadyOpen, Outcome::AboutToOpen])?;

        let framing = self.mode.framing(self.data_type, self.buffer_size);
        let received = framing
            .receive(&mut stream, &mut file)
            .await
            .map_err(TransferError::TransferFailed)?;
        drop(stream);
        file.sync_all().await?;

        self.expect_completion().await?;
        Ok(received)
    }

    /// Uploads the local file at `local` as `remote`.
    pub async fn store(&mut self, local: impl AsRef<Path>, remote: &str) -> Result<u64, ClientError> {
        let mut file = File::open(local.as_ref()).await?;
        let mut stream = self.open_data_connection().await?;

        let reply = self.execute(Command::Stor(remote.to_string())).await?;
        expect(reply, &[Outcome::AlreadyOpen, Outcome::AboutToOpen])?;

        let framing = self.mode.framing(self.data_type, self.buffer_size);
        let sent = framing
            .send(&mut file, &mut stream)
            .await
            .map_err(TransferError::TransferFailed)?;
        // Half-close marks end of file for the server.
        stream
            .shutdown()
            .await
            .map_err(TransferError::TransferFailed)?;
        drop(stream);

        self.expect_completion().await?;
        info!("Stored {remote}: {sent} bytes");
        Ok(sent)
    }

    async fn expect_completion(&mut self) -> Result<(), ClientError> {
        let reply = self.read_reply().await?;
        if reply.is(Outcome::TransferComplete) || reply.code == 226 {
            Ok(())
        } else {
            Err(ClientError::UnexpectedReply(reply))
        }
    }

    /// Active mode: listens on the control connection's local IP, announces
    /// it with `PORT` and accepts the server's dial.
    async fn open_data_connection(&mut self) -> Result<TcpStream, ClientError> {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => return Err(ClientError::Ipv6NotSupported(self.local_addr)),
        };
        let listener = TcpListener::bind(SocketAddrV4::new(ip, 0)).await?;
        let SocketAddr::V4(addr) = listener.local_addr()? else {
            return Err(ClientError::Ipv6NotSupported(self.local_addr));
        };

        let reply = self.execute(Command::Port(addr)).await?;
        expect(reply, &[Outcome::CommandOk])?;

        let (stream, peer) = tokio::time::timeout(self.data_timeout, listener.accept())
            .await
            .map_err(|_| ClientError::DataConnectionTimeout)?
            .map_err(TransferError::AcceptFailed)?;
        debug!("Data connection from {peer} on {addr}");
        Ok(stream)
    }

    async fn execute(&mut self, command: Command) -> Result<Reply, ClientError> {
        debug!("> {}", command.redacted());
        self.control.write_command(&command).await?;
        self.read_reply().await
    }

    async fn read_reply_line(&mut self) -> Result<String, ClientError> {
        match self.control.read_line(MAX_REPLY_LINE).await? {
            Some(ControlLine::Line(line)) => Ok(line),
            Some(ControlLine::TooLong) => Err(ParseError::MalformedReply(format!(
                "reply line longer than {MAX_REPLY_LINE} bytes"
            ))
            .into()),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Reads one reply, folding a multi-line reply into a single value.
    async fn read_reply(&mut self) -> Result<Reply, ClientError> {
        let line = self.read_reply_line().await?;
        let (mut reply, continued) = Reply::parse(&line)?;

        if continued {
            let terminator = format!("{} ", reply.code);
            loop {
                let line = self.read_reply_line().await?;
                if line.starts_with(&terminator) || line == reply.code.to_string() {
                    let (last, _) = Reply::parse(&line)?;
                    reply.text.push('\n');
                    reply.text.push_str(&last.text);
                    break;
                }
                reply.text.push('\n');
                reply.text.push_str(line.trim_start());
            }
        }

        debug!("< {reply}");
        Ok(reply)
    }
}

/// Sibling of `local` that a download is written to before it completes.
fn partial_path(local: &Path) -> PathBuf {
    let name = local
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    local.with_file_name(format!(".{name}.part"))
}

fn expect(reply: Reply, accepted: &[Outcome]) -> Result<(), ClientError> {
    if accepted.iter().any(|&outcome| reply.is(outcome)) {
        Ok(())
    } else {
        Err(ClientError::UnexpectedReply(reply))
    }
}

fn login_error(reply: Reply) -> ClientError {
    if reply.is(Outcome::NotLoggedIn) {
        ClientError::PasswordMismatch(reply)
    } else if reply.is(Outcome::NeedAccount) {
        ClientError::UsernameNotFound(reply)
    } else {
        ClientError::UnexpectedReply(reply)
    }
}
