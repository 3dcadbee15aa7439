//! Command handlers
//!
//! One `handle_cmd_*` function per verb. Each handler writes exactly one
//! final reply (transfers also write their preliminary 125/150) and reports a
//! [`CommandStatus`] to the connection loop.

use std::net::{SocketAddr, SocketAddrV4};

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::FtpServerError;
use crate::protocol::{Command, CommandStatus, ControlChannel, Outcome, Reply, format_host_port};
use crate::server::{ServerContext, Session};
use crate::transfer::{DataType, Direction, FileStructure, TransferMode, run_transfer};

/// Everything a handler may touch while serving one command.
pub struct CommandContext<'a, R, W> {
    pub session: &'a mut Session,
    pub control: &'a mut ControlChannel<R, W>,
    pub server: &'a ServerContext,
}

impl<R, W> CommandContext<'_, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Writes a reply line to the client.
    pub async fn reply(&mut self, reply: impl Into<Reply>) -> Result<(), FtpServerError> {
        let reply = reply.into();
        info!("Sending response to client {}: {}", self.session.peer_addr(), reply);
        self.control.write_reply(&reply).await?;
        Ok(())
    }
}

/// Dispatches a parsed command to its handler.
pub async fn handle_command<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    command: Command,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match command {
        Command::User(name) => handle_cmd_user(ctx, name).await,
        Command::Pass(password) => handle_cmd_pass(ctx, &password).await,
        Command::Quit => handle_cmd_quit(ctx).await,
        Command::Noop => handle_cmd_noop(ctx).await,
        Command::Port(addr) => handle_cmd_port(ctx, addr).await,
        Command::Pasv => handle_cmd_pasv(ctx).await,
        Command::Mode(mode) => handle_cmd_mode(ctx, mode).await,
        Command::Type(data_type) => handle_cmd_type(ctx, data_type).await,
        Command::Stru(stru) => handle_cmd_stru(ctx, stru).await,
        Command::Retr(path) => handle_cmd_retr(ctx, &path).await,
        Command::Stor(path) => handle_cmd_stor(ctx, &path).await,
        Command::Unknown(verb) => handle_cmd_unknown(ctx, &verb).await,
    }
}

async fn handle_cmd_user<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    name: String,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if ctx.session.is_authenticated() {
        ctx.reply(Outcome::LoginProceed).await?;
        return Ok(CommandStatus::Success);
    }

    ctx.session.logout();
    if ctx.server.credentials.user_exists(&name) {
        info!("Client {} identified as {name}", ctx.session.peer_addr());
        ctx.session.set_username(Some(name));
        ctx.reply(Outcome::UsernameOk).await?;
        Ok(CommandStatus::Success)
    } else {
        warn!("Client {} sent unknown user {name}", ctx.session.peer_addr());
        ctx.reply(Outcome::NeedAccount).await?;
        Ok(CommandStatus::Failure(format!("unknown user {name}")))
    }
}

async fn handle_cmd_pass<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    password: &str,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if ctx.session.is_authenticated() {
        ctx.reply(Outcome::LoginProceed).await?;
        return Ok(CommandStatus::Success);
    }

    let Some(name) = ctx.session.username().map(str::to_owned) else {
        ctx.reply(Outcome::BadSequence).await?;
        return Ok(CommandStatus::Failure("PASS before USER".into()));
    };

    if ctx.server.credentials.verify_credentials(&name, password) {
        ctx.session.set_authenticated(true);
        info!("Client {} logged in as {name}", ctx.session.peer_addr());
        ctx.reply(Outcome::LoginProceed).await?;
        Ok(CommandStatus::Success)
    } else {
        ctx.session.logout();
        warn!("Client {} failed login as {name}", ctx.session.peer_addr());
        ctx.reply(Outcome::NotLoggedIn).await?;
        Ok(CommandStatus::Failure("password mismatch".into()))
    }
}

async fn handle_cmd_quit<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ctx.session.data_channel_mut().close();
    ctx.reply(Outcome::Closing).await?;
    Ok(CommandStatus::CloseConnection)
}

async fn handle_cmd_noop<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ctx.reply(Outcome::CommandOk).await?;
    Ok(CommandStatus::Success)
}

/// Active mode. A dial failure is answered with 425 and also returned as an
/// error so the connection loop logs it.
async fn handle_cmd_port<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    addr: SocketAddrV4,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.session.is_authenticated() {
        ctx.reply(Outcome::NotLoggedIn).await?;
        return Ok(CommandStatus::Failure("PORT before login".into()));
    }

    match ctx.session.data_channel_mut().connect_active(addr).await {
        Ok(()) => {
            ctx.reply(Outcome::CommandOk).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => {
            ctx.reply(e.outcome()).await?;
            Err(e.into())
        }
    }
}

async fn handle_cmd_pasv<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.session.is_authenticated() {
        ctx.reply(Outcome::NotLoggedIn).await?;
        return Ok(CommandStatus::Failure("PASV before login".into()));
    }

    let ip = match ctx.session.local_addr() {
        SocketAddr::V4(addr) => Some(*addr.ip()),
        SocketAddr::V6(addr) => addr.ip().to_ipv4_mapped(),
    };
    let Some(ip) = ip else {
        ctx.session.data_channel_mut().close();
        ctx.reply(Outcome::CantOpenData).await?;
        return Ok(CommandStatus::Failure("PASV needs an IPv4 control address".into()));
    };

    let ports = ctx.server.config.passive_ports();
    match ctx.session.data_channel_mut().listen_passive(ip, ports).await {
        Ok(addr) => {
            let text = format!("Entering Passive Mode ({}).", format_host_port(addr));
            ctx.reply(Reply::with_text(Outcome::EnteringPassive, text)).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => {
            warn!("PASV for {} failed: {e}", ctx.session.peer_addr());
            ctx.reply(e.outcome()).await?;
            Ok(CommandStatus::Failure(e.to_string()))
        }
    }
}

/// Stream and Compressed are accepted; Block is recognized but refused.
async fn handle_cmd_mode<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    mode: TransferMode,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if mode == TransferMode::Block {
        ctx.reply(Outcome::ModeNotSupported).await?;
        return Ok(CommandStatus::Failure("block mode refused".into()));
    }
    ctx.session.set_mode(mode);
    ctx.reply(Outcome::CommandOk).await?;
    Ok(CommandStatus::Success)
}

async fn handle_cmd_type<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    data_type: DataType,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ctx.session.set_data_type(data_type);
    ctx.reply(Outcome::CommandOk).await?;
    Ok(CommandStatus::Success)
}

async fn handle_cmd_stru<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    stru: FileStructure,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if stru != FileStructure::File {
        ctx.reply(Outcome::ModeNotSupported).await?;
        return Ok(CommandStatus::Failure(format!("structure {stru} refused")));
    }
    ctx.session.set_structure(stru);
    ctx.reply(Outcome::CommandOk).await?;
    Ok(CommandStatus::Success)
}

async fn handle_cmd_retr<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    path: &str,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if ctx.server.config.require_login_for_retr && !ctx.session.is_authenticated() {
        ctx.reply(Outcome::NotLoggedIn).await?;
        return Ok(CommandStatus::Failure("RETR before login".into()));
    }
    run_transfer(ctx, Direction::Retrieve, path).await
}

async fn handle_cmd_stor<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    path: &str,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if !ctx.session.is_authenticated() {
        ctx.reply(Outcome::NeedAccountToStore).await?;
        return Ok(CommandStatus::Failure("STOR before login".into()));
    }
    run_transfer(ctx, Direction::Store, path).await
}

async fn handle_cmd_unknown<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    verb: &str,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ctx.reply(Outcome::SyntaxError).await?;
    Ok(CommandStatus::Failure(format!("unrecognized verb {verb}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    type TestControl = ControlChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    struct Harness {
        session: Session,
        control: TestControl,
        server: ServerContext,
        client: BufReader<DuplexStream>,
        _root: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = ServerConfig {
                server_root: root.path().to_path_buf(),
                ..ServerConfig::default()
            };
            let server = ServerContext::new(config);
            let (client, server_end) = tokio::io::duplex(4096);
            let (r, w) = tokio::io::split(server_end);
            let addr: SocketAddr = "127.0.0.1:2121".parse().unwrap();
            Self {
                session: Session::new(addr, addr),
                control: ControlChannel::new(r, w),
                server,
                client: BufReader::new(client),
                _root: root,
            }
        }

        async fn try_run(
            &mut self,
            line: &str,
        ) -> (Result<CommandStatus, FtpServerError>, String) {
            let command = crate::protocol::parse_command(line).unwrap().unwrap();
            let mut ctx = CommandContext {
                session: &mut self.session,
                control: &mut self.control,
                server: &self.server,
            };
            let result = handle_command(&mut ctx, command).await;
            let mut reply = String::new();
            self.client.read_line(&mut reply).await.unwrap();
            (result, reply)
        }

        async fn run(&mut self, line: &str) -> (CommandStatus, String) {
            let (result, reply) = self.try_run(line).await;
            (result.unwrap(), reply)
        }

        async fn login(&mut self) {
            self.run("USER test").await;
            self.run("PASS test").await;
            assert!(self.session.is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_login_sequence() {
        let mut h = Harness::new();
        assert_eq!(h.run("USER test").await.1, "331 User name okay, need password.\r\n");
        assert_eq!(h.session.username(), Some("test"));
        assert_eq!(h.run("PASS test").await.1, "230 User logged in, proceed.\r\n");
        assert!(h.session.is_authenticated());
        assert_eq!(h.run("USER other").await.1, "230 User logged in, proceed.\r\n");
        assert_eq!(h.run("PASS again").await.1, "230 User logged in, proceed.\r\n");
    }

    #[tokio::test]
    async fn test_password_mismatch_clears_username() {
        let mut h = Harness::new();
        h.run("USER test").await;
        let (status, reply) = h.run("PASS wrong").await;
        assert_eq!(reply, "530 Not logged in.\r\n");
        assert!(matches!(status, CommandStatus::Failure(_)));
        assert!(!h.session.is_authenticated());
        assert_eq!(h.session.username(), None);
    }

    #[tokio::test]
    async fn test_unknown_user_and_pass_without_user() {
        let mut h = Harness::new();
        assert_eq!(h.run("USER ghost").await.1, "332 Need account for login.\r\n");
        assert_eq!(h.session.username(), None);
        assert_eq!(h.run("PASS test").await.1, "503 Bad sequence of commands.\r\n");
    }

    #[tokio::test]
    async fn test_stor_unauthenticated_touches_nothing() {
        let mut h = Harness::new();
        let (_, reply) = h.run("STOR secret.txt").await;
        assert_eq!(reply, "532 Need account for storing files.\r\n");
        assert!(!h.server.storage.root().join("secret.txt").exists());
    }

    #[tokio::test]
    async fn test_stor_without_data_connection() {
        let mut h = Harness::new();
        h.login().await;
        let (status, reply) = h.run("STOR test.txt").await;
        assert_eq!(status, CommandStatus::Success);
        assert_eq!(reply, "150 File status okay; about to open data connection.\r\n");
        assert!(!h.server.storage.root().join("test.txt").exists());
    }

    #[tokio::test]
    async fn test_mode_negotiation() {
        let mut h = Harness::new();
        assert_eq!(h.run("MODE C").await.1, "200 Command okay.\r\n");
        assert_eq!(h.session.mode(), TransferMode::Compressed);
        assert_eq!(
            h.run("MODE B").await.1,
            "504 Command not implemented for that parameter.\r\n"
        );
        assert_eq!(h.session.mode(), TransferMode::Compressed);
        assert_eq!(h.run("MODE S").await.1, "200 Command okay.\r\n");
        assert_eq!(h.session.mode(), TransferMode::Stream);
    }

    #[tokio::test]
    async fn test_type_and_stru() {
        let mut h = Harness::new();
        assert_eq!(h.run("TYPE I").await.1, "200 Command okay.\r\n");
        assert_eq!(h.session.data_type(), DataType::Binary);
        assert_eq!(
            h.run("STRU R").await.1,
            "504 Command not implemented for that parameter.\r\n"
        );
        assert_eq!(h.session.structure(), FileStructure::File);
    }

    #[tokio::test]
    async fn test_port_requires_login() {
        let mut h = Harness::new();
        assert_eq!(h.run("PORT 127,0,0,1,21,80").await.1, "530 Not logged in.\r\n");
        assert!(!h.session.data_channel().is_open());
    }

    #[tokio::test]
    async fn test_port_dial_failure_replies_and_reports() {
        let mut h = Harness::new();
        h.login().await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let SocketAddr::V4(closed) = listener.local_addr().unwrap() else {
            unreachable!()
        };
        drop(listener);

        let (result, reply) = h
            .try_run(&format!("PORT {}", format_host_port(closed)))
            .await;
        assert_eq!(reply, "425 Can't open data connection.\r\n");
        assert!(matches!(result, Err(FtpServerError::Transfer(_))));
        assert!(!h.session.data_channel().is_open());

        // The session still answers afterwards.
        assert_eq!(h.run("NOOP").await.1, "200 Command okay.\r\n");
    }

    #[tokio::test]
    async fn test_pasv_reply_format() {
        let mut h = Harness::new();
        h.server = ServerContext::new(ServerConfig {
            passive_port_min: 40201,
            passive_port_max: 40300,
            server_root: h.server.storage.root().to_path_buf(),
            ..ServerConfig::default()
        });
        h.login().await;
        let (_, reply) = h.run("PASV").await;
        assert!(reply.starts_with("227 Entering Passive Mode (127,0,0,1,"), "{reply}");
        assert!(reply.ends_with(").\r\n"));
        assert!(h.session.data_channel().is_open());
    }

    #[tokio::test]
    async fn test_quit_closes() {
        let mut h = Harness::new();
        let (status, reply) = h.run("QUIT").await;
        assert_eq!(status, CommandStatus::CloseConnection);
        assert_eq!(reply, "221 Service closing control connection.\r\n");
    }

    #[tokio::test]
    async fn test_unknown_verb() {
        let mut h = Harness::new();
        assert_eq!(
            h.run("SITE HELP").await.1,
            "500 Syntax error, command unrecognized.\r\n"
        );
    }
}
