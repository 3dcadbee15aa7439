//! Module `connection`
//!
//! Serves one control connection: greets the client, then reads, parses and
//! dispatches one line at a time until QUIT or end of stream.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::FtpServerError;
use crate::protocol::{
    CommandContext, CommandStatus, ControlChannel, ControlLine, Outcome, handle_command,
    parse_command,
};
use crate::server::{ServerContext, Session};

/// Handles an accepted TCP control connection until it ends.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, server: Arc<ServerContext>) {
    let local = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to read local address for {peer}: {e}");
            return;
        }
    };
    let mut session = Session::new(peer, local);
    let mut control = ControlChannel::from_tcp(stream);

    if let Err(e) = serve(&mut session, &mut control, &server).await {
        error!("Control connection with {peer} failed: {e}");
    }

    session.data_channel_mut().close();
    info!("Client {peer} disconnected");
}

/// The command loop over any control transport.
pub async fn serve<R, W>(
    session: &mut Session,
    control: &mut ControlChannel<R, W>,
    server: &ServerContext,
) -> Result<(), FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let peer = session.peer_addr();
    control.write_reply(&Outcome::Ready.into()).await?;

    let limit = server.config.max_command_length;
    while let Some(incoming) = control.read_line(limit).await? {
        let line = match incoming {
            ControlLine::Line(line) => line,
            ControlLine::TooLong => {
                warn!("Command from {peer} exceeds {limit} bytes");
                control.write_reply(&Outcome::CommandTooLong.into()).await?;
                continue;
            }
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!("Skipping noise from {peer}: {line:?}");
                continue;
            }
            Err(e) => {
                warn!("Malformed command from {peer}: {e}");
                control.write_reply(&e.reply()).await?;
                continue;
            }
        };
        info!("Received from {peer}: {}", command.redacted());

        let mut ctx = CommandContext {
            session: &mut *session,
            control: &mut *control,
            server,
        };
        match handle_command(&mut ctx, command).await {
            Ok(CommandStatus::CloseConnection) => {
                info!("Client {peer} requested to quit");
                return Ok(());
            }
            Ok(CommandStatus::Success) => {}
            Ok(CommandStatus::Failure(reason)) => debug!("Command from {peer} refused: {reason}"),
            Err(FtpServerError::Io(e)) => return Err(FtpServerError::Io(e)),
            Err(e) => error!("Command from {peer} failed: {e}"),
        }
    }

    info!("Connection closed by client {peer}");
    Ok(())
}
