//! Transfer operations
//!
//! Sequencing shared by `RETR` and `STOR`: the preliminary reply, taking the
//! session's data connection, the framed copy and the completion reply.

use std::fmt;

use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::FtpServerError;
use crate::protocol::{CommandContext, CommandStatus, Outcome};

/// Which way the payload flows, from the server's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `RETR`: file to data connection.
    Retrieve,
    /// `STOR`: data connection to file.
    Store,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Retrieve => write!(f, "RETR"),
            Direction::Store => write!(f, "STOR"),
        }
    }
}

/// Runs one transfer over the session's data connection.
///
/// Without a data connection this only replies 150 and touches nothing. A
/// connection that reaches the copy is always consumed, whatever the outcome.
pub async fn run_transfer<R, W>(
    ctx: &mut CommandContext<'_, R, W>,
    direction: Direction,
    path: &str,
) -> Result<CommandStatus, FtpServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let peer = ctx.session.peer_addr();
    if !ctx.session.data_channel().is_open() {
        info!("{direction} {path} from {peer}: no data connection yet");
        ctx.reply(Outcome::AboutToOpen).await?;
        return Ok(CommandStatus::Success);
    }

    let timeout = ctx.server.config.data_connection_timeout();
    let mut stream = match ctx
        .session
        .data_channel_mut()
        .take_stream(peer.ip(), timeout)
        .await
    {
        Ok(Some(stream)) => stream,
        Ok(None) => {
            ctx.reply(Outcome::AboutToOpen).await?;
            return Ok(CommandStatus::Success);
        }
        Err(e) => {
            warn!("{direction} {path} from {peer}: {e}");
            ctx.reply(e.outcome()).await?;
            return Ok(CommandStatus::Failure(e.to_string()));
        }
    };

    let storage = &ctx.server.storage;
    let file = match direction {
        Direction::Retrieve => storage.open_read(path).await,
        Direction::Store => storage.create_write(path).await,
    };
    let mut file = match file {
        Ok(file) => file,
        Err(e) => {
            // Dropping the stream closes the data connection.
            warn!("{direction} {path} from {peer}: {e}");
            drop(stream);
            ctx.reply(Outcome::FileUnavailable).await?;
            return Ok(CommandStatus::Failure(e.to_string()));
        }
    };

    ctx.reply(Outcome::AlreadyOpen).await?;

    let framing = ctx
        .session
        .mode()
        .framing(ctx.session.data_type(), ctx.server.config.buffer_size);
    let copied = match direction {
        Direction::Retrieve => match framing.send(&mut file, &mut stream).await {
            Ok(n) => stream.shutdown().await.map(|_| n),
            Err(e) => Err(e),
        },
        Direction::Store => framing.receive(&mut stream, &mut file).await,
    };

    match copied {
        Ok(bytes) => {
            info!(
                "{direction} {path} for {peer} complete: {bytes} bytes ({} mode)",
                framing.mode()
            );
            ctx.reply(Outcome::TransferComplete).await?;
            Ok(CommandStatus::Success)
        }
        Err(e) => {
            error!("{direction} {path} for {peer} aborted: {e}");
            ctx.reply(Outcome::TransferAborted).await?;
            Ok(CommandStatus::Failure(e.to_string()))
        }
    }
}
