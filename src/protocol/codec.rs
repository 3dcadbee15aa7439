//! Control channel codec
//!
//! Line-oriented I/O for the control connection. Every outgoing line is
//! terminated with CRLF here, callers never append it themselves.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::protocol::{Command, Reply};

/// One line read from the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlLine {
    Line(String),
    /// The line exceeded the limit. Its remainder is skipped by the next read.
    TooLong,
}

/// Buffered reader plus writer over the two halves of a control connection.
#[derive(Debug)]
pub struct ControlChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    skipping: bool,
}

impl ControlChannel<OwnedReadHalf, OwnedWriteHalf> {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self::new(read_half, write_half)
    }
}

impl<R, W> ControlChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            skipping: false,
        }
    }

    /// Reads one line without its terminator, buffering at most `limit`
    /// bytes of it. `Ok(None)` means the peer closed the connection. Invalid
    /// UTF-8 is replaced rather than rejected.
    pub async fn read_line(&mut self, limit: usize) -> std::io::Result<Option<ControlLine>> {
        if self.skipping {
            self.skip_rest_of_line().await?;
            self.skipping = false;
        }

        // Room for the CRLF terminator on a line of exactly `limit` bytes.
        let cap = (limit as u64).saturating_add(2);
        let mut buf = Vec::new();
        let n = (&mut self.reader).take(cap).read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() != Some(&b'\n') && n as u64 == cap {
            self.skipping = true;
            return Ok(Some(ControlLine::TooLong));
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if buf.len() > limit {
            return Ok(Some(ControlLine::TooLong));
        }
        Ok(Some(ControlLine::Line(String::from_utf8_lossy(&buf).into_owned())))
    }

    /// Discards input up to and including the next newline, without buffering.
    async fn skip_rest_of_line(&mut self) -> std::io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    pub async fn write_reply(&mut self, reply: &Reply) -> std::io::Result<()> {
        self.write_line(&reply.to_string()).await
    }

    pub async fn write_command(&mut self, command: &Command) -> std::io::Result<()> {
        self.write_line(&command.to_string()).await
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await
    }
}
