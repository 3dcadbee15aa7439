//! FTP Transfer modes
//!
//! Mode, type and structure parameters negotiated with `MODE`, `TYPE` and
//! `STRU`, and the on-wire framing each transfer mode uses on the data
//! connection.

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

/// Transmission mode (`MODE S|B|C`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Raw bytes; end-of-file is the data connection closing.
    #[default]
    Stream,
    /// Blocks preceded by a descriptor byte and a 16-bit count.
    Block,
    /// Runs of literal, replicated and filler bytes.
    Compressed,
}

impl TransferMode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "S" => Some(TransferMode::Stream),
            "B" => Some(TransferMode::Block),
            "C" => Some(TransferMode::Compressed),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            TransferMode::Stream => 'S',
            TransferMode::Block => 'B',
            TransferMode::Compressed => 'C',
        }
    }

    /// Framing for a transfer in this mode.
    pub fn framing(self, data_type: DataType, buffer_size: usize) -> Framing {
        Framing::new(self, data_type, buffer_size)
    }
}

/// Representation type (`TYPE A|I`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    #[default]
    Ascii,
    Binary,
}

impl DataType {
    pub fn code(self) -> char {
        match self {
            DataType::Ascii => 'A',
            DataType::Binary => 'I',
        }
    }

    /// Byte used for filler runs in compressed mode.
    fn filler(self) -> u8 {
        match self {
            DataType::Ascii => b' ',
            DataType::Binary => 0,
        }
    }
}

/// File structure (`STRU F|R|P`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileStructure {
    #[default]
    File,
    Record,
    Page,
}

impl FileStructure {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "F" => Some(FileStructure::File),
            "R" => Some(FileStructure::Record),
            "P" => Some(FileStructure::Page),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            FileStructure::File => 'F',
            FileStructure::Record => 'R',
            FileStructure::Page => 'P',
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl fmt::Display for FileStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// Block descriptor bits
const DESC_EOF: u8 = 64;
const DESC_RESTART_MARKER: u8 = 16;
const MAX_BLOCK: usize = u16::MAX as usize;

// Compressed mode headers
const ESCAPE: u8 = 0x00;
const MAX_LITERAL: usize = 127;
const MAX_RUN: usize = 63;
const REPLICATE: u8 = 0x80;
const FILLER: u8 = 0xC0;

/// Encodes or decodes the payload of one transfer according to the negotiated
/// mode. Both directions return the number of payload (file) bytes moved.
#[derive(Debug, Clone, Copy)]
pub struct Framing {
    mode: TransferMode,
    data_type: DataType,
    buffer_size: usize,
}

impl Framing {
    pub fn new(mode: TransferMode, data_type: DataType, buffer_size: usize) -> Self {
        Self {
            mode,
            data_type,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Reads `src` (a file) to the end and writes it framed to `dst` (the data
    /// connection).
    pub async fn send<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let total = match self.mode {
            TransferMode::Stream => self.send_stream(src, dst).await?,
            TransferMode::Block => self.send_block(src, dst).await?,
            TransferMode::Compressed => self.send_compressed(src, dst).await?,
        };
        dst.flush().await?;
        Ok(total)
    }

    /// Reads framed data from `src` (the data connection) until its end marker
    /// and writes the payload to `dst` (a file).
    pub async fn receive<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut dst = BufWriter::with_capacity(self.buffer_size, dst);
        let total = match self.mode {
            TransferMode::Stream => self.receive_stream(src, &mut dst).await?,
            TransferMode::Block => self.receive_block(src, &mut dst).await?,
            TransferMode::Compressed => self.receive_compressed(src, &mut dst).await?,
        };
        dst.flush().await?;
        Ok(total)
    }

    async fn send_stream<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0; self.buffer_size];
        let mut total = 0u64;
        loop {
            let n = src.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            dst.write_all(&buffer[..n]).await?;
            total += n as u64;
        }
        Ok(total)
    }

    async fn receive_stream<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // Same loop, the peer closing the connection is the end of file.
        self.send_stream(src, dst).await
    }

    async fn send_block<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0; self.buffer_size.min(MAX_BLOCK)];
        let mut total = 0u64;
        loop {
            let n = src.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            let count = (n as u16).to_be_bytes();
            dst.write_all(&[0, count[0], count[1]]).await?;
            dst.write_all(&buffer[..n]).await?;
            total += n as u64;
        }
        dst.write_all(&[DESC_EOF, 0, 0]).await?;
        Ok(total)
    }

    async fn receive_block<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut header = [0u8; 3];
        let mut buffer = vec![0; MAX_BLOCK];
        let mut total = 0u64;
        loop {
            src.read_exact(&mut header).await?;
            let descriptor = header[0];
            let count = u16::from_be_bytes([header[1], header[2]]) as usize;
            src.read_exact(&mut buffer[..count]).await?;
            if descriptor & DESC_RESTART_MARKER == 0 {
                dst.write_all(&buffer[..count]).await?;
                total += count as u64;
            }
            if descriptor & DESC_EOF != 0 {
                break;
            }
        }
        Ok(total)
    }

    async fn send_compressed<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buffer = vec![0; self.buffer_size];
        let mut encoded = Vec::with_capacity(self.buffer_size + self.buffer_size / MAX_LITERAL + 2);
        let mut total = 0u64;
        loop {
            let n = src.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            encoded.clear();
            compress_chunk(&buffer[..n], self.data_type.filler(), &mut encoded);
            dst.write_all(&encoded).await?;
            total += n as u64;
        }
        dst.write_all(&[ESCAPE, DESC_EOF]).await?;
        Ok(total)
    }

    async fn receive_compressed<R, W>(&self, src: &mut R, dst: &mut W) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut src = BufReader::with_capacity(self.buffer_size, src);
        let mut literal = [0u8; MAX_LITERAL];
        let mut total = 0u64;
        loop {
            let header = src.read_u8().await?;
            if header == ESCAPE {
                let descriptor = src.read_u8().await?;
                if descriptor & DESC_EOF != 0 {
                    break;
                }
                continue;
            }
            match header & FILLER {
                FILLER => {
                    let n = (header & 0x3F) as usize;
                    dst.write_all(&vec![self.data_type.filler(); n]).await?;
                    total += n as u64;
                }
                REPLICATE => {
                    let n = (header & 0x3F) as usize;
                    let byte = src.read_u8().await?;
                    dst.write_all(&vec![byte; n]).await?;
                    total += n as u64;
                }
                _ => {
                    let n = header as usize;
                    src.read_exact(&mut literal[..n]).await?;
                    dst.write_all(&literal[..n]).await?;
                    total += n as u64;
                }
            }
        }
        Ok(total)
    }
}

/// Compressed-mode encoding of one chunk. Runs of the filler byte become
/// filler headers, runs of three or more of any other byte become replication
/// headers, everything else goes out as literal runs of at most 127 bytes.
fn compress_chunk(data: &[u8], filler: u8, out: &mut Vec<u8>) {
    let mut literal_start = 0;
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1;
        while i + run < data.len() && data[i + run] == byte && run < MAX_RUN {
            run += 1;
        }

        let encode_run = (byte == filler && run >= 2) || run >= 3;
        if encode_run {
            flush_literal(&data[literal_start..i], out);
            if byte == filler {
                out.push(FILLER | run as u8);
            } else {
                out.push(REPLICATE | run as u8);
                out.push(byte);
            }
            i += run;
            literal_start = i;
        } else {
            i += 1;
        }
    }
    flush_literal(&data[literal_start..], out);
}

fn flush_literal(mut literal: &[u8], out: &mut Vec<u8>) {
    while !literal.is_empty() {
        let n = literal.len().min(MAX_LITERAL);
        out.push(n as u8);
        out.extend_from_slice(&literal[..n]);
        literal = &literal[n..];
    }
}
