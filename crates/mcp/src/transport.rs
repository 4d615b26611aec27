//! MCP transport layer.
//!
//! `McpTransport` moves one JSON-RPC message per call. `LineTransport`
//! frames messages as newline-delimited text over any async byte stream;
//! `StdioTransport` is that framing over the process's stdin and stdout.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::error::McpError;

/// Trait for MCP message transport.
///
/// `receive` must be cancel safe: the server polls it inside `select!`
/// alongside in-flight tool calls, and a dropped `receive` future must not
/// lose a partially read message.
///
/// A line that cannot be decoded is reported as `McpError::Utf8`; the
/// transport stays usable and the next call continues with the next line.
/// Any other error means the transport is broken.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Read the next JSON-RPC message line from the transport.
    /// Returns `None` when the transport is closed.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write a JSON-RPC message line to the transport.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;
}

/// Newline-delimited messages over an async reader/writer pair.
///
/// Bytes are collected into `pending` until a `\n` arrives, so a `receive`
/// dropped mid-line resumes where it stopped. Blank lines are skipped. A
/// final line without a trailing newline is still delivered at EOF.
pub struct LineTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
    pending: Vec<u8>,
}

/// The transport the server binary runs on.
pub type StdioTransport = LineTransport<Stdin, Stdout>;

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            pending: Vec::new(),
        }
    }

    /// Everything written so far.
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl LineTransport<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for LineTransport<Stdin, Stdout> {
    fn default() -> Self {
        Self::stdio()
    }
}

#[async_trait]
impl<R, W> McpTransport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.pending).await?;
            if read == 0 && self.pending.is_empty() {
                return Ok(None);
            }

            let line = String::from_utf8(std::mem::take(&mut self.pending))?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.writer.write_all(message.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// In-memory transport for testing, backed by channel pairs.
pub struct ChannelTransport {
    rx: tokio::sync::mpsc::Receiver<String>,
    tx: tokio::sync::mpsc::Sender<String>,
}

impl ChannelTransport {
    /// Create a pair of connected transports for testing.
    ///
    /// Messages sent on one transport are received by the other.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = tokio::sync::mpsc::channel(32);
        let (tx_b, rx_a) = tokio::sync::mpsc::channel(32);
        (
            Self { rx: rx_a, tx: tx_a },
            Self { rx: rx_b, tx: tx_b },
        )
    }
}

#[async_trait]
impl McpTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        self.tx
            .send(message.to_string())
            .await
            .map_err(|e| McpError::Transport(std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)))?;
        Ok(())
    }
}
