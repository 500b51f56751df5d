//! stdio transport for MCP server.
//!
//! This module implements the stdio transport as specified by MCP:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The transport is pure line plumbing: it hands raw frame bytes up and
//! writes serialised frames down, without looking inside either. It is
//! generic over the streams so the serve loop can be driven from memory in
//! tests; [`StdioTransport`] is the process stdio instance.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::TransportError;

/// A newline-delimited JSON transport over an input and output stream.
pub struct Transport<R, W> {
    /// Buffered input stream.
    reader: R,
    /// Output stream.
    writer: W,
}

/// The transport bound to the process's stdin and stdout.
pub type StdioTransport = Transport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next frame, without its line terminator.
    ///
    /// Suspends until a full line is available. Returns `None` once the
    /// input is closed (EOF). A final line without a trailing newline is
    /// still returned as a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the input fails.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut frame = Vec::new();
        let bytes_read = self.reader.read_until(b'\n', &mut frame).await?;

        if bytes_read == 0 {
            // EOF - input closed
            return Ok(None);
        }

        // Remove the trailing newline
        if frame.last() == Some(&b'\n') {
            frame.pop();
            if frame.last() == Some(&b'\r') {
                frame.pop();
            }
        }

        Ok(Some(frame))
    }

    /// Serialises `message` and writes it as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_frame<T: Serialize>(
        &mut self,
        message: &T,
    ) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    async fn write_raw(&mut self, json: &str) -> Result<(), TransportError> {
        // MCP stdio framing: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// Consumes the transport and returns the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}
