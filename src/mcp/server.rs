//! MCP server: binds a dispatcher to a transport and runs the serve loop.
//!
//! The loop is strictly sequential: read a frame, dispatch it, write the
//! response (if any), repeat. Reading is the only point where the loop waits
//! on the client, so a shutdown request is honoured there and never in the
//! middle of a write.
//!
//! The loop ends cleanly when the input reaches end-of-stream or a shutdown
//! signal arrives, and with an error on any transport fault. A bad message
//! never ends the loop.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::mcp::dispatcher::JsonRpcDispatcher;
use crate::mcp::transport::{StdioTransport, Transport};

/// Server state in the serve loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not connected to a transport yet.
    Idle,
    /// Serving frames.
    Serving,
    /// The serve loop has ended.
    Stopped,
}

/// The MCP server.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Routes frames to handlers.
    dispatcher: JsonRpcDispatcher,
}

impl McpServer {
    /// Creates a new MCP server around a dispatcher.
    #[must_use]
    pub const fn new(dispatcher: JsonRpcDispatcher) -> Self {
        Self {
            state: ServerState::Idle,
            dispatcher,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &JsonRpcDispatcher {
        &self.dispatcher
    }

    /// Serves stdio until stdin closes or SIGINT/SIGTERM (Ctrl+C on Windows).
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        let mut transport = StdioTransport::stdio();

        let shutdown = async {
            match shutdown_signal().await {
                Ok(name) => info!(signal = name, "Received signal, initiating graceful shutdown"),
                Err(e) => {
                    warn!(error = %e, "Could not install signal handlers; relying on EOF");
                    std::future::pending::<()>().await;
                }
            }
        };

        self.connect_until(&mut transport, shutdown).await
    }

    /// Serves `transport` until its input reaches end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn connect<R, W>(
        &mut self,
        transport: &mut Transport<R, W>,
    ) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.connect_until(transport, std::future::pending()).await
    }

    /// Serves `transport` until end-of-stream or until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn connect_until<R, W, F>(
        &mut self,
        transport: &mut Transport<R, W>,
        shutdown: F,
    ) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.state = ServerState::Serving;

        let result = loop {
            let frame = tokio::select! {
                () = &mut shutdown => break Ok(()),
                frame = transport.read_frame() => frame,
            };

            match frame {
                Ok(Some(raw)) => {
                    if let Err(e) = self.serve_frame(transport, &raw).await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    info!("Input closed, shutting down");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.state = ServerState::Stopped;
        result
    }

    /// Dispatches one frame and writes the response, if there is one.
    async fn serve_frame<R, W>(
        &self,
        transport: &mut Transport<R, W>,
        raw: &[u8],
    ) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match self.dispatcher.dispatch_frame(raw).await {
            Some(response) => transport.write_frame(&response).await,
            None => {
                debug!("No response for frame");
                Ok(())
            }
        }
    }
}

/// Waits for a shutdown signal and returns its name.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

/// Waits for a shutdown signal and returns its name.
#[cfg(windows)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityKind;
    use crate::mcp::capability::{PromptChain, ResourceChain, ToolChain};
    use crate::mcp::handlers::{Capabilities, InitializeHandler, DEFAULT_TOOL_TIMEOUT};
    use std::sync::Arc;

    fn server() -> McpServer {
        let capabilities = Capabilities {
            prompts: Arc::new(PromptChain::empty(CapabilityKind::Prompt)),
            resources: Arc::new(ResourceChain::empty(CapabilityKind::Resource)),
            tools: Arc::new(ToolChain::empty(CapabilityKind::Tool)),
        };
        McpServer::new(JsonRpcDispatcher::build(
            InitializeHandler::default(),
            &capabilities,
            DEFAULT_TOOL_TIMEOUT,
        ))
    }

    #[test]
    fn server_initial_state() {
        assert_eq!(server().state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn stops_cleanly_on_eof() {
        let mut server = server();
        let mut transport = Transport::new(&b""[..], Vec::new());

        server.connect(&mut transport).await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(transport.into_inner().1.is_empty());
    }

    #[tokio::test]
    async fn stops_on_shutdown_future() {
        let mut server = server();
        // A reader that never yields a line
        let (_client, server_side) = tokio::io::duplex(64);
        let mut transport = Transport::new(tokio::io::BufReader::new(server_side), Vec::new());

        server
            .connect_until(&mut transport, async {})
            .await
            .unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let mut server = server();
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            .build();
        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut transport = Transport::new(input, writer);

        let err = server.connect(&mut transport).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
