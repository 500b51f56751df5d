//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements the protocol core: message model, capability
//! chains, per-method handlers, the JSON-RPC dispatcher, the stdio transport
//! and the serve loop that binds them. The server communicates over stdio
//! using newline-delimited JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            McpServer                             │
//! │                                                                  │
//! │   ┌─────────────┐    ┌──────────────┐    ┌──────────────────┐    │
//! │   │  Transport  │───▶│  Dispatcher  │───▶│     Handlers     │    │
//! │   │   (stdio)   │◀───│  (routing)   │◀───│ (one per method) │    │
//! │   └─────────────┘    └──────────────┘    └──────────────────┘    │
//! │          │                  │                     │              │
//! │          ▼                  ▼                     ▼              │
//! │   ┌───────────────────────────┐    ┌──────────────────────────┐  │
//! │   │   JSON-RPC Messages       │    │ Tool / Resource / Prompt │  │
//! │   │   (protocol)              │    │ chains (capability)      │  │
//! │   └───────────────────────────┘    └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation negotiates MCP protocol version 2024-11-05 unless
//! configured otherwise.

pub mod capability;
pub mod dispatcher;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod transport;

pub use capability::{
    Chain, Identifiable, Prompt, PromptChain, Resource, ResourceChain, Tool, ToolCall,
    ToolCallResult, ToolChain, ToolMetadata,
};
pub use dispatcher::JsonRpcDispatcher;
pub use handlers::{Capabilities, InitializeHandler, ServerInfo};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::McpServer;
pub use transport::{StdioTransport, Transport};
