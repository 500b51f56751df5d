//! Error types for query-server-mcp.
//!
//! Errors fall into four groups:
//!
//! - [`ConfigError`]: startup failures, reported before the server runs
//! - [`McpError`]: request-level failures, isolated to a single message and
//!   turned into a JSON-RPC error response
//! - [`ToolError`]: a resolved tool failed while executing; never a protocol
//!   error, rendered as `isError: true` content instead
//! - [`TransportError`]: I/O failure on the underlying stream, fatal to the
//!   serve loop

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::mcp::protocol::{ErrorCode, JsonRpcErrorData};

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// The kind of capability a lookup was performed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// A tool.
    Tool,
    /// A resource.
    Resource,
    /// A prompt.
    Prompt,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool => f.write_str("Tool"),
            Self::Resource => f.write_str("Resource"),
            Self::Prompt => f.write_str("Prompt"),
        }
    }
}

/// Request-level failures.
///
/// Each variant maps onto one JSON-RPC error code; the dispatcher attaches
/// the request ID when it builds the error response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    /// The frame was not valid JSON.
    #[error("Parse error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// The frame was JSON but not a valid JSON-RPC 2.0 message.
    #[error("Invalid Request: {message}")]
    InvalidRequest {
        /// Description of what was wrong.
        message: String,
    },

    /// No handler is registered for the method.
    #[error("Method not found: {method}")]
    MethodNotFound {
        /// The requested method.
        method: String,
    },

    /// A named tool, resource or prompt is not in its chain.
    #[error("{kind} not found: {identifier}")]
    NotFound {
        /// Which chain was searched.
        kind: CapabilityKind,
        /// The name or URI that did not resolve.
        identifier: String,
    },

    /// The method's params could not be decoded.
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// Description of the problem.
        message: String,
    },

    /// Anything else that went wrong while producing a response.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl McpError {
    /// Creates an invalid params error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the JSON-RPC error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Decode { .. } => ErrorCode::ParseError,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            Self::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            Self::NotFound { .. } | Self::InvalidParams { .. } => ErrorCode::InvalidParams,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<McpError> for JsonRpcErrorData {
    fn from(err: McpError) -> Self {
        Self::with_message(err.code(), err.to_string())
    }
}

/// Failures raised by a tool while executing a resolved call.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The call's arguments did not match what the tool expects.
    #[error("{0}")]
    InvalidArguments(String),

    /// The tool ran and failed.
    #[error("{0}")]
    Execution(String),

    /// The tool did not finish within the configured limit.
    #[error("Tool '{tool}' timed out after {limit:?}")]
    Timeout {
        /// Tool name.
        tool: String,
        /// The limit that was exceeded.
        limit: Duration,
    },

    /// The tool panicked.
    #[error("Tool '{tool}' failed unexpectedly: {message}")]
    Panicked {
        /// Tool name.
        tool: String,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl From<QueryError> for ToolError {
    fn from(err: QueryError) -> Self {
        Self::Execution(err.to_string())
    }
}

/// Failures of a database query.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The SQL would modify the database.
    #[error("Only read-only statements are allowed")]
    NotReadOnly,

    /// More than one statement was supplied.
    #[error("Only a single statement is allowed")]
    MultipleStatements,

    /// The statement does not start with an allowed keyword.
    #[error("Statement type not allowed; supported statements: {allowed}")]
    StatementNotAllowed {
        /// The allowed leading keywords.
        allowed: &'static str,
    },

    /// The driver reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Fatal failures of the underlying stream.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Reading or writing the stream failed.
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// An outgoing frame could not be serialised.
    #[error("failed to encode outgoing frame: {0}")]
    Encode(#[from] serde_json::Error),
}
