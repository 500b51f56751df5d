//! query-server-mcp: an MCP server that answers read-only SQL queries
//!
//! The crate is split into a protocol core and the capabilities it serves.
//!
//! # Architecture
//!
//! The protocol core knows nothing about databases. It speaks JSON-RPC 2.0
//! over newline-delimited stdio and routes MCP methods to three capability
//! chains:
//!
//! - **Tools**: `execute_sql`, a guarded read-only query runner
//! - **Resources**: `sqlite://schema`, the database's `sqlite_master`
//! - **Prompts**: none by default; the chain is wired and served empty
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`database`]: Read-only SQLite access shared by tools and resources
//! - [`error`]: Error types
//! - [`logging`]: Component-scoped log sinks on top of `tracing`
//! - [`mcp`]: MCP protocol implementation
//! - [`resources`]: Resources backed by the database
//! - [`tools`]: Tools backed by the database

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod resources;
pub mod tools;
