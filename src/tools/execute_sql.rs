//! The `execute_sql` tool: read-only queries against a SQLite database.
//!
//! A query passes three gates before it runs:
//!
//! 1. it starts with an allowed keyword (leading comments are skipped)
//! 2. it is a single statement
//! 3. SQLite reports the compiled statement as read-only
//!
//! The connection itself is opened read-only, so the gates mostly produce
//! better error messages than the driver would.

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use regex::Regex;
use rusqlite::{Connection, InterruptHandle};
use serde_json::json;

use crate::database::{self, Rows};
use crate::error::{QueryError, ToolError};
use crate::log_context;
use crate::logging::{LogContext, LogSink};
use crate::mcp::capability::{
    Identifiable, Tool, ToolAnnotations, ToolCall, ToolCallResult, ToolMetadata,
};

/// Default cap on returned rows.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Leading keywords accepted by the guard, as shown in error messages.
const ALLOWED_STATEMENTS: &str = "SELECT, WITH, EXPLAIN, PRAGMA, VALUES";

fn allowed_keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:SELECT|WITH|EXPLAIN|PRAGMA|VALUES)\b")
            .expect("Invalid statement keyword regex")
    })
}

/// Runs read-only SQL and returns the rows as a JSON array.
pub struct ExecuteSqlTool {
    connection: Mutex<Connection>,
    interrupt: InterruptHandle,
    version: String,
    max_rows: usize,
    sink: Option<LogSink>,
}

impl ExecuteSqlTool {
    /// Tool name.
    pub const NAME: &'static str = "execute_sql";

    /// Tool title, also used as the title annotation.
    pub const TITLE: &'static str = "SQL MCP Server to execute SQL queries.";

    /// Opens `path` read-only and wraps it in a tool.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(
        path: &Path,
        version: impl Into<String>,
        max_rows: usize,
    ) -> rusqlite::Result<Self> {
        let connection = database::open_read_only(path)?;
        Ok(Self::from_connection(connection, version, max_rows))
    }

    /// Wraps an already open connection.
    #[must_use]
    pub fn from_connection(
        connection: Connection,
        version: impl Into<String>,
        max_rows: usize,
    ) -> Self {
        Self {
            interrupt: connection.get_interrupt_handle(),
            connection: Mutex::new(connection),
            version: version.into(),
            max_rows,
            sink: None,
        }
    }

    fn run(&self, sql: &str) -> Result<Rows, QueryError> {
        check_statement(sql)?;

        // A poisoned lock only means an earlier call panicked mid-query;
        // the connection itself is still usable.
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        database::fetch_rows(&conn, sql, self.max_rows)
    }

    fn log_info(&self, template: &str, context: &LogContext) {
        if let Some(sink) = &self.sink {
            sink.info(template, context);
        }
    }
}

impl Identifiable for ExecuteSqlTool {
    fn identifier(&self) -> &str {
        Self::NAME
    }

    fn bind_log_sink(&mut self, sink: LogSink) {
        self.sink = Some(sink);
    }
}

impl Tool for ExecuteSqlTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: Self::NAME.to_string(),
            title: Some(Self::TITLE.to_string()),
            description: Some(format!(
                "SQL MCP Server v{}. Run SQL queries against the SQLite database. \
                 Currently only READ only mode is available, SELECT and PRAGMA/EXPLAIN \
                 statements are supported.",
                self.version
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The SQL query to execute."
                    }
                },
                "required": ["sql"]
            }),
            output_schema: None,
            annotations: Some(ToolAnnotations {
                title: Some(Self::TITLE.to_string()),
                read_only_hint: Some(true),
                idempotent_hint: Some(true),
                destructive_hint: Some(false),
                open_world_hint: Some(false),
            }),
        }
    }

    fn call(&self, call: &ToolCall) -> Result<ToolCallResult, ToolError> {
        let sql = call
            .str_arg("sql")
            .ok_or_else(|| ToolError::InvalidArguments("Missing required argument: sql".into()))?;

        self.log_info("Executing SQL: {sql}", &log_context!("sql" => sql));
        let rows = self.run(sql)?;
        self.log_info(
            "SQL executed. Results count: {count}",
            &log_context!("count" => rows.rows.len()),
        );

        if rows.truncated {
            if let Some(sink) = &self.sink {
                sink.warn(
                    "Result truncated to {limit} rows",
                    &log_context!("limit" => self.max_rows),
                );
            }
        }

        let content = serde_json::to_string(&rows.rows)
            .map_err(|e| ToolError::Execution(format!("Failed to encode rows: {e}")))?;
        Ok(ToolCallResult::text(content).with_mime_type("application/json"))
    }

    /// Interrupts the running query, which then fails and releases the
    /// connection. Does nothing if no query is running.
    fn cancel(&self) {
        if let Some(sink) = &self.sink {
            sink.warn("Interrupting running query", &LogContext::new());
        }
        self.interrupt.interrupt();
    }
}

/// Checks that `sql` is a single statement starting with an allowed keyword.
fn check_statement(sql: &str) -> Result<(), QueryError> {
    if !allowed_keyword_regex().is_match(skip_leading_trivia(sql)) {
        return Err(QueryError::StatementNotAllowed {
            allowed: ALLOWED_STATEMENTS,
        });
    }
    if !is_single_statement(sql) {
        return Err(QueryError::MultipleStatements);
    }
    Ok(())
}

/// Skips leading whitespace and comments.
fn skip_leading_trivia(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after).trim_start();
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after).trim_start();
        } else {
            return rest;
        }
    }
}

/// Returns `false` if anything other than whitespace, comments or further
/// semicolons follows the first top-level `;`.
///
/// Quoted strings and identifiers are skipped so a `;` inside them does not
/// count. SQL escapes quotes by doubling them, which this handles for free:
/// `'it''s'` scans as two adjacent literals.
fn is_single_statement(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut terminated = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_past(bytes, i + 2, b"\n");
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_past(bytes, i + 2, b"*/");
                continue;
            }
            b';' => terminated = true,
            b if b.is_ascii_whitespace() => {}
            _ if terminated => return false,
            quote @ (b'\'' | b'"' | b'`') => {
                i = skip_past(bytes, i + 1, &[quote]);
                continue;
            }
            b'[' => {
                i = skip_past(bytes, i + 1, b"]");
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    true
}

/// Returns the index just past the next `needle` at or after `from`, or the
/// end of input if there is none.
fn skip_past(bytes: &[u8], from: usize, needle: &[u8]) -> usize {
    let from = from.min(bytes.len());
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map_or(bytes.len(), |pos| from + pos + needle.len())
}
