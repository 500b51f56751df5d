//! The `sqlite://schema` resource: the database's table and index definitions.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::database;
use crate::error::McpError;
use crate::mcp::capability::{Identifiable, Resource, ResourceContents, ResourceMetadata};

const SCHEMA_QUERY: &str = "SELECT type, name, sql FROM sqlite_master ORDER BY type, name";

/// Lists `sqlite_master` entries as a JSON array of `{type, name, sql}`.
pub struct SchemaResource {
    connection: Mutex<Connection>,
}

impl SchemaResource {
    /// Resource URI.
    pub const URI: &'static str = "sqlite://schema";

    /// Opens `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        database::open_read_only(path).map(Self::from_connection)
    }

    /// Wraps an already open connection.
    #[must_use]
    pub const fn from_connection(connection: Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }
}

impl Identifiable for SchemaResource {
    fn identifier(&self) -> &str {
        Self::URI
    }
}

impl Resource for SchemaResource {
    fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            uri: Self::URI.to_string(),
            name: "schema".to_string(),
            description: Some("Tables, views, indexes and triggers in the database".to_string()),
            mime_type: Some("application/json".to_string()),
        }
    }

    fn read(&self) -> Result<ResourceContents, McpError> {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let rows = database::fetch_rows(&conn, SCHEMA_QUERY, usize::MAX)
            .map_err(|e| McpError::internal(format!("Failed to read schema: {e}")))?;
        let text = serde_json::to_string(&rows.rows)
            .map_err(|e| McpError::internal(format!("Failed to encode schema: {e}")))?;

        Ok(ResourceContents {
            uri: Self::URI.to_string(),
            mime_type: Some("application/json".to_string()),
            text,
        })
    }
}
