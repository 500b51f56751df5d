//! SQLite access shared by the `execute_sql` tool and the schema resource.
//!
//! Connections are opened read-only. Rows come back as JSON objects keyed by
//! column name so they can be handed to the client as-is.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Map, Number, Value};

use crate::error::QueryError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// Rows fetched by [`fetch_rows`].
#[derive(Debug, Default)]
pub struct Rows {
    /// The rows, at most the requested limit.
    pub rows: Vec<Row>,
    /// `true` if more rows were available than were returned.
    pub truncated: bool,
}

/// Opens a database file read-only.
///
/// # Errors
///
/// Returns an error if the file does not exist or is not a database.
pub fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// Runs a single read-only query and collects up to `max_rows` rows.
///
/// # Errors
///
/// Returns an error if the SQL does not compile, is not read-only, or fails
/// while stepping.
pub fn fetch_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<Rows, QueryError> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(QueryError::NotReadOnly);
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut result = Rows::default();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if result.rows.len() >= max_rows {
            result.truncated = true;
            break;
        }

        let mut object = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            object.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        result.rows.push(object);
    }

    Ok(result)
}

/// Converts one SQLite value to JSON.
///
/// BLOBs become base64 strings; non-finite reals become `null`.
#[must_use]
pub fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(BASE64_STANDARD.encode(bytes)),
    }
}
