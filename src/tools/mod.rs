//! Tools exposed by the server.

pub mod execute_sql;

pub use execute_sql::ExecuteSqlTool;
