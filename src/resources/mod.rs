//! Resources exposed by the server.

pub mod schema;

pub use schema::SchemaResource;
