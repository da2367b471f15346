//! Storage backends.
//!
//! The authoritative store ([`DocumentStore`]) holds documents, sections,
//! claims, vectors, and supersessions in SQLite. The entity graph lives in
//! its own database behind the [`crate::graph::GraphStore`] trait.

mod connection;
mod sql;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use sql::{escape_like_wildcards, glob_to_like_pattern};
pub use store::DocumentStore;
