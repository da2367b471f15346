//! Observability: structured logging setup.
//!
//! All diagnostics go to stderr; stdout is reserved for JSON-RPC frames.

mod logging;

pub use logging::{LogFormat, init_logging};
