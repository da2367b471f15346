//! MCP server frontend.
//!
//! Line-delimited JSON-RPC 2.0 over stdio: requests on stdin, responses
//! on stdout, diagnostics on stderr only.

mod dispatch;
pub mod rpc;
mod server;
mod tool_types;
mod tools;
mod validate;

pub use dispatch::McpMethod;
pub use server::{McpServer, handle_line};
pub use tools::{ToolDefinition, ToolRegistry, ToolResult};
pub use validate::validate_against_schema;
