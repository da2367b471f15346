//! MCP method dispatch with type-safe enum variants.
//!
//! Unknown methods are captured for error reporting rather than matched
//! by string downstream.

use std::fmt;

/// MCP protocol method identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum McpMethod {
    /// Initialize the MCP session.
    Initialize,
    /// List available tools.
    ListTools,
    /// Call a specific tool.
    CallTool,
    /// Ping the server (health check).
    Ping,
    /// Unknown method (for error handling).
    Unknown(String),
}

impl McpMethod {
    /// Returns the MCP protocol method name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::ListTools => "tools/list",
            Self::CallTool => "tools/call",
            Self::Ping => "ping",
            Self::Unknown(s) => s.as_str(),
        }
    }

    /// Returns true if this is a known method.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for McpMethod {
    fn from(s: &str) -> Self {
        match s {
            "initialize" => Self::Initialize,
            "tools/list" => Self::ListTools,
            "tools/call" => Self::CallTool,
            "ping" => Self::Ping,
            unknown => Self::Unknown(unknown.to_string()),
        }
    }
}

impl fmt::Display for McpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(McpMethod::from("initialize"), McpMethod::Initialize);
        assert_eq!(McpMethod::from("tools/list"), McpMethod::ListTools);
        assert_eq!(McpMethod::from("tools/call"), McpMethod::CallTool);
        assert_eq!(McpMethod::from("ping"), McpMethod::Ping);
    }

    #[test]
    fn test_unknown_method() {
        let method = McpMethod::from("resources/list");
        assert!(!method.is_known());
        assert_eq!(method.as_str(), "resources/list");
    }
}
