//! Error types for the quadmap crate.

use std::fmt;

use crate::coordinate::TileCoordinate;
use crate::node::NodeState;
use crate::variant::MapMode;

/// Result type for quadmap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in quadmap operations.
///
/// Variants fall into three groups: configuration errors, which are raised
/// synchronously and never recovered internally; rejected tree operations;
/// and content fetch errors, which only ever mark a single node as failed.
#[derive(Debug, Clone)]
pub enum Error {
    /// A tile coordinate outside the quadtree addressing range.
    MalformedCoordinate {
        /// Requested level.
        level: u8,
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
    },
    /// The requested projection mode has no registered node factory.
    UnregisteredMode {
        /// The mode that was requested.
        mode: MapMode,
    },
    /// A configuration value failed validation.
    InvalidConfig {
        /// Which setting was rejected.
        context: &'static str,
        /// Why it was rejected.
        detail: String,
    },
    /// The node is in a state that does not allow the operation.
    InvalidTransition {
        /// The node's tile.
        coordinate: TileCoordinate,
        /// The node's state at the time of the call.
        state: NodeState,
        /// The rejected operation.
        operation: &'static str,
    },
    /// The node is already at the deepest allowed level.
    MaxDepth {
        /// The node's tile.
        coordinate: TileCoordinate,
        /// The depth limit in effect.
        max_depth: u8,
    },
    /// The node has no displayable content yet.
    ContentNotReady {
        /// The node's tile.
        coordinate: TileCoordinate,
    },
    /// The node handle does not refer to a live node.
    UnknownNode,
    /// HTTP request failed.
    Http {
        /// The URL that failed.
        url: String,
        /// The error message.
        message: String,
    },
    /// HTTP response had a non-success status code.
    HttpStatus {
        /// The URL that returned the error.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
    /// Tile payload decoding failed.
    Decode(quadmap_geometry::DecodeError),
    /// The provider does not serve this kind of data.
    Unsupported {
        /// Provider name.
        provider: String,
        /// The unsupported operation.
        operation: &'static str,
    },
    /// Cache operation failed.
    Cache {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
}

impl Error {
    /// Whether this is a configuration error (fatal at the call site).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MalformedCoordinate { .. }
                | Error::UnregisteredMode { .. }
                | Error::InvalidConfig { .. }
        )
    }

    /// Whether this error came from fetching tile content.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Error::Http { .. }
                | Error::HttpStatus { .. }
                | Error::Decode(_)
                | Error::Unsupported { .. }
                | Error::Cache { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedCoordinate { level, x, y } => {
                write!(f, "malformed tile coordinate {level}/{x}/{y}")
            }
            Error::UnregisteredMode { mode } => {
                write!(f, "no node factory registered for mode {mode}")
            }
            Error::InvalidConfig { context, detail } => {
                write!(f, "invalid {context}: {detail}")
            }
            Error::InvalidTransition {
                coordinate,
                state,
                operation,
            } => write!(f, "cannot {operation} node {coordinate} in state {state:?}"),
            Error::MaxDepth {
                coordinate,
                max_depth,
            } => write!(f, "node {coordinate} is at max depth {max_depth}"),
            Error::ContentNotReady { coordinate } => {
                write!(f, "node {coordinate} has no content yet")
            }
            Error::UnknownNode => write!(f, "node handle is not live"),
            Error::Http { url, message } => {
                write!(f, "http request to {url} failed: {message}")
            }
            Error::HttpStatus { url, status } => {
                write!(f, "http request to {url} returned status {status}")
            }
            Error::Decode(e) => write!(f, "decode error: {e}"),
            Error::Unsupported {
                provider,
                operation,
            } => write!(f, "provider {provider} does not support {operation}"),
            Error::Cache { operation, message } => {
                write!(f, "cache {operation} failed: {message}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<quadmap_geometry::DecodeError> for Error {
    fn from(e: quadmap_geometry::DecodeError) -> Self {
        Error::Decode(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let config = Error::MalformedCoordinate { level: 1, x: 2, y: 0 };
        assert!(config.is_configuration());
        assert!(!config.is_fetch());

        let fetch = Error::HttpStatus {
            url: "http://tiles/1/0/0.png".to_string(),
            status: 404,
        };
        assert!(fetch.is_fetch());
        assert!(!fetch.is_configuration());

        assert!(!Error::UnknownNode.is_fetch());
        assert!(!Error::UnknownNode.is_configuration());
    }

    #[test]
    fn test_display() {
        let e = Error::MalformedCoordinate { level: 1, x: 2, y: 0 };
        assert_eq!(e.to_string(), "malformed tile coordinate 1/2/0");
        let e = Error::UnregisteredMode {
            mode: MapMode::HeightGpu,
        };
        assert_eq!(e.to_string(), "no node factory registered for mode height-gpu");
    }
}
