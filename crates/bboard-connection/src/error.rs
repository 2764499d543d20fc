//! Pool and acquisition errors

use std::time::Duration;

use bboard_core::BoardError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the pool and the acquisition coordinator
#[derive(Error, Debug)]
pub enum PoolError {
    /// The factory could not open a new session
    #[error("failed to create connection: {0}")]
    ConnectionCreateFailed(#[source] BoardError),

    /// Every slot is checked out and nothing came back in time
    #[error("pool exhausted: no connection available within {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// A checked-out handle failed its liveness probe
    #[error("connection {id} failed its liveness probe")]
    ConnectionDead { id: u64 },

    /// A dead handle was discarded but no replacement could be opened
    #[error("failed to replace dead connection: {0}")]
    ReplacementFailed(#[source] BoardError),

    /// Acquisition gave up; `last` is the final attempt's error
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<PoolError>,
    },

    /// The pool has been shut down
    #[error("connection pool is closed")]
    PoolClosed,

    /// Invalid pool or retry configuration
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// Error returned by work performed on a checked-out connection
    #[error(transparent)]
    Database(#[from] BoardError),
}

impl PoolError {
    /// Whether the acquisition loop should stop instead of retrying
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PoolError::PoolClosed
                | PoolError::Configuration(_)
                | PoolError::RetriesExhausted { .. }
                | PoolError::Database(_)
        )
    }

    /// Coarse classification suitable for reports and metrics labels
    pub fn kind(&self) -> PoolErrorKind {
        match self {
            PoolError::ConnectionCreateFailed(_) => PoolErrorKind::ConnectionCreateFailed,
            PoolError::PoolExhausted { .. } => PoolErrorKind::PoolExhausted,
            PoolError::ConnectionDead { .. } => PoolErrorKind::ConnectionDead,
            PoolError::ReplacementFailed(_) => PoolErrorKind::ReplacementFailed,
            PoolError::RetriesExhausted { .. } => PoolErrorKind::RetriesExhausted,
            PoolError::PoolClosed => PoolErrorKind::PoolClosed,
            PoolError::Configuration(_) => PoolErrorKind::Configuration,
            PoolError::Database(_) => PoolErrorKind::Database,
        }
    }

    /// The error that ended the retry loop, or `self` if this is not a
    /// `RetriesExhausted` wrapper.
    pub fn root(&self) -> &PoolError {
        match self {
            PoolError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Serializable discriminant of [`PoolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolErrorKind {
    ConnectionCreateFailed,
    PoolExhausted,
    ConnectionDead,
    ReplacementFailed,
    RetriesExhausted,
    PoolClosed,
    Configuration,
    Database,
}

impl std::fmt::Display for PoolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PoolErrorKind::ConnectionCreateFailed => "connection_create_failed",
            PoolErrorKind::PoolExhausted => "pool_exhausted",
            PoolErrorKind::ConnectionDead => "connection_dead",
            PoolErrorKind::ReplacementFailed => "replacement_failed",
            PoolErrorKind::RetriesExhausted => "retries_exhausted",
            PoolErrorKind::PoolClosed => "pool_closed",
            PoolErrorKind::Configuration => "configuration",
            PoolErrorKind::Database => "database",
        };
        f.write_str(name)
    }
}

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(PoolError::PoolClosed.is_terminal());
        assert!(PoolError::Configuration("max".into()).is_terminal());
        assert!(
            !PoolError::PoolExhausted {
                timeout: Duration::from_secs(1)
            }
            .is_terminal()
        );
        assert!(!PoolError::ConnectionCreateFailed(BoardError::Connection("refused".into())).is_terminal());
        assert!(!PoolError::ReplacementFailed(BoardError::Timeout("connect".into())).is_terminal());
    }

    #[test]
    fn test_root_unwraps_retries_exhausted() {
        let err = PoolError::RetriesExhausted {
            attempts: 3,
            last: Box::new(PoolError::PoolExhausted {
                timeout: Duration::from_millis(10),
            }),
        };
        assert_eq!(err.kind(), PoolErrorKind::RetriesExhausted);
        assert_eq!(err.root().kind(), PoolErrorKind::PoolExhausted);
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PoolErrorKind::ReplacementFailed).unwrap();
        assert_eq!(json, "\"replacement_failed\"");
        assert_eq!(PoolErrorKind::PoolClosed.to_string(), "pool_closed");
    }
}
