//! Error types for Relink

use thiserror::Error;

/// Core error type for Relink operations
///
/// The first group of variants is what drivers report. The second group is
/// produced by the retry layer itself and is what callers see once retrying
/// has given up.
#[derive(Error, Debug)]
pub enum RelinkError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),

    /// Reconnect attempts ran through the whole backoff schedule.
    #[error("Reconnect failed after {attempts} attempts: {source}")]
    ReconnectExhausted {
        attempts: u32,
        #[source]
        source: Box<RelinkError>,
    },

    /// Statement-level retry budget exhausted; wraps the last underlying failure.
    #[error("Statement invalid after {attempts} attempts: {source}")]
    StatementInvalid {
        attempts: u32,
        #[source]
        source: Box<RelinkError>,
    },

    /// The current transaction was lost and cannot be continued.
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    /// The session was closed while work was pending.
    #[error("Session closed")]
    Closed,
}

impl RelinkError {
    /// Wrap `self` as the terminal error of an exhausted statement retry loop.
    pub fn into_statement_invalid(self, attempts: u32) -> Self {
        RelinkError::StatementInvalid {
            attempts,
            source: Box::new(self),
        }
    }

    /// Whether this error was produced by the retry layer rather than a driver.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelinkError::ReconnectExhausted { .. }
                | RelinkError::StatementInvalid { .. }
                | RelinkError::TransactionAborted(_)
                | RelinkError::Closed
        )
    }

    /// Walk `StatementInvalid` / `ReconnectExhausted` wrappers down to the driver error.
    pub fn root_cause(&self) -> &RelinkError {
        match self {
            RelinkError::ReconnectExhausted { source, .. }
            | RelinkError::StatementInvalid { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for Relink operations
pub type Result<T> = std::result::Result<T, RelinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_invalid_wraps_source() {
        let err = RelinkError::Connection("MySQL server has gone away".into())
            .into_statement_invalid(3);

        assert!(err.is_terminal());
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("gone away"));
    }

    #[test]
    fn test_root_cause_unwraps_nested_terminals() {
        let reconnect = RelinkError::ReconnectExhausted {
            attempts: 7,
            source: Box::new(RelinkError::Connection("Can't connect".into())),
        };
        let err = reconnect.into_statement_invalid(2);

        assert!(matches!(err.root_cause(), RelinkError::Connection(msg) if msg == "Can't connect"));
    }

    #[test]
    fn test_driver_errors_are_not_terminal() {
        assert!(!RelinkError::Query("syntax error".into()).is_terminal());
        assert!(!RelinkError::Timeout("read".into()).is_terminal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err: RelinkError = io.into();
        assert!(matches!(err, RelinkError::Io(_)));
    }
}
