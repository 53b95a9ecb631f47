//! Error classification
//!
//! Decides whether a failure means the socket died (worth reconnecting and
//! replaying) or the statement itself was rejected (never retried). An
//! unrecognised failure counts as semantic unless the connection also stops
//! answering pings.

use relink_core::{Connection, RelinkError};

#[cfg(test)]
mod tests;

/// Messages reported after the statement may already have reached the server
const IN_FLIGHT_SIGNATURES: &[&str] = &[
    "connection reset",
    "server closed the connection unexpectedly",
    "connection was killed",
    "query execution was interrupted",
];

/// Messages reported when the statement could not have been executed
const DISCONNECTED_SIGNATURES: &[&str] = &[
    "server has gone away",
    "server shutdown in progress",
    "can't connect to",
    "closed mysql connection",
    "closed connection",
    "connection is closed",
    "connection refused",
    "broken pipe",
    "not connected",
    "lost connection to mysql server at",
    "unknown mysql server host",
    "read-only option",
];

/// Connection-level messages that are nevertheless permanent
const SEMANTIC_CONNECTION_SIGNATURES: &[&str] = &["access denied", "unknown database"];

/// Whether the statement that failed might have been executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LossKind {
    /// The socket was already dead; the statement never reached the server.
    Disconnected,
    /// The socket died mid-statement; the outcome is unknown.
    InFlight,
}

/// Result of classifying a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    TransientConnectionLoss(LossKind),
    Semantic,
}

impl ErrorClass {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::TransientConnectionLoss(_))
    }
}

/// Classifies driver failures
///
/// Pure apart from `classify_with_probe`, which pings the connection to
/// settle ambiguous failures such as timeouts.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    extra_signatures: Vec<(String, LossKind)>,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognise an additional driver-specific message (matched case-insensitively).
    pub fn with_signature(mut self, message: impl Into<String>, kind: LossKind) -> Self {
        self.extra_signatures
            .push((message.into().to_ascii_lowercase(), kind));
        self
    }

    pub fn classify(&self, error: &RelinkError) -> ErrorClass {
        match error {
            RelinkError::Io(io) => classify_io(io.kind()),
            RelinkError::Connection(message) => {
                let lower = message.to_ascii_lowercase();
                if SEMANTIC_CONNECTION_SIGNATURES
                    .iter()
                    .any(|signature| lower.contains(signature))
                {
                    return ErrorClass::Semantic;
                }
                // unknown connection failures are treated as possibly executed
                ErrorClass::TransientConnectionLoss(
                    self.match_signature(&lower).unwrap_or(LossKind::InFlight),
                )
            }
            RelinkError::Query(message)
            | RelinkError::Driver(message)
            | RelinkError::Timeout(message)
            | RelinkError::Other(message) => self
                .match_signature(&message.to_ascii_lowercase())
                .map_or(ErrorClass::Semantic, ErrorClass::TransientConnectionLoss),
            RelinkError::Configuration(_)
            | RelinkError::ReconnectExhausted { .. }
            | RelinkError::StatementInvalid { .. }
            | RelinkError::TransactionAborted(_)
            | RelinkError::Closed => ErrorClass::Semantic,
        }
    }

    /// Classify, pinging `connection` when the failure alone is inconclusive.
    ///
    /// Any driver failure the message alone does not settle is probed; a failed
    /// ping turns it into an in-flight connection loss. Errors raised by the
    /// retry layer itself are never probed.
    pub async fn classify_with_probe(
        &self,
        error: &RelinkError,
        connection: &dyn Connection,
    ) -> ErrorClass {
        let class = self.classify(error);
        if class.is_transient() || !is_ambiguous(error) {
            return class;
        }
        if connection.ping().await {
            class
        } else {
            tracing::debug!(error = %error, "ping failed, treating error as connection loss");
            ErrorClass::TransientConnectionLoss(LossKind::InFlight)
        }
    }

    fn match_signature(&self, lower: &str) -> Option<LossKind> {
        if let Some((_, kind)) = self
            .extra_signatures
            .iter()
            .find(|(signature, _)| lower.contains(signature.as_str()))
        {
            return Some(*kind);
        }
        if (lower.contains("lost connection") && lower.contains("during query"))
            || IN_FLIGHT_SIGNATURES
                .iter()
                .any(|signature| lower.contains(signature))
        {
            return Some(LossKind::InFlight);
        }
        if DISCONNECTED_SIGNATURES
            .iter()
            .any(|signature| lower.contains(signature))
        {
            return Some(LossKind::Disconnected);
        }
        None
    }
}

fn classify_io(kind: std::io::ErrorKind) -> ErrorClass {
    use std::io::ErrorKind::*;

    match kind {
        BrokenPipe | NotConnected | ConnectionRefused => {
            ErrorClass::TransientConnectionLoss(LossKind::Disconnected)
        }
        ConnectionReset | ConnectionAborted | UnexpectedEof => {
            ErrorClass::TransientConnectionLoss(LossKind::InFlight)
        }
        _ => ErrorClass::Semantic,
    }
}

fn is_ambiguous(error: &RelinkError) -> bool {
    matches!(
        error,
        RelinkError::Query(_)
            | RelinkError::Driver(_)
            | RelinkError::Timeout(_)
            | RelinkError::Other(_)
            | RelinkError::Io(_)
    )
}
