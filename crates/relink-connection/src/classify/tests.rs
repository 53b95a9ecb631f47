//! Tests for error classification

use super::*;
use async_trait::async_trait;
use relink_core::{Result, Statement, StatementResult};
use std::io::{Error as IoError, ErrorKind};

fn classifier() -> ErrorClassifier {
    ErrorClassifier::new()
}

#[test]
fn test_gone_away_is_disconnected() {
    let err = RelinkError::Query("MySQL server has gone away".into());
    assert_eq!(
        classifier().classify(&err),
        ErrorClass::TransientConnectionLoss(LossKind::Disconnected)
    );
}

#[test]
fn test_lost_during_query_is_in_flight() {
    let err = RelinkError::Query("Lost connection to MySQL server during query".into());
    assert_eq!(
        classifier().classify(&err),
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );
}

#[test]
fn test_lost_while_connecting_is_disconnected() {
    let err = RelinkError::Connection(
        "Lost connection to MySQL server at 'reading initial communication packet'".into(),
    );
    assert_eq!(
        classifier().classify(&err),
        ErrorClass::TransientConnectionLoss(LossKind::Disconnected)
    );
}

#[test]
fn test_semantic_errors_are_never_transient() {
    let errors = [
        RelinkError::Query("Duplicate entry '1' for key 'PRIMARY'".into()),
        RelinkError::Query("You have an error in your SQL syntax".into()),
        RelinkError::Query("SELECT command denied to user 'app'".into()),
        RelinkError::Configuration("missing host".into()),
    ];
    for err in &errors {
        assert_eq!(classifier().classify(err), ErrorClass::Semantic, "{err}");
    }
}

#[test]
fn test_access_denied_connection_error_is_semantic() {
    let err = RelinkError::Connection("Access denied for user 'app'@'localhost'".into());
    assert_eq!(classifier().classify(&err), ErrorClass::Semantic);
}

#[test]
fn test_unrecognised_connection_error_is_in_flight() {
    let err = RelinkError::Connection("socket hung up".into());
    assert_eq!(
        classifier().classify(&err),
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );
}

#[test]
fn test_io_error_kinds() {
    let broken = RelinkError::Io(IoError::new(ErrorKind::BrokenPipe, "write"));
    let reset = RelinkError::Io(IoError::new(ErrorKind::ConnectionReset, "read"));
    let denied = RelinkError::Io(IoError::new(ErrorKind::PermissionDenied, "socket"));

    assert_eq!(
        classifier().classify(&broken),
        ErrorClass::TransientConnectionLoss(LossKind::Disconnected)
    );
    assert_eq!(
        classifier().classify(&reset),
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );
    assert_eq!(classifier().classify(&denied), ErrorClass::Semantic);
}

#[test]
fn test_terminal_errors_are_not_retried_again() {
    let err = RelinkError::Connection("MySQL server has gone away".into()).into_statement_invalid(3);
    assert_eq!(classifier().classify(&err), ErrorClass::Semantic);
    assert_eq!(classifier().classify(&RelinkError::Closed), ErrorClass::Semantic);
}

#[test]
fn test_custom_signature() {
    let classifier = classifier().with_signature("ORA-03113", LossKind::InFlight);
    let err = RelinkError::Driver("ORA-03113: end-of-file on communication channel".into());
    assert_eq!(
        classifier.classify(&err),
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );
}

#[test]
fn test_error_class_accessors() {
    let class = ErrorClass::TransientConnectionLoss(LossKind::Disconnected);
    assert!(class.is_transient());
    assert!(!ErrorClass::Semantic.is_transient());
}

struct PingOnly {
    alive: bool,
}

#[async_trait]
impl Connection for PingOnly {
    fn driver_name(&self) -> &str {
        "ping-only"
    }

    async fn execute(&self, _statement: &Statement) -> Result<StatementResult> {
        Ok(StatementResult::empty())
    }

    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.alive
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn test_probe_turns_timeout_on_dead_socket_into_loss() {
    let err = RelinkError::Timeout("read timed out".into());

    let dead = PingOnly { alive: false };
    assert_eq!(
        classifier().classify_with_probe(&err, &dead).await,
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );

    let alive = PingOnly { alive: true };
    assert_eq!(
        classifier().classify_with_probe(&err, &alive).await,
        ErrorClass::Semantic
    );
}

#[tokio::test]
async fn test_unrecognised_query_error_on_dead_socket_is_loss() {
    let err = RelinkError::Query("Got an error reading communication packets".into());

    let dead = PingOnly { alive: false };
    assert_eq!(
        classifier().classify_with_probe(&err, &dead).await,
        ErrorClass::TransientConnectionLoss(LossKind::InFlight)
    );

    // a live connection keeps genuine SQL errors semantic
    let alive = PingOnly { alive: true };
    let duplicate = RelinkError::Query("Duplicate entry '1' for key 'PRIMARY'".into());
    assert_eq!(
        classifier().classify_with_probe(&duplicate, &alive).await,
        ErrorClass::Semantic
    );
}

#[tokio::test]
async fn test_layer_errors_are_never_probed() {
    let dead = PingOnly { alive: false };
    for err in [
        RelinkError::Closed,
        RelinkError::TransactionAborted("lost".into()),
        RelinkError::Configuration("bad".into()),
    ] {
        assert_eq!(
            classifier().classify_with_probe(&err, &dead).await,
            ErrorClass::Semantic
        );
    }
}
