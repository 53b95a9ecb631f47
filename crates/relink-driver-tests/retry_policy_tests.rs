//! Retry Policy Tests
//!
//! What is re-sent after a connection loss depends on the policy in force:
//! `without_retry` and `enable_retry = false` turn retrying off, and writes
//! are only re-sent when `retry_read_only` is off and the statement provably
//! never reached the server.

use crate::fixtures::{
    Fault, SimulatedServer, config, count_employees, insert_employee, server, session_for,
};
use anyhow::Result;
use pretty_assertions::assert_eq;
use relink_connection::RelinkConfig;
use relink_core::RelinkError;
use rstest::rstest;

/// `without_retry` surfaces the connection error and leaves no trace afterwards
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_without_retry_raises(server: SimulatedServer, config: RelinkConfig) -> Result<()> {
    let session = session_for(&server, &config);
    server.restart();

    let err = session
        .without_retry(|| async { session.execute("SELECT 1").await })
        .await
        .unwrap_err();

    assert!(matches!(err, RelinkError::Query(ref message) if message.contains("gone away")));
    assert_eq!(server.connects(), 1);

    // the next call retries again
    assert_eq!(count_employees(&session).await?, 0);
    assert_eq!(server.connects(), 2);
    Ok(())
}

/// `enable_retry = false` behaves like a session-wide `without_retry`
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_disabled_retry_raises(server: SimulatedServer, mut config: RelinkConfig) {
    config.retry = config.retry.with_enable_retry(false);
    let session = session_for(&server, &config);
    server.restart();

    let err = session.execute("SELECT 1").await.unwrap_err();

    assert!(!err.is_terminal());
    assert_eq!(server.connects(), 1);
}

/// A write is not re-sent under `retry_read_only`
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_write_not_replayed_under_read_only(server: SimulatedServer, config: RelinkConfig) {
    let session = session_for(&server, &config);
    server.restart();

    let err = session.execute(insert_employee("bob")).await.unwrap_err();

    assert!(matches!(err, RelinkError::Query(_)));
    assert_eq!(server.employee_count(), 0);
    assert!(server.applied().is_empty());
    assert_eq!(server.connects(), 1);
}

/// A write that never reached the server is re-sent once `retry_read_only` is off
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_write_replayed_when_allowed(
    server: SimulatedServer,
    mut config: RelinkConfig,
) -> Result<()> {
    config.retry = config.retry.with_retry_read_only(false);
    let session = session_for(&server, &config);
    server.restart();

    session.execute(insert_employee("bob")).await?;

    assert_eq!(server.employees(), vec!["bob"]);
    Ok(())
}

/// A write lost mid-flight is never re-sent, even with `retry_read_only` off
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_lost_connection_during_write(server: SimulatedServer, mut config: RelinkConfig) {
    config.retry = config.retry.with_retry_read_only(false);
    let session = session_for(&server, &config);
    server.inject(Fault::AppliedThenLost);

    let err = session.execute(insert_employee("carol")).await.unwrap_err();

    assert!(matches!(err, RelinkError::Query(ref message) if message.contains("during query")));
    // applied exactly once, by the attempt whose reply was lost
    assert_eq!(server.employees(), vec!["carol"]);
}

/// Writes rejected by a read-only replica are reported, not retried
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_read_only_server_rejects_write(server: SimulatedServer, config: RelinkConfig) {
    let session = session_for(&server, &config);
    server.set_read_only(true);

    let err = session.execute(insert_employee("dave")).await.unwrap_err();

    assert!(err.to_string().contains("read-only"));
    assert_eq!(server.connects(), 1);
}

/// Syntax errors propagate immediately
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_semantic_error_not_retried(server: SimulatedServer, config: RelinkConfig) {
    let session = session_for(&server, &config);

    let err = session.execute("SELEC 1").await.unwrap_err();

    assert!(err.to_string().contains("SQL syntax"));
    assert_eq!(server.connects(), 1);
}

/// `max_tries` bounds the number of attempts, the first one included
#[rstest]
#[case::single(1)]
#[case::two(2)]
#[case::four(4)]
#[tokio::test(start_paused = true)]
async fn test_retry_budget(
    server: SimulatedServer,
    mut config: RelinkConfig,
    #[case] max_tries: u32,
) -> Result<()> {
    config.retry = config.retry.with_max_tries(max_tries);
    let session = session_for(&server, &config);

    // one fault fewer than the budget still succeeds
    for _ in 1..max_tries {
        server.inject(Fault::GoneAway);
    }
    assert_eq!(count_employees(&session).await?, 0);

    // as many faults as the budget does not
    for _ in 0..max_tries {
        server.inject(Fault::GoneAway);
    }
    let err = session.execute("SELECT 1").await.unwrap_err();
    assert!(matches!(err, RelinkError::StatementInvalid { attempts, .. } if attempts == max_tries));
    Ok(())
}

/// Policy changes through the handle apply from the next statement on
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_policy_update_applies_to_next_call(server: SimulatedServer, config: RelinkConfig) {
    let session = session_for(&server, &config);
    session
        .policy()
        .update(|policy| *policy = policy.clone().with_enable_retry(false));

    server.restart();
    assert!(session.execute("SELECT 1").await.is_err());

    session
        .policy()
        .update(|policy| *policy = policy.clone().with_enable_retry(true));
    assert!(session.execute("SELECT 1").await.is_ok());
}
