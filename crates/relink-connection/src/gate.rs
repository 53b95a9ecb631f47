//! Retry gate around statement execution
//!
//! Every statement a session issues goes through `ExecutionGate::execute`.
//! On a transient connection loss the gate reconnects and, when the active
//! policy allows it, re-sends the batch (and the open transaction in front
//! of it). Semantic failures always propagate unchanged.

use relink_core::{RelinkError, Result, Statement, StatementBatch, StatementResult};
use tokio_util::sync::CancellationToken;

use crate::classify::{ErrorClass, ErrorClassifier, LossKind};
use crate::handle::ConnectionHandle;
use crate::reconnect::ReconnectManager;
use crate::scope::EffectivePolicy;
use crate::transaction::TransactionTracker;
use crate::wait::pause;


/// Mutable session state the gate works on for the duration of one call
pub struct ExecutionContext<'a> {
    pub handle: &'a mut ConnectionHandle,
    pub tracker: &'a mut TransactionTracker,
    pub policy: &'a EffectivePolicy,
    pub cancel: &'a CancellationToken,
}

/// A batch that stopped part-way
#[derive(Debug)]
struct BatchFailure {
    error: RelinkError,
    /// Writes of the caller's batch that completed before `error`
    completed_writes: usize,
}

/// Decides, per failure, between retrying and giving up
#[derive(Debug, Clone, Default)]
pub struct ExecutionGate {
    classifier: ErrorClassifier,
    reconnect: ReconnectManager,
}

impl ExecutionGate {
    pub fn new(classifier: ErrorClassifier, reconnect: ReconnectManager) -> Self {
        Self {
            classifier,
            reconnect,
        }
    }

    /// Execute `batch`, retrying on connection loss as `ctx.policy` allows.
    ///
    /// Returns one result per statement of `batch`. When the retry budget
    /// runs out the last failure is wrapped in `StatementInvalid`; failures
    /// that may not be retried at all are returned as the driver reported
    /// them.
    #[tracing::instrument(
        skip_all,
        fields(statements = batch.len(), generation = ctx.handle.generation())
    )]
    pub async fn execute(
        &self,
        ctx: ExecutionContext<'_>,
        batch: &StatementBatch,
    ) -> Result<Vec<StatementResult>> {
        let ExecutionContext {
            handle,
            tracker,
            policy,
            cancel,
        } = ctx;

        if cancel.is_cancelled() {
            return Err(RelinkError::Closed);
        }
        let Some(first) = batch.statements().first() else {
            return Ok(Vec::new());
        };

        let lost = tracker.is_aborted() || tracker.is_stale(handle.generation());
        let mut replay_first = false;
        if lost {
            if first.is_rollback() && batch.len() == 1 {
                tracing::debug!("rollback of a lost transaction acknowledged locally");
                tracker.reset();
                return Ok(vec![StatementResult::empty()]);
            }
            if first.is_begin() {
                tracker.reset();
            } else if tracker.is_aborted() {
                return Err(aborted());
            } else if policy.retry_enabled && policy.retryable_transaction {
                tracing::debug!(
                    recorded = tracker.recorded().len(),
                    "transaction predates reconnect, replaying"
                );
                replay_first = true;
            } else {
                tracker.mark_aborted();
                return Err(aborted());
            }
        }

        let before = tracker.clone();

        if !policy.retry_enabled {
            return match self.run(handle, tracker, batch, 0, cancel).await {
                Ok(results) => Ok(results),
                Err(failure) => {
                    let class = self
                        .classifier
                        .classify_with_probe(&failure.error, handle.connection())
                        .await;
                    if class.is_transient() {
                        abandon(tracker, &before);
                    }
                    Err(failure.error)
                }
            };
        }

        let max_tries = policy.max_tries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_tries {
            if attempt > 1 {
                pause(policy.retry_wait, cancel).await?;
                match self.reconnect.reconnect(handle, cancel).await {
                    Ok(_) => {}
                    Err(error @ RelinkError::ReconnectExhausted { .. }) => {
                        last_error = Some(error);
                        continue;
                    }
                    Err(error) => {
                        abandon(tracker, &before);
                        return Err(error);
                    }
                }
            }

            *tracker = before.clone();
            let prefix = if attempt > 1 || replay_first {
                before.replay_prefix()
            } else {
                StatementBatch::new()
            };
            if !prefix.is_empty() {
                tracker.reset();
            }

            let skip = prefix.len();
            let failure = match self
                .run(handle, tracker, &prefix.chain(batch), skip, cancel)
                .await
            {
                Ok(mut results) => {
                    if attempt > 1 {
                        tracing::info!(attempt, replayed = skip, "statement succeeded after retry");
                    }
                    return Ok(results.split_off(skip));
                }
                Err(failure) => failure,
            };

            let class = self
                .classifier
                .classify_with_probe(&failure.error, handle.connection())
                .await;

            let kind = match class {
                ErrorClass::Semantic => {
                    if skip > 0 {
                        // the replayed transaction no longer matches the original
                        self.discard(handle, cancel).await;
                        abandon(tracker, &before);
                    }
                    return Err(failure.error);
                }
                ErrorClass::TransientConnectionLoss(kind) => kind,
            };

            if first.is_rollback() && batch.len() == 1 {
                tracing::debug!("connection lost during rollback, transaction is gone either way");
                tracker.reset();
                return Ok(vec![StatementResult::empty()]);
            }

            if !may_retry(policy, &before, batch, &failure, kind) {
                tracing::warn!(
                    attempt,
                    error = %failure.error,
                    ?kind,
                    "connection lost, statement not retryable"
                );
                abandon(tracker, &before);
                return Err(failure.error);
            }

            tracing::warn!(
                attempt,
                max_tries,
                error = %failure.error,
                "connection lost, retrying"
            );
            last_error = Some(failure.error);
        }

        abandon(tracker, &before);
        let error = last_error
            .unwrap_or_else(|| RelinkError::Connection("no attempt was made".into()));
        tracing::error!(max_tries, error = %error, "retry attempts exhausted");
        Err(error.into_statement_invalid(max_tries))
    }

    /// Re-establish the connection outside of statement execution.
    ///
    /// With retry disabled a single driver reconnect is made. Otherwise up to
    /// `max_tries` rounds of the backoff schedule run, `retry_wait` apart.
    #[tracing::instrument(skip_all, fields(generation = handle.generation()))]
    pub async fn reestablish(
        &self,
        handle: &mut ConnectionHandle,
        policy: &EffectivePolicy,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(RelinkError::Closed);
        }

        if !policy.retry_enabled {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelinkError::Closed),
                outcome = handle.connection().reconnect() => outcome?,
            }
            let generation = handle.advance_generation();
            tracing::info!(generation, "reconnected without retry");
            return Ok(generation);
        }

        let rounds = policy.max_tries.max(1);
        let mut last_error = None;
        for round in 1..=rounds {
            if round > 1 {
                pause(policy.retry_wait, cancel).await?;
            }
            match self.reconnect.reconnect(handle, cancel).await {
                Ok(generation) => return Ok(generation),
                Err(error @ RelinkError::ReconnectExhausted { .. }) => {
                    tracing::warn!(round, rounds, "reconnect schedule exhausted");
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error
            .unwrap_or_else(|| RelinkError::Connection("no reconnect attempt was made".into())))
    }

    /// Run `batch` statement by statement, feeding successes to `tracker`.
    ///
    /// The first `skip` statements are a replayed prefix and do not count
    /// toward `completed_writes`.
    async fn run(
        &self,
        handle: &ConnectionHandle,
        tracker: &mut TransactionTracker,
        batch: &StatementBatch,
        skip: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<StatementResult>, BatchFailure> {
        let generation = handle.generation();
        let connection = handle.connection();
        let mut results = Vec::with_capacity(batch.len());
        let mut completed_writes = 0;

        for (index, statement) in batch.iter().enumerate() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RelinkError::Closed),
                outcome = connection.execute(statement) => outcome,
            };
            match outcome {
                Ok(result) => {
                    tracker.observe_statement(statement, generation);
                    if index >= skip && statement.is_write() {
                        completed_writes += 1;
                    }
                    results.push(result);
                }
                Err(error) => {
                    tracing::debug!(
                        index,
                        statement = %statement,
                        error = %error,
                        "statement failed"
                    );
                    return Err(BatchFailure {
                        error,
                        completed_writes,
                    });
                }
            }
        }
        Ok(results)
    }

    /// Best-effort rollback of whatever the server holds open.
    async fn discard(&self, handle: &ConnectionHandle, cancel: &CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }
        if let Err(error) = handle.connection().execute(&Statement::new("ROLLBACK")).await {
            tracing::debug!(error = %error, "rollback of partial replay failed");
        }
    }
}

/// Whether a transient failure of `batch` may be re-sent.
fn may_retry(
    policy: &EffectivePolicy,
    before: &TransactionTracker,
    batch: &StatementBatch,
    failure: &BatchFailure,
    kind: LossKind,
) -> bool {
    let starts_transaction = batch.statements().first().is_some_and(Statement::is_begin);
    if before.is_open() || starts_transaction {
        // the outcome of an interrupted COMMIT is unknown
        return policy.retryable_transaction
            && !(kind == LossKind::InFlight && batch.contains_commit());
    }

    if failure.completed_writes > 0 {
        return false;
    }
    if batch.has_writes() {
        if kind == LossKind::InFlight {
            return false;
        }
        if policy.retry_read_only && !policy.retryable_transaction {
            return false;
        }
    }
    true
}

/// Mark the transaction that was open before the call (or opened by it) as lost.
fn abandon(tracker: &mut TransactionTracker, before: &TransactionTracker) {
    if !tracker.is_open() && before.is_open() {
        *tracker = before.clone();
    }
    tracker.mark_aborted();
}

fn aborted() -> RelinkError {
    RelinkError::TransactionAborted(
        "the transaction was lost with its connection; issue ROLLBACK before continuing".into(),
    )
}
