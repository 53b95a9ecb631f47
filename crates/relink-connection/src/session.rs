//! Reconnecting session
//!
//! A `Session` owns one driver connection and routes every statement through
//! the `ExecutionGate`. It also implements `Connection` itself, so it can be
//! handed to code that only knows about plain connections.

use std::future::Future;

use async_trait::async_trait;
use relink_core::{Connection, Result, Statement, StatementBatch, StatementResult};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::ErrorClassifier;
use crate::config::{PolicyHandle, RelinkConfig};
use crate::gate::{ExecutionContext, ExecutionGate};
use crate::handle::ConnectionHandle;
use crate::reconnect::{ReconnectConfig, ReconnectManager, ReconnectObserver};
use crate::scope::{EffectivePolicy, RetryScope, ScopeStack};
use crate::transaction::{TransactionState, TransactionTracker};


struct SessionState {
    handle: ConnectionHandle,
    tracker: TransactionTracker,
}

/// A connection that survives server restarts and failovers
///
/// Calls are serialized: one statement batch (or reconnect) runs at a time.
/// Retry scopes apply to the whole session, so a `without_retry` block
/// affects every task using the session while it is active. Leaving a scope
/// removes only that scope; scopes entered by other tasks stay in force.
pub struct Session {
    id: Uuid,
    driver_name: String,
    state: Mutex<SessionState>,
    scopes: ScopeStack,
    policy: PolicyHandle,
    gate: ExecutionGate,
    cancel: CancellationToken,
}

/// Builder for `Session`
pub struct SessionBuilder {
    connection: Box<dyn Connection>,
    policy: Option<PolicyHandle>,
    reconnect: ReconnectConfig,
    classifier: ErrorClassifier,
    observer: Option<ReconnectObserver>,
}

impl SessionBuilder {
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self::from_boxed(Box::new(connection))
    }

    pub fn from_boxed(connection: Box<dyn Connection>) -> Self {
        Self {
            connection,
            policy: None,
            reconnect: ReconnectConfig::default(),
            classifier: ErrorClassifier::new(),
            observer: None,
        }
    }

    /// Use `policy` instead of the process-wide one.
    pub fn with_policy(mut self, policy: PolicyHandle) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_reconnect_config(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_reconnect_observer(mut self, observer: ReconnectObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Take both the retry policy and the reconnect schedule from `config`.
    ///
    /// The session gets its own policy handle; later changes to the global
    /// policy do not reach it.
    pub fn with_config(self, config: &RelinkConfig) -> Self {
        self.with_policy(PolicyHandle::new(config.retry.clone()))
            .with_reconnect_config(config.reconnect.clone())
    }

    pub fn build(self) -> Session {
        let mut manager = ReconnectManager::new(self.reconnect);
        if let Some(observer) = self.observer {
            manager = manager.with_observer(observer);
        }

        let session = Session {
            id: Uuid::new_v4(),
            driver_name: self.connection.driver_name().to_string(),
            state: Mutex::new(SessionState {
                handle: ConnectionHandle::new(self.connection),
                tracker: TransactionTracker::new(),
            }),
            scopes: ScopeStack::new(),
            policy: self.policy.unwrap_or_else(PolicyHandle::global),
            gate: ExecutionGate::new(self.classifier, manager),
            cancel: CancellationToken::new(),
        };
        tracing::debug!(session_id = %session.id, driver = %session.driver_name, "session opened");
        session
    }
}

impl Session {
    pub fn builder(connection: impl Connection + 'static) -> SessionBuilder {
        SessionBuilder::new(connection)
    }

    /// Wrap `connection` with the global policy and the failover schedule.
    pub fn new(connection: impl Connection + 'static) -> Self {
        SessionBuilder::new(connection).build()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    /// Policy that `execute` would use right now
    pub fn effective_policy(&self) -> EffectivePolicy {
        self.scopes.effective(&self.policy.snapshot())
    }

    /// Execute a single statement.
    pub async fn execute(&self, statement: impl Into<Statement>) -> Result<StatementResult> {
        let batch = StatementBatch::from(statement.into());
        let mut results = self.execute_batch(&batch).await?;
        Ok(results.pop().unwrap_or_else(StatementResult::empty))
    }

    /// Execute `batch` as one retry unit, returning one result per statement.
    #[tracing::instrument(skip_all, fields(session_id = %self.id))]
    pub async fn execute_batch(&self, batch: &StatementBatch) -> Result<Vec<StatementResult>> {
        let policy = self.effective_policy();
        let mut state = self.state.lock().await;
        let SessionState { handle, tracker } = &mut *state;
        let ctx = ExecutionContext {
            handle,
            tracker,
            policy: &policy,
            cancel: &self.cancel,
        };
        self.gate.execute(ctx, batch).await
    }

    /// Run `body` with retry and reconnect disabled.
    pub async fn without_retry<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _scope = self.scopes.push(RetryScope::without_retry());
        body().await
    }

    /// Run `body` inside `BEGIN` / `COMMIT`.
    ///
    /// On failure a `ROLLBACK` is attempted and the original error returned.
    /// Lost connections are not recovered from; use `retryable_transaction`
    /// for that. Inside an already open transaction `body` simply joins it.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_transaction(body).await
    }

    /// Run `body` in a transaction that is replayed from `BEGIN` whenever the
    /// connection is lost part-way.
    ///
    /// Only use this when every statement in `body` may safely run again.
    pub async fn retryable_transaction<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _scope = self.scopes.push(RetryScope::retryable_transaction());
        self.run_transaction(body).await
    }

    async fn run_transaction<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if matches!(
            self.transaction_state().await,
            TransactionState::Began | TransactionState::Active
        ) {
            return body().await;
        }

        self.execute("BEGIN").await?;
        let outcome = match body().await {
            Ok(value) => self.execute("COMMIT").await.map(|_| value),
            Err(error) => Err(error),
        };

        if let Err(error) = &outcome {
            tracing::debug!(session_id = %self.id, error = %error, "rolling back transaction");
            if let Err(rollback) = self.execute("ROLLBACK").await {
                tracing::warn!(session_id = %self.id, error = %rollback, "rollback failed");
            }
            self.state.lock().await.tracker.reset();
        }
        outcome
    }

    /// Make sure the connection is alive, reconnecting if the server does
    /// not answer a ping.
    pub async fn verify(&self) -> Result<()> {
        if self.ping().await {
            return Ok(());
        }
        tracing::info!(session_id = %self.id, "ping failed, reconnecting");
        self.reconnect().await.map(|_| ())
    }

    /// Re-establish the connection now, returning the new generation.
    ///
    /// Any open transaction is lost; the next statement either replays it
    /// (inside `retryable_transaction`) or fails with `TransactionAborted`.
    pub async fn reconnect(&self) -> Result<u64> {
        let policy = self.effective_policy();
        let mut state = self.state.lock().await;
        self.gate
            .reestablish(&mut state.handle, &policy, &self.cancel)
            .await
    }

    pub async fn ping(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.state.lock().await.handle.connection().ping().await
    }

    /// Close the session. Pending waits and reconnect loops end with `Closed`.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let state = self.state.lock().await;
        tracing::debug!(session_id = %self.id, "session closed");
        state.handle.connection().close().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
            || self
                .state
                .try_lock()
                .map(|state| state.handle.connection().is_closed())
                .unwrap_or(false)
    }

    /// Number of successful reconnects so far
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.handle.generation()
    }

    pub async fn transaction_state(&self) -> TransactionState {
        self.state.lock().await.tracker.state()
    }
}

#[async_trait]
impl Connection for Session {
    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    async fn execute(&self, statement: &Statement) -> Result<StatementResult> {
        Session::execute(self, statement).await
    }

    async fn reconnect(&self) -> Result<()> {
        Session::reconnect(self).await.map(|_| ())
    }

    async fn ping(&self) -> bool {
        Session::ping(self).await
    }

    async fn close(&self) -> Result<()> {
        Session::close(self).await
    }

    fn is_closed(&self) -> bool {
        Session::is_closed(self)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("driver", &self.driver_name)
            .field("scopes", &self.scopes.depth())
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}
