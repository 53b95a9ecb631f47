//! Logical transaction tracking
//!
//! The tracker, not the driver, is the source of truth for whether a
//! transaction is open. It records every statement issued since `BEGIN` so
//! that a transaction lost with its connection can be replayed from the
//! start on the next one.

use relink_core::{Statement, StatementBatch};


/// Lifecycle of the current logical transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// No transaction is open
    #[default]
    None,
    /// `BEGIN` was issued, nothing else yet
    Began,
    /// At least one statement ran inside the transaction
    Active,
    /// The transaction was lost and can only be rolled back
    Aborted,
}

/// Tracks the transaction open on a session and the statements it issued
#[derive(Debug, Clone, Default)]
pub struct TransactionTracker {
    state: TransactionState,
    begin: Option<Statement>,
    recorded: Vec<Statement>,
    generation: u64,
}

impl TransactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// `Began` or `Active`
    pub fn is_open(&self) -> bool {
        matches!(
            self.state,
            TransactionState::Began | TransactionState::Active
        )
    }

    pub fn is_aborted(&self) -> bool {
        self.state == TransactionState::Aborted
    }

    /// Statements issued since `BEGIN`, in order
    pub fn recorded(&self) -> &[Statement] {
        &self.recorded
    }

    /// Connection generation the open transaction was started on
    pub fn generation(&self) -> Option<u64> {
        self.is_open().then_some(self.generation)
    }

    /// Whether the open transaction belongs to an older connection generation.
    pub fn is_stale(&self, current_generation: u64) -> bool {
        self.is_open() && self.generation != current_generation
    }

    /// Start tracking a transaction if `statement` is a `BEGIN`.
    ///
    /// A `BEGIN` inside an open transaction implicitly commits it on the
    /// server, so tracking restarts either way.
    pub fn begin_detected(&mut self, statement: &Statement, generation: u64) -> bool {
        if !statement.is_begin() {
            return false;
        }
        if self.is_open() {
            tracing::debug!("BEGIN inside an open transaction, previous one implicitly committed");
        }
        self.state = TransactionState::Began;
        self.begin = Some(statement.clone());
        self.recorded.clear();
        self.generation = generation;
        true
    }

    /// Append a statement to the open transaction.
    pub fn record_statement(&mut self, statement: &Statement) {
        if self.is_open() {
            self.recorded.push(statement.clone());
            self.state = TransactionState::Active;
        }
    }

    pub fn commit(&mut self) {
        self.clear();
    }

    pub fn rollback(&mut self) {
        self.clear();
    }

    /// The transaction cannot continue; only `ROLLBACK` or a new `BEGIN`
    /// (or leaving the surrounding transaction scope) clears this.
    pub fn mark_aborted(&mut self) {
        if self.is_open() {
            tracing::warn!(
                recorded = self.recorded.len(),
                "transaction aborted after connection loss"
            );
            self.state = TransactionState::Aborted;
            self.begin = None;
            self.recorded.clear();
        }
    }

    /// Forget any transaction, aborted or not (scope exit).
    pub fn reset(&mut self) {
        self.clear();
    }

    /// Apply one statement that executed successfully on `generation`.
    pub fn observe_statement(&mut self, statement: &Statement, generation: u64) {
        if self.begin_detected(statement, generation) {
            return;
        }
        if statement.is_commit() {
            self.commit();
        } else if statement.is_rollback() {
            self.rollback();
        } else {
            self.record_statement(statement);
        }
    }

    /// `BEGIN` followed by every recorded statement, in original order.
    ///
    /// Empty when no transaction is open.
    pub fn replay_prefix(&self) -> StatementBatch {
        match (&self.begin, self.is_open()) {
            (Some(begin), true) => std::iter::once(begin.clone())
                .chain(self.recorded.iter().cloned())
                .collect(),
            _ => StatementBatch::new(),
        }
    }

    fn clear(&mut self) {
        self.state = TransactionState::None;
        self.begin = None;
        self.recorded.clear();
    }
}
