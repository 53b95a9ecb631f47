//! Relink Connection - Reconnecting sessions with statement retry
//!
//! This crate wraps a driver `Connection` in a `Session` that classifies
//! failures, reconnects with a fixed backoff schedule, and re-sends work
//! that is safe to repeat, including whole transactions inside
//! `retryable_transaction`.

pub mod classify;
pub mod config;
mod gate;
mod handle;
pub mod reconnect;
mod scope;
mod session;
mod transaction;
mod wait;

pub use classify::{ErrorClass, ErrorClassifier, LossKind};
pub use config::{ConfigError, PolicyHandle, RelinkConfig, RetryPolicyConfig};
pub use gate::{ExecutionContext, ExecutionGate};
pub use handle::ConnectionHandle;
pub use reconnect::{
    BackoffSchedule, ReconnectConfig, ReconnectEvent, ReconnectManager, ReconnectObserver,
};
pub use scope::{EffectivePolicy, RetryScope, ScopeGuard, ScopeStack};
pub use session::{Session, SessionBuilder};
pub use transaction::{TransactionState, TransactionTracker};
