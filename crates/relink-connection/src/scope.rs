//! Scoped retry-policy overrides
//!
//! Each session keeps a stack of overrides. Entering `without_retry` or
//! `retryable_transaction` pushes a frame and gets a guard back; dropping the
//! guard pops the frame again, whichever way the scoped block is left.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::RetryPolicyConfig;


/// One override frame; `None` fields inherit from the frame below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryScope {
    retry_enabled: Option<bool>,
    retryable_transaction: Option<bool>,
}

impl RetryScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable retry and reconnect entirely
    pub fn without_retry() -> Self {
        Self::new().with_retry_enabled(false)
    }

    /// Replay whole transactions on connection loss
    pub fn retryable_transaction() -> Self {
        Self::new().with_retryable_transaction(true)
    }

    pub fn with_retry_enabled(mut self, enabled: bool) -> Self {
        self.retry_enabled = Some(enabled);
        self
    }

    pub fn with_retryable_transaction(mut self, retryable: bool) -> Self {
        self.retryable_transaction = Some(retryable);
        self
    }

}

/// The policy in force for one `execute` call
#[derive(Debug, Clone, PartialEq)]
pub struct EffectivePolicy {
    pub retry_enabled: bool,
    pub retryable_transaction: bool,
    pub max_tries: u32,
    pub retry_wait: Duration,
    pub retry_read_only: bool,
}

impl EffectivePolicy {
    /// Policy straight from configuration, no overrides.
    pub fn from_config(config: &RetryPolicyConfig) -> Self {
        Self {
            retry_enabled: config.enable_retry(),
            retryable_transaction: false,
            max_tries: config.max_tries(),
            retry_wait: config.retry_wait(),
            retry_read_only: config.retry_read_only(),
        }
    }

    fn apply(mut self, scope: &RetryScope) -> Self {
        if let Some(enabled) = scope.retry_enabled {
            self.retry_enabled = enabled;
        }
        if let Some(retryable) = scope.retryable_transaction {
            self.retryable_transaction = retryable;
        }
        self
    }
}

/// Session-local stack of `RetryScope` frames
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Arc<Mutex<Frames>>,
}

#[derive(Debug, Default)]
struct Frames {
    next_id: u64,
    entries: Vec<(u64, RetryScope)>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `scope`; the returned guard removes it when dropped.
    pub fn push(&self, scope: RetryScope) -> ScopeGuard {
        let mut frames = self.frames.lock();
        let id = frames.next_id;
        frames.next_id += 1;
        frames.entries.push((id, scope));
        tracing::trace!(depth = frames.entries.len(), ?scope, "retry scope entered");
        ScopeGuard {
            frames: Arc::clone(&self.frames),
            id,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.lock().entries.len()
    }

    /// Fold all frames, oldest first, over `config`.
    pub fn effective(&self, config: &RetryPolicyConfig) -> EffectivePolicy {
        self.frames
            .lock()
            .entries
            .iter()
            .fold(EffectivePolicy::from_config(config), |policy, (_, scope)| {
                policy.apply(scope)
            })
    }
}

/// Removes its own frame on drop
///
/// Frames pushed later by other callers stay in place, so tasks sharing a
/// session can leave their scopes in any order.
#[must_use = "the scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    frames: Arc<Mutex<Frames>>,
    id: u64,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let mut frames = self.frames.lock();
        frames.entries.retain(|(id, _)| *id != self.id);
        tracing::trace!(depth = frames.entries.len(), "retry scope left");
    }
}
