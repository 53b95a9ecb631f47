//! Statement-level retry policy and its process-wide handle

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How many times, and how gently, failed statements are re-issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total statement-level attempts, the first one included
    max_tries: u32,
    /// Pacing delay between two statement-level attempts
    #[serde(
        rename = "retry_wait_seconds",
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs"
    )]
    retry_wait: Duration,
    /// Master switch for retry and reconnect
    enable_retry: bool,
    /// Only re-send batches that contain no writes
    retry_read_only: bool,
}

impl RetryPolicyConfig {
    /// Create a policy with the given attempt budget and pacing delay.
    ///
    /// Retry stays enabled and restricted to read-only batches.
    pub fn new(max_tries: u32, retry_wait: Duration) -> Self {
        Self {
            max_tries,
            retry_wait,
            enable_retry: true,
            retry_read_only: true,
        }
    }

    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    pub fn with_enable_retry(mut self, enable_retry: bool) -> Self {
        self.enable_retry = enable_retry;
        self
    }

    pub fn with_retry_read_only(mut self, retry_read_only: bool) -> Self {
        self.retry_read_only = retry_read_only;
        self
    }

    /// Attempt budget; never less than one attempt.
    pub fn max_tries(&self) -> u32 {
        self.max_tries.max(1)
    }

    pub fn retry_wait(&self) -> Duration {
        self.retry_wait
    }

    pub fn enable_retry(&self) -> bool {
        self.enable_retry
    }

    pub fn retry_read_only(&self) -> bool {
        self.retry_read_only
    }

    pub(crate) fn set_max_tries(&mut self, max_tries: u32) {
        self.max_tries = max_tries;
    }

    pub(crate) fn set_retry_wait(&mut self, retry_wait: Duration) {
        self.retry_wait = retry_wait;
    }

    pub(crate) fn set_enable_retry(&mut self, enable_retry: bool) {
        self.enable_retry = enable_retry;
    }

    pub(crate) fn set_retry_read_only(&mut self, retry_read_only: bool) {
        self.retry_read_only = retry_read_only;
    }
}

impl Default for RetryPolicyConfig {
    /// Three attempts, half a second apart, read-only batches only
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

fn deserialize_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

static GLOBAL_POLICY: Lazy<PolicyHandle> =
    Lazy::new(|| PolicyHandle::new(RetryPolicyConfig::default()));

/// Shared, mutable retry policy
///
/// Cloning the handle shares the underlying policy. Readers always get an
/// immutable snapshot, so a change never affects an `execute` already in
/// progress.
#[derive(Debug, Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<RetryPolicyConfig>>,
}

impl PolicyHandle {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// The process-wide policy used by sessions that were not given their own.
    pub fn global() -> Self {
        GLOBAL_POLICY.clone()
    }

    pub fn snapshot(&self) -> RetryPolicyConfig {
        self.inner.read().clone()
    }

    pub fn set(&self, config: RetryPolicyConfig) {
        tracing::debug!(?config, "retry policy replaced");
        *self.inner.write() = config;
    }

    pub fn update(&self, f: impl FnOnce(&mut RetryPolicyConfig)) {
        let mut guard = self.inner.write();
        f(&mut guard);
        tracing::debug!(config = ?*guard, "retry policy updated");
    }

    /// Whether two handles share the same policy
    pub fn same_as(&self, other: &PolicyHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for PolicyHandle {
    fn default() -> Self {
        Self::global()
    }
}
