//! Bounded reconnect loop
//!
//! Re-establishes the socket behind a `ConnectionHandle`, waiting between
//! attempts according to a `BackoffSchedule`.

use std::sync::Arc;

use relink_core::{RelinkError, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::BackoffSchedule;
use crate::handle::ConnectionHandle;
use crate::wait::pause;

/// Configuration for reconnect behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts before giving up
    max_attempts: u32,
    /// Wait before each attempt
    #[serde(rename = "intervals")]
    backoff: BackoffSchedule,
}

impl ReconnectConfig {
    /// Create a new reconnect configuration
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum reconnect attempts (at least one attempt is always made)
    /// * `backoff` - Wait before each attempt
    pub fn new(max_attempts: u32, backoff: BackoffSchedule) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Get the maximum number of reconnect attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Get the backoff schedule
    pub fn backoff(&self) -> &BackoffSchedule {
        &self.backoff
    }
}

impl Default for ReconnectConfig {
    /// One attempt per failover interval
    fn default() -> Self {
        let backoff = BackoffSchedule::failover();
        Self::new(backoff.len() as u32, backoff)
    }
}

/// Reconnection event for monitoring
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectEvent {
    /// A reconnection attempt is starting
    Attempting { attempt: u32, max_attempts: u32 },
    /// A reconnection attempt succeeded
    Succeeded { attempts_taken: u32, generation: u64 },
    /// A reconnection attempt failed
    Failed { attempt: u32, error: String },
    /// All reconnection attempts exhausted
    Exhausted { total_attempts: u32 },
}

/// Callback notified of every `ReconnectEvent`
pub type ReconnectObserver = Arc<dyn Fn(&ReconnectEvent) + Send + Sync>;

/// Performs the reconnect handshake with bounded attempts
#[derive(Clone, Default)]
pub struct ReconnectManager {
    config: ReconnectConfig,
    observer: Option<ReconnectObserver>,
}

impl ReconnectManager {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            observer: None,
        }
    }

    /// Register a callback for reconnect events
    pub fn with_observer(mut self, observer: ReconnectObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    /// Re-establish the connection behind `handle`.
    ///
    /// Waits `backoff.delay(n)` before attempt `n`, then asks the driver to
    /// reconnect. On success the handle's generation is advanced and
    /// returned. After `max_attempts` failures the last driver error is
    /// wrapped in `ReconnectExhausted`. Cancelling `cancel` aborts the loop
    /// with `Closed`.
    pub async fn reconnect(
        &self,
        handle: &mut ConnectionHandle,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let max_attempts = self.config.max_attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            self.emit(ReconnectEvent::Attempting {
                attempt: attempt + 1,
                max_attempts,
            });
            pause(self.config.backoff().delay(attempt), cancel).await?;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RelinkError::Closed),
                outcome = handle.connection().reconnect() => outcome,
            };

            match outcome {
                Ok(()) => {
                    let generation = handle.advance_generation();
                    tracing::info!(
                        attempts = attempt + 1,
                        generation,
                        driver = handle.connection().driver_name(),
                        "reconnected"
                    );
                    self.emit(ReconnectEvent::Succeeded {
                        attempts_taken: attempt + 1,
                        generation,
                    });
                    return Ok(generation);
                }
                Err(error) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %error,
                        "reconnect attempt failed"
                    );
                    self.emit(ReconnectEvent::Failed {
                        attempt: attempt + 1,
                        error: error.to_string(),
                    });
                    last_error = Some(error);
                }
            }
        }

        tracing::error!(max_attempts, "reconnect attempts exhausted");
        self.emit(ReconnectEvent::Exhausted {
            total_attempts: max_attempts,
        });
        let source = last_error
            .unwrap_or_else(|| RelinkError::Connection("no reconnect attempt was made".into()));
        Err(RelinkError::ReconnectExhausted {
            attempts: max_attempts,
            source: Box::new(source),
        })
    }

    fn emit(&self, event: ReconnectEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }
}

impl std::fmt::Debug for ReconnectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectManager")
            .field("config", &self.config)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}
