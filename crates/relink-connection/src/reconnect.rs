//! Reconnect with a fixed failover backoff schedule
//!
//! This module re-establishes a dead connection, waiting between attempts
//! according to a fixed schedule and giving up after a bounded number of
//! attempts.
//!
//! # Example
//!
//! ```ignore
//! use relink_connection::reconnect::{BackoffSchedule, ReconnectConfig, ReconnectManager};
//!
//! let config = ReconnectConfig::new(7, BackoffSchedule::failover());
//! let manager = ReconnectManager::new(config);
//!
//! // Returns the new connection generation
//! let generation = manager.reconnect(&mut handle, &cancel).await?;
//! ```

mod backoff;
mod manager;


pub use backoff::BackoffSchedule;
pub use manager::{ReconnectConfig, ReconnectEvent, ReconnectManager, ReconnectObserver};
