//! Retry policy configuration
//!
//! The retry policy is process-wide and may be changed at any time; sessions
//! take a snapshot of it at the start of every `execute`. Reconnect backoff is
//! configured separately because it governs how fast a dead socket is
//! re-established, not how often a statement is re-issued.
//!
//! # Example
//!
//! ```ignore
//! use relink_connection::config::{PolicyHandle, RelinkConfig};
//!
//! let config = RelinkConfig::from_toml_str(r#"
//!     [retry]
//!     max_tries = 5
//!     retry_wait_seconds = 0.25
//! "#)?;
//! PolicyHandle::global().set(config.retry.clone());
//! ```

mod file;
mod policy;

#[cfg(test)]
mod tests;

pub use file::{ConfigError, RelinkConfig};
pub use policy::{PolicyHandle, RetryPolicyConfig};
