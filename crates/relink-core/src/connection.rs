//! Connection trait consumed by the retry layer

use crate::{Result, Statement, StatementResult};
use async_trait::async_trait;

/// A stateful database connection
///
/// This is the only thing the retry layer needs from a driver. The driver
/// owns the socket; the retry layer decides when to re-establish it and what
/// to re-send afterwards.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mysql", "postgresql")
    fn driver_name(&self) -> &str;

    /// Execute a single statement on the current socket
    async fn execute(&self, statement: &Statement) -> Result<StatementResult>;

    /// Drop the current socket (if any) and open a new one
    ///
    /// Any server-side session state, including an open transaction, is lost.
    async fn reconnect(&self) -> Result<()>;

    /// Check that the server still answers on the current socket
    async fn ping(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
