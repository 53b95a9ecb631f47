//! Cancellable waits

use std::time::Duration;

use relink_core::{RelinkError, Result};
use tokio_util::sync::CancellationToken;

/// Sleep for `duration`, failing with `Closed` as soon as `cancel` fires.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RelinkError::Closed);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelinkError::Closed),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
