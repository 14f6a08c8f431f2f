//! Async timeout wrappers and shared timeout constants.

use crate::error::{Result, WireError};
use std::future::Future;
use std::time::Duration;

/// Default deadline for individual transport operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Close a session after this long without inbound bytes
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace period for draining connections on shutdown
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a fallible future under a deadline, mapping expiry to
/// `WireError::Timeout`.
pub async fn with_timeout_error<F, T>(future: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(WireError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expiry_maps_to_timeout_error() {
        let result: Result<()> = with_timeout_error(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            Duration::from_millis(10),
        )
        .await;
        assert!(matches!(result, Err(WireError::Timeout)));
    }

    #[tokio::test]
    async fn completion_passes_through() {
        let result = with_timeout_error(async { Ok(42) }, Duration::from_secs(1)).await;
        assert_eq!(result.unwrap(), 42);
    }
}
