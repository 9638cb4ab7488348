/// Deadlines for store calls
///
/// Every call into the identity store or the relational store is wrapped in
/// [`bounded`]. When the deadline passes, the in-flight future is dropped,
/// which aborts the underlying query, and the caller gets a retryable
/// `TenantError::Storage`.

use crate::error::{TenantError, TenantResult};
use std::future::Future;
use std::time::Duration;

/// Default deadline for a single store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a store operation with a deadline
pub async fn bounded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> TenantResult<T>
where
    F: Future<Output = TenantResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = timeout.as_millis() as u64,
                "Store call exceeded its deadline"
            );
            Err(TenantError::Storage(format!(
                "{} timed out after {}ms",
                operation,
                timeout.as_millis()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let ok: TenantResult<u32> = bounded(Duration::from_secs(1), "op", async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: TenantResult<u32> =
            bounded(Duration::from_secs(1), "op", async { Err(TenantError::DuplicateUser) }).await;
        assert!(matches!(err, Err(TenantError::DuplicateUser)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: TenantResult<()> = bounded(Duration::from_millis(50), "identity.insert", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(TenantError::Storage(msg)) => assert!(msg.contains("identity.insert")),
            other => panic!("expected storage timeout, got {:?}", other),
        }
    }
}
