//! Panic containment for handler and subscriber dispatch.
//!
//! A panicking handler must not take down the bus, nor a sibling subscriber
//! running in the same `publish` fan-out. `catch_unwind` only catches a panic
//! on the stack that's unwinding through it, which for a `Future` means the
//! wrapper has to span every poll, not just the call that constructs it — so
//! this uses `futures::FutureExt::catch_unwind` rather than
//! `std::panic::catch_unwind` around an `async move` block.

use crate::types::Error;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Run a future to completion, converting a panic into `Err(Error::Internal)`
/// instead of propagating the unwind to the caller.
pub async fn with_recovery_async<F, T>(operation_name: &str, fut: F) -> Result<T, Error>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(value) => Ok(value),
        Err(panic_payload) => {
            let panic_msg = extract_panic_message(&panic_payload);
            tracing::error!(
                operation = operation_name,
                panic = %panic_msg,
                "panic recovered during dispatch"
            );
            Err(Error::internal(format!(
                "panic in {operation_name}: {panic_msg}"
            )))
        }
    }
}

fn extract_panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (no message)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recovers_from_panicking_future() {
        let result = with_recovery_async("test_op", async {
            panic!("boom");
            #[allow(unreachable_code)]
            42
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn passes_through_normal_result() {
        let result = with_recovery_async("test_op", async { 42 }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
