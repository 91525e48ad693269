//! Cancellation plumbing.
//!
//! Every public operation accepts a [`CancellationToken`] through its
//! options. Provider calls and channel sends are raced against the token,
//! so a cancelled context aborts blocking work with a `Cancelled` error
//! instead of hanging on the backend.

use mnema_core::{MemoryError, Result};
pub use tokio_util::sync::CancellationToken;

/// Fails fast when the context is already cancelled.
pub(crate) fn ensure_active(op: &str, token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(MemoryError::cancelled(op))
    } else {
        Ok(())
    }
}

/// Races `future` against cancellation.
pub(crate) async fn guard<F, T>(op: &str, token: &CancellationToken, future: F) -> Result<T>
where
    F: core::future::Future<Output = Result<T>>,
{
    tokio::select! {
        () = token.cancelled() => Err(MemoryError::cancelled(op)),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn active_token_passes_through() {
        let token = CancellationToken::new();
        assert!(ensure_active("op", &token).is_ok());
        let value = guard("op", &token, async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(ensure_active("op", &token).unwrap_err().is_cancelled());

        let pending = guard("op", &token, async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(0)
        })
        .await;
        assert!(pending.unwrap_err().is_cancelled());
    }
}
