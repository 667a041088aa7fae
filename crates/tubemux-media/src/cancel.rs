//! Cooperative cancellation helpers built on `watch` channels.

use std::time::Duration;
use tokio::sync::watch;

/// Resolve once the cancel flag flips to `true`.
///
/// If the sender is dropped without ever signalling, this never resolves.
pub async fn wait_for_cancel(mut cancel_rx: watch::Receiver<bool>) {
    if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `limit`, or forever when no limit is set.
pub(crate) async fn sleep_or_pending(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_on_signal() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_cancel(rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancel not observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_never_cancels() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let outcome = tokio::time::timeout(Duration::from_millis(50), wait_for_cancel(rx)).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let (_tx, rx) = watch::channel(true);
        tokio::time::timeout(Duration::from_millis(50), wait_for_cancel(rx))
            .await
            .expect("pre-set flag not observed");
    }
}
