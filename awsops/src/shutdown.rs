use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Sleep for `delay` unless shutdown is (or becomes) requested first.
/// Returns false when woken by shutdown.
pub async fn sleep_unless_stopped(delay: Duration, shutdown: &watch::Receiver<bool>) -> bool {
    let mut rx = shutdown.clone();
    if *rx.borrow_and_update() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        Ok(()) = rx.changed() => !*rx.borrow(),
    }
}

/// Receiver that flips to `true` on the first Ctrl-C. Holders check it
/// between calls; in-flight requests are left to finish.
pub fn ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c: stopping after in-flight calls");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "could not listen for ctrl-c");
                // the sender must outlive the receivers or `changed()` errors
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_delay_without_shutdown() {
        let (_tx, rx) = watch::channel(false);
        assert!(sleep_unless_stopped(Duration::from_millis(1), &rx).await);
    }

    #[tokio::test]
    async fn already_stopped_returns_at_once() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let slept = tokio::time::timeout(
            Duration::from_secs(5),
            sleep_unless_stopped(Duration::from_secs(3600), &rx),
        )
        .await
        .unwrap();
        assert!(!slept);
    }

    #[tokio::test]
    async fn shutdown_cuts_the_sleep_short() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let slept = tokio::time::timeout(
            Duration::from_secs(5),
            sleep_unless_stopped(Duration::from_secs(3600), &rx),
        )
        .await
        .unwrap();
        assert!(!slept);
    }
}
