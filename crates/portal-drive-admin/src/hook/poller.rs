//! Periodic status refresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{IntegrationHook, IntegrationSnapshot};

/// Re-runs [`IntegrationHook::refresh`] every `period` and publishes the
/// latest snapshot. Only reads; never repairs anything.
pub struct StatusPoller {
    cancel: CancellationToken,
    snapshots: watch::Receiver<Option<IntegrationSnapshot>>,
}

impl StatusPoller {
    /// Start polling. The first refresh happens immediately.
    pub fn spawn(hook: Arc<IntegrationHook>, period: Duration, audit_limit: usize) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(None);
        tokio::spawn(run_poll_loop(hook, period, audit_limit, tx, cancel.clone()));
        Self { cancel, snapshots: rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<IntegrationSnapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<IntegrationSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll_loop(
    hook: Arc<IntegrationHook>,
    period: Duration,
    audit_limit: usize,
    tx: watch::Sender<Option<IntegrationSnapshot>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("status poller stopped");
                break;
            }

            _ = ticker.tick() => {
                let snapshot = tokio::select! {
                    _ = cancel.cancelled() => break,
                    snapshot = hook.refresh(audit_limit) => snapshot,
                };
                if tx.send(Some(snapshot)).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::DriveAction;
    use crate::error::{PortalError, PortalResult};
    use crate::hook::DriveFunctions;
    use crate::provisioning::ProvisioningSummary;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers ping only; counts the calls.
    #[derive(Default)]
    struct CountingPing {
        pings: AtomicUsize,
    }

    #[async_trait]
    impl DriveFunctions for CountingPing {
        async fn invoke(&self, action: &DriveAction) -> PortalResult<Value> {
            match action {
                DriveAction::Ping => {
                    self.pings.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"success": false, "error": {"kind": "notConfigured", "message": "none"}}))
                }
                DriveAction::Audit { .. } => Ok(json!([])),
                other => Err(PortalError::Internal(format!("unexpected {}", other.name()))),
            }
        }

        async fn create_shared_drives(&self) -> PortalResult<ProvisioningSummary> {
            Err(PortalError::Internal("unexpected".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_on_every_tick_until_stopped() {
        let functions = Arc::new(CountingPing::default());
        let hook = Arc::new(IntegrationHook::new(functions.clone()));
        let poller = StatusPoller::spawn(hook, Duration::from_secs(30), 10);
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert!(poller.latest().is_some());
        assert_eq!(functions.pings.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(functions.pings.load(Ordering::SeqCst), 3);

        poller.stop();
        assert!(poller.is_stopped());
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(functions.pings.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_stops_it() {
        let functions = Arc::new(CountingPing::default());
        let hook = Arc::new(IntegrationHook::new(functions.clone()));
        let poller = StatusPoller::spawn(hook, Duration::from_secs(10), 10);
        let mut rx = poller.subscribe();
        rx.changed().await.unwrap();
        drop(poller);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(functions.pings.load(Ordering::SeqCst), 1);
    }
}
