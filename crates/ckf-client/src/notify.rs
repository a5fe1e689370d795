//! Maps state transitions to user-facing alerts.
//!
//! The dispatcher is a stateless mapping from `(event, payload)` to an
//! [`Alert`] rendered through a [`NotificationSink`]. With no sink attached
//! every emit is a silent no-op. Deposit-status alerts are deduplicated so
//! a single status change yields exactly one alert per distinct status per
//! asset.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use ckf_common::{Asset, DepositStatus, TransactionKind};

/// A displayed alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
}

/// Delivery capability for alerts (system tray, desktop notifications, ...).
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, alert: &Alert);
}

/// Stateless event-to-alert mapping with per-asset status dedup.
pub struct NotificationDispatcher {
    sink: Option<Arc<dyn NotificationSink>>,
    last_status: Mutex<HashMap<Asset, DepositStatus>>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink: Some(sink),
            last_status: Mutex::new(HashMap::new()),
        }
    }

    /// Dispatcher with no delivery capability; every emit is a no-op.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            last_status: Mutex::new(HashMap::new()),
        }
    }

    /// Emit a deposit status alert.
    ///
    /// Only `detecting`, `confirming` and `ready` produce alerts. Repeated
    /// emits for the same `(asset, status)` in immediate succession are
    /// suppressed.
    pub fn deposit_status(
        &self,
        asset: Asset,
        status: DepositStatus,
        confirmations: u32,
        required: u32,
        amount: u128,
    ) {
        let alert = match status {
            DepositStatus::Detecting => Alert {
                title: "Deposit Detected".to_string(),
                body: format!(
                    "Your {} deposit has been detected and is waiting for confirmations.",
                    asset.id()
                ),
            },
            DepositStatus::Confirming => Alert {
                title: "Deposit Confirming".to_string(),
                body: format!(
                    "Your {} deposit has {} of {} confirmations.",
                    asset.id(),
                    confirmations,
                    required
                ),
            },
            DepositStatus::Ready => Alert {
                title: "Deposit Confirmed!".to_string(),
                body: format!(
                    "Your deposit of {} has been confirmed and tokens have been minted.",
                    asset.format_base_units(amount)
                ),
            },
            _ => return,
        };

        {
            let mut last = self.last_status.lock();
            if last.get(&asset) == Some(&status) {
                debug!(asset = %asset, status = %status, "Duplicate status alert suppressed");
                return;
            }
            last.insert(asset, status);
        }

        self.deliver(alert);
    }

    /// Emit an alert for a newly recorded transaction.
    pub fn transaction_added(&self, kind: TransactionKind, asset: Asset, amount: u128) {
        self.deliver(Alert {
            title: "Transaction Added to History".to_string(),
            body: format!(
                "Your {} of {} has been added to your transaction history.",
                kind,
                asset.format_base_units(amount)
            ),
        });
    }

    /// Emit an alert for a balance change.
    pub fn portfolio_update(&self, asset: Asset, old_balance: u128, new_balance: u128) {
        self.deliver(Alert {
            title: "Portfolio Updated".to_string(),
            body: format!(
                "Your {} balance has changed from {} to {}.",
                asset.id(),
                asset.format_base_units(old_balance),
                asset.format_base_units(new_balance)
            ),
        });
    }

    /// Forget dedup state for an asset, e.g. when a new deposit cycle starts.
    pub fn reset_asset(&self, asset: Asset) {
        self.last_status.lock().remove(&asset);
    }

    fn deliver(&self, alert: Alert) {
        if let Some(sink) = &self.sink {
            debug!(title = %alert.title, "Alert delivered");
            sink.deliver(&alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PMutex;

    #[derive(Default)]
    struct RecordingSink {
        alerts: PMutex<Vec<Alert>>,
    }

    impl NotificationSink for RecordingSink {
        fn deliver(&self, alert: &Alert) {
            self.alerts.lock().push(alert.clone());
        }
    }

    fn dispatcher() -> (NotificationDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (NotificationDispatcher::new(sink.clone()), sink)
    }

    #[test]
    fn test_detecting_alert_wording() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Detecting, 0, 0, 0);

        let alerts = sink.alerts.lock();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].title, "Deposit Detected");
        assert!(alerts[0].body.contains("BTC"));
    }

    #[test]
    fn test_confirming_alert_shows_progress() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Confirming, 3, 6, 100_000_000);

        let alerts = sink.alerts.lock();
        assert!(alerts[0].body.contains("3 of 6"));
    }

    #[test]
    fn test_ready_alert_formats_amount() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Ready, 6, 6, 100_000_000);

        let alerts = sink.alerts.lock();
        assert!(alerts[0].body.contains("1.00000000 BTC"));
    }

    #[test]
    fn test_duplicate_status_suppressed() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Confirming, 3, 6, 0);
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Confirming, 3, 6, 0);
        assert_eq!(sink.alerts.lock().len(), 1);

        // A distinct status alerts again.
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Ready, 6, 6, 100_000_000);
        assert_eq!(sink.alerts.lock().len(), 2);
    }

    #[test]
    fn test_dedup_is_per_asset() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Detecting, 0, 0, 0);
        dispatcher.deposit_status(Asset::Eth, DepositStatus::Detecting, 0, 0, 0);
        assert_eq!(sink.alerts.lock().len(), 2);
    }

    #[test]
    fn test_idle_and_pending_do_not_alert() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Idle, 0, 0, 0);
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Pending, 0, 0, 0);
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Failed, 0, 0, 0);
        assert!(sink.alerts.lock().is_empty());
    }

    #[test]
    fn test_disabled_dispatcher_is_noop() {
        let dispatcher = NotificationDispatcher::disabled();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Ready, 6, 6, 1);
        dispatcher.transaction_added(TransactionKind::Mint, Asset::Eth, 1);
        dispatcher.portfolio_update(Asset::Btc, 0, 1);
    }

    #[test]
    fn test_reset_asset_allows_renotify() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Detecting, 0, 0, 0);
        dispatcher.reset_asset(Asset::Btc);
        dispatcher.deposit_status(Asset::Btc, DepositStatus::Detecting, 0, 0, 0);
        assert_eq!(sink.alerts.lock().len(), 2);
    }
}
