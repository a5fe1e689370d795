//! Per-asset deposit orchestration.
//!
//! Drives the deposit lifecycle for one asset at a time:
//! address generation → detection polling → confirmation tracking → mint.
//! Each asset owns one [`DepositRecord`] and at most one active poll task.
//!
//! ## Cancellation contract
//!
//! The poll task for an asset is cancelled and replaced when:
//! - the selected asset changes ([`DepositOrchestrator::select_asset`]),
//! - the session is torn down (epoch change observed at the next tick),
//! - the deposit reaches the `ready` terminal state.
//!
//! Ticks are strictly serialized per asset: the next probe starts only after
//! the previous one has completed, so a slow remote call skips ticks rather
//! than queueing them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ckf_common::{
    Asset, DepositStatus, DepositStatusReport, IsoDetails, RecordStatus, TransactionKind,
    UserContribution,
};

use crate::busy::BusyGuard;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::history::{HistoryStore, RecordPatch};
use crate::notify::NotificationDispatcher;
use crate::rpc::{AuthError, DepositService};
use crate::session::{Channel, SessionManager};
use crate::storage::KvStore;

/// Storage key for the asset → last-known deposit address map.
const ADDRESS_MAP_KEY: &str = "deposit_addresses";

/// Mutable per-asset deposit state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRecord {
    pub asset: Asset,
    /// Replaced, never appended to, on regeneration.
    pub address: Option<String>,
    pub status: DepositStatus,
    pub confirmations: u32,
    pub required_confirmations: u32,
    /// Deposited amount in base units.
    pub amount: u128,
    pub tx_hash: Option<String>,
}

impl DepositRecord {
    fn new(asset: Asset) -> Self {
        Self {
            asset,
            address: None,
            status: DepositStatus::Idle,
            confirmations: 0,
            required_confirmations: 0,
            amount: 0,
            tx_hash: None,
        }
    }
}

/// Status transition published to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub asset: Asset,
    pub status: DepositStatus,
    pub confirmations: u32,
    pub required_confirmations: u32,
    pub amount: u128,
}

/// USD valuation collaborator for deposit amounts.
pub trait PriceOracle: Send + Sync {
    /// USD price of one whole unit of the asset.
    fn usd_price(&self, asset: Asset) -> Decimal;
}

/// Fixed reference prices; swap in a live oracle where accuracy matters.
pub struct FixedPriceOracle;

impl PriceOracle for FixedPriceOracle {
    fn usd_price(&self, asset: Asset) -> Decimal {
        match asset {
            Asset::Btc => Decimal::new(68_500, 0),
            Asset::Eth => Decimal::new(3_200, 0),
            Asset::UsdcEth => Decimal::ONE,
        }
    }
}

/// Per-asset deposit state machine and poll-task owner.
pub struct DepositOrchestrator {
    session: Arc<SessionManager>,
    service: Arc<dyn DepositService>,
    history: Arc<HistoryStore>,
    notify: Arc<NotificationDispatcher>,
    oracle: Arc<dyn PriceOracle>,
    store: Arc<dyn KvStore>,
    records: DashMap<Asset, DepositRecord>,
    selected: RwLock<Option<Asset>>,
    iso_details: RwLock<Option<IsoDetails>>,
    contribution: RwLock<Option<UserContribution>>,
    poll_tasks: Mutex<HashMap<Asset, JoinHandle<()>>>,
    status_tx: watch::Sender<Option<DepositEvent>>,
    loading: Arc<AtomicBool>,
    last_error: RwLock<Option<String>>,
    status_poll_interval: Duration,
    detect_poll_interval: Duration,
}

impl DepositOrchestrator {
    pub fn new(
        session: Arc<SessionManager>,
        service: Arc<dyn DepositService>,
        history: Arc<HistoryStore>,
        notify: Arc<NotificationDispatcher>,
        store: Arc<dyn KvStore>,
        config: &ClientConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(None);
        Self {
            session,
            service,
            history,
            notify,
            oracle: Arc::new(FixedPriceOracle),
            store,
            records: DashMap::new(),
            selected: RwLock::new(None),
            iso_details: RwLock::new(None),
            contribution: RwLock::new(None),
            poll_tasks: Mutex::new(HashMap::new()),
            status_tx,
            loading: Arc::new(AtomicBool::new(false)),
            last_error: RwLock::new(None),
            status_poll_interval: config.status_poll_interval(),
            detect_poll_interval: config.detect_poll_interval(),
        }
    }

    /// Replace the USD valuation collaborator.
    pub fn with_price_oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    // =========================================================================
    // Deposit lifecycle operations
    // =========================================================================

    /// Generate a fresh deposit address for the asset.
    ///
    /// Any cached address for the asset is invalidated before the remote
    /// call, so the old address is never reachable once the new one is
    /// stored. If the session changes while the call is in flight the result
    /// is discarded rather than applied.
    pub async fn generate_deposit_address(&self, asset: Asset) -> Result<String, ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        *self.selected.write() = Some(asset);
        self.notify.reset_asset(asset);

        // Stale cached address must be gone before the fresh one is stored.
        self.invalidate_cached_address(asset)?;
        self.records.insert(asset, {
            let mut record = DepositRecord::new(asset);
            record.status = DepositStatus::Pending;
            record
        });
        self.emit(asset);

        match self.service.generate_deposit_address(asset).await {
            Ok(address) => {
                if !self.session.is_current(&channel) {
                    debug!(asset = %asset, "Session changed during address generation, result discarded");
                    return Ok(address);
                }
                {
                    let mut record = self.record_mut(asset);
                    record.address = Some(address.clone());
                    record.status = DepositStatus::Idle;
                }
                self.store_cached_address(asset, &address)?;
                self.emit(asset);
                info!(asset = %asset, address = %address, "Deposit address generated");
                Ok(address)
            }
            Err(err) => {
                self.record_failure(asset, "Failed to generate deposit address. Please try again.");
                Err(err.into())
            }
        }
    }

    /// One detection probe for the asset's deposit address.
    ///
    /// Requires a previously generated address. When the remote reports a
    /// transaction, its hash is normalized to a single string, recorded in
    /// the history, and an immediate status check follows.
    pub async fn monitor_deposits(&self, asset: Asset) -> Result<Option<String>, ClientError> {
        let channel = self.require_channel()?;
        if self.record(asset).address.is_none() {
            return Err(ClientError::not_found(format!(
                "no deposit address for {}; generate one first",
                asset
            )));
        }

        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();
        *self.selected.write() = Some(asset);
        self.set_status(asset, DepositStatus::Detecting);

        match self.service.monitor_deposits(asset).await {
            Ok(Some(value)) => {
                if !self.session.is_current(&channel) {
                    debug!(asset = %asset, "Session changed during detection, result discarded");
                    return Ok(None);
                }
                // The monitoring backend may wrap the hash in a one-element
                // sequence; collapse it before it reaches any state.
                let Some(hash) = value.normalize() else {
                    return Ok(None);
                };
                {
                    let mut record = self.record_mut(asset);
                    record.tx_hash = Some(hash.clone());
                    record.status = DepositStatus::Detecting;
                }
                self.history.add_record(
                    TransactionKind::Deposit,
                    asset,
                    0,
                    Some(hash.clone()),
                    RecordStatus::Detecting,
                )?;
                self.notify.transaction_added(TransactionKind::Deposit, asset, 0);
                self.notify.deposit_status(asset, DepositStatus::Detecting, 0, 0, 0);
                self.emit(asset);
                info!(asset = %asset, tx_hash = %hash, "Deposit detected");

                // Immediate follow-up check under the already-held guard.
                if let Err(err) = self.check_status_against(asset, &hash, &channel).await {
                    warn!(asset = %asset, error = %err, "Initial status check failed");
                }
                Ok(Some(hash))
            }
            Ok(None) => {
                // Nothing detected yet; the caller keeps polling.
                Ok(None)
            }
            Err(err) => {
                self.record_failure(asset, "Failed to monitor deposits. Please try again.");
                Err(err.into())
            }
        }
    }

    /// Copy remote confirmation progress into the deposit record.
    ///
    /// Idempotent: repeated calls with an unchanged remote state yield the
    /// same record and at most one notification per distinct status. On
    /// `ready` the caller's aggregate contribution is refreshed once and the
    /// asset's poll task is cancelled.
    pub async fn check_deposit_status(
        &self,
        asset: Asset,
        tx_hash: &str,
    ) -> Result<DepositStatusReport, ClientError> {
        if tx_hash.is_empty() {
            return Err(ClientError::not_found(
                "no transaction hash; wait for a deposit to be detected",
            ));
        }
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();
        self.check_status_against(asset, tx_hash, &channel).await
    }

    /// Status check without its own loading guard; callers already holding
    /// one (the detection follow-up) use this so the flag spans the whole
    /// operation.
    async fn check_status_against(
        &self,
        asset: Asset,
        tx_hash: &str,
        channel: &Channel,
    ) -> Result<DepositStatusReport, ClientError> {
        match self.service.check_deposit_status(asset, tx_hash).await {
            Ok(report) => {
                if !self.session.is_current(channel) {
                    debug!(asset = %asset, "Session changed during status check, result discarded");
                    return Ok(report);
                }
                self.apply_report(asset, tx_hash, report).await?;
                Ok(report)
            }
            Err(err) => {
                // Read-only call: surface the error, leave the record as-is.
                *self.last_error.write() =
                    Some("Failed to check deposit status. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Mint chain-key tokens against the selected asset's confirmed deposit.
    pub async fn mint_ck_tokens(&self, amount: u128) -> Result<bool, ClientError> {
        let asset = self
            .selected_asset()
            .ok_or_else(|| ClientError::not_found("no asset selected"))?;
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();
        self.set_status(asset, DepositStatus::Pending);

        match self.service.mint_ck_token(asset, amount).await {
            Ok(true) => {
                if !self.session.is_current(&channel) {
                    debug!(asset = %asset, "Session changed during mint, result discarded");
                    return Ok(true);
                }
                {
                    let mut record = self.record_mut(asset);
                    record.amount = 0;
                    record.status = DepositStatus::Idle;
                }
                self.emit(asset);
                self.history.add_record(
                    TransactionKind::Mint,
                    asset,
                    amount,
                    None,
                    RecordStatus::Completed,
                )?;
                self.notify.transaction_added(TransactionKind::Mint, asset, amount);
                info!(asset = %asset, amount, "Tokens minted");
                Ok(true)
            }
            Ok(false) => {
                self.record_failure(asset, "Failed to mint tokens. Please try again.");
                Ok(false)
            }
            Err(err) => {
                self.record_failure(asset, "Failed to mint tokens. Please try again.");
                Err(err.into())
            }
        }
    }

    /// Select an asset, clearing all per-asset transient fields.
    ///
    /// Cancels any running poll tasks; transaction records are untouched.
    pub fn select_asset(&self, asset: Asset) {
        self.stop_all_polling();
        *self.selected.write() = Some(asset);
        self.records.insert(asset, DepositRecord::new(asset));
        self.notify.reset_asset(asset);
        self.emit(asset);
        debug!(asset = %asset, "Asset selected");
    }

    /// Reset the selected asset's deposit cycle without touching records.
    pub fn reset_deposit(&self) {
        let Some(asset) = self.selected_asset() else {
            return;
        };
        self.stop_polling(asset);
        self.records.insert(asset, DepositRecord::new(asset));
        self.notify.reset_asset(asset);
        self.emit(asset);
        debug!(asset = %asset, "Deposit state reset");
    }

    // =========================================================================
    // Sale round details
    // =========================================================================

    /// Fetch and cache the current sale-round details.
    pub async fn get_iso_details(&self) -> Result<IsoDetails, ClientError> {
        self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();
        match self.service.get_iso_details().await {
            Ok(details) => {
                *self.iso_details.write() = Some(details.clone());
                Ok(details)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to get ISO details. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Fetch and cache the caller's aggregate contribution.
    pub async fn get_user_contribution(&self) -> Result<UserContribution, ClientError> {
        self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();
        match self.service.get_user_contribution().await {
            Ok(contribution) => {
                *self.contribution.write() = Some(contribution.clone());
                Ok(contribution)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to get user contribution. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Start the recurring poll task for an asset, replacing any prior one.
    ///
    /// While no transaction hash is known the task probes for detection on
    /// the slower interval; once a hash exists it checks confirmation status
    /// on the faster interval. The task exits on `ready`, on session epoch
    /// change, and when aborted by [`stop_polling`](Self::stop_polling).
    pub fn start_polling(self: Arc<Self>, asset: Asset) {
        self.stop_polling(asset);
        let epoch = self.session.epoch();
        let this = Arc::clone(&self);

        let task = tokio::spawn(async move {
            debug!(asset = %asset, epoch, "Poll task started");
            loop {
                let record = this.record(asset);
                if record.status == DepositStatus::Ready {
                    break;
                }
                let interval = if record.tx_hash.is_some() {
                    this.status_poll_interval
                } else {
                    this.detect_poll_interval
                };
                tokio::time::sleep(interval).await;

                if this.session.epoch() != epoch {
                    debug!(asset = %asset, "Session changed, poll task exiting");
                    break;
                }

                // The awaits below serialize ticks: a tick that would overlap
                // an outstanding probe simply does not happen.
                let result = match this.record(asset).tx_hash.clone() {
                    Some(hash) => this.check_deposit_status(asset, &hash).await.map(|_| ()),
                    None => this.monitor_deposits(asset).await.map(|_| ()),
                };
                if let Err(err) = result {
                    warn!(asset = %asset, error = %err, "Poll tick failed");
                }
            }
            debug!(asset = %asset, "Poll task finished");
        });

        self.poll_tasks.lock().insert(asset, task);
    }

    /// Cancel the poll task for an asset, if any.
    pub fn stop_polling(&self, asset: Asset) {
        if let Some(task) = self.poll_tasks.lock().remove(&asset) {
            task.abort();
            debug!(asset = %asset, "Poll task cancelled");
        }
    }

    /// Cancel every poll task (asset change, session teardown).
    pub fn stop_all_polling(&self) {
        let mut tasks = self.poll_tasks.lock();
        for (asset, task) in tasks.drain() {
            task.abort();
            debug!(asset = %asset, "Poll task cancelled");
        }
    }

    /// Whether a live poll task exists for the asset.
    pub fn is_polling(&self, asset: Asset) -> bool {
        self.poll_tasks
            .lock()
            .get(&asset)
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    // =========================================================================
    // Read state
    // =========================================================================

    /// Snapshot of the asset's deposit record.
    pub fn record(&self, asset: Asset) -> DepositRecord {
        self.records
            .get(&asset)
            .map(|r| r.clone())
            .unwrap_or_else(|| DepositRecord::new(asset))
    }

    pub fn selected_asset(&self) -> Option<Asset> {
        *self.selected.read()
    }

    pub fn iso_details(&self) -> Option<IsoDetails> {
        self.iso_details.read().clone()
    }

    pub fn contribution(&self) -> Option<UserContribution> {
        self.contribution.read().clone()
    }

    /// Last-known deposit address for the asset from durable storage.
    pub fn cached_address(&self, asset: Asset) -> Option<String> {
        self.load_address_map().remove(asset.id())
    }

    /// USD value of a base-unit amount via the injected price oracle.
    pub fn estimated_usd_value(&self, asset: Asset, base_units: u128) -> Decimal {
        asset.to_decimal(base_units) * self.oracle.usd_price(asset)
    }

    /// Observe status transitions.
    pub fn subscribe(&self) -> watch::Receiver<Option<DepositEvent>> {
        self.status_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Last error message, retained until the next attempt clears it.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_channel(&self) -> Result<Channel, ClientError> {
        self.session
            .channel()
            .ok_or_else(|| ClientError::Auth(AuthError::new("session is not authenticated")))
    }

    async fn apply_report(
        &self,
        asset: Asset,
        tx_hash: &str,
        report: DepositStatusReport,
    ) -> Result<(), ClientError> {
        let previous = self.record(asset).status;
        {
            let mut record = self.record_mut(asset);
            record.status = report.status;
            record.confirmations = report.confirmations;
            record.required_confirmations = report.required_confirmations;
            record.amount = report.amount;
        }

        if let Some(existing) = self.history.find_by_tx_hash(tx_hash) {
            self.history.update_record(
                existing.id,
                RecordPatch::status(report.status.into()).with_amount(report.amount),
            )?;
        }

        self.notify.deposit_status(
            asset,
            report.status,
            report.confirmations,
            report.required_confirmations,
            report.amount,
        );
        self.emit(asset);

        let became_ready = report.status == DepositStatus::Ready && previous != DepositStatus::Ready;
        if became_ready {
            info!(asset = %asset, amount = report.amount, "Deposit ready");
            match self.service.get_user_contribution().await {
                Ok(contribution) => *self.contribution.write() = Some(contribution),
                Err(err) => warn!(asset = %asset, error = %err, "Contribution refresh failed"),
            }
            // Prior balance is not tracked locally; report the delta from zero.
            self.notify.portfolio_update(asset, 0, report.amount);
            // Abort last: when this runs inside the poll task itself, the
            // abort lands at the task's next await point.
            self.stop_polling(asset);
        }
        Ok(())
    }

    fn record_mut(&self, asset: Asset) -> dashmap::mapref::one::RefMut<'_, Asset, DepositRecord> {
        self.records
            .entry(asset)
            .or_insert_with(|| DepositRecord::new(asset))
    }

    fn set_status(&self, asset: Asset, status: DepositStatus) {
        self.record_mut(asset).status = status;
        self.emit(asset);
    }

    fn record_failure(&self, asset: Asset, message: &str) {
        self.set_status(asset, DepositStatus::Failed);
        *self.last_error.write() = Some(message.to_string());
        warn!(asset = %asset, message, "Deposit operation failed");
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn emit(&self, asset: Asset) {
        let record = self.record(asset);
        self.status_tx.send_replace(Some(DepositEvent {
            asset,
            status: record.status,
            confirmations: record.confirmations,
            required_confirmations: record.required_confirmations,
            amount: record.amount,
        }));
    }

    fn load_address_map(&self) -> HashMap<String, String> {
        match self.store.get(ADDRESS_MAP_KEY) {
            Ok(Some(text)) => serde_json::from_str(&text).unwrap_or_default(),
            _ => HashMap::new(),
        }
    }

    fn save_address_map(&self, map: &HashMap<String, String>) -> Result<(), ClientError> {
        let text = serde_json::to_string(map)
            .map_err(|e| crate::storage::StorageError::Serde(e.to_string()))?;
        self.store.put(ADDRESS_MAP_KEY, &text)?;
        Ok(())
    }

    fn invalidate_cached_address(&self, asset: Asset) -> Result<(), ClientError> {
        let mut map = self.load_address_map();
        if map.remove(asset.id()).is_some() {
            debug!(asset = %asset, "Cached deposit address invalidated");
            self.save_address_map(&map)?;
        }
        Ok(())
    }

    fn store_cached_address(&self, asset: Asset, address: &str) -> Result<(), ClientError> {
        let mut map = self.load_address_map();
        map.insert(asset.id().to_string(), address.to_string());
        self.save_address_map(&map)
    }
}
