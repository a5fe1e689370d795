//! End-to-end deposit lifecycle tests against in-memory service doubles.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ckf_client::rpc::{AuthError, DepositService, IdentityService, RpcError};
use ckf_client::{
    Alert, ClientConfig, ClientError, DepositOrchestrator, HistoryStore, JsonFileStore, KvStore,
    MemoryStore, NotificationDispatcher, NotificationSink, SessionManager,
};
use ckf_common::{
    Asset, DepositStatus, DepositStatusReport, IsoDetails, Principal, RecordStatus,
    TransactionKind, TxHashValue, UserContribution,
};

struct OkIdentity;

#[async_trait]
impl IdentityService for OkIdentity {
    async fn login(&self) -> Result<Principal, AuthError> {
        Ok(Principal::new("alice"))
    }
    async fn logout(&self) -> Result<(), AuthError> {
        Ok(())
    }
    async fn is_authenticated(&self) -> bool {
        true
    }
}

/// Deposit backend simulating a chain that confirms one block per status
/// check after a deposit has been detected.
struct SimulatedChain {
    required: u32,
    detect_after: AtomicU32,
    checks: AtomicU32,
    contribution_calls: AtomicUsize,
    /// When set, the session is torn down in the middle of the next
    /// status check, before its result is returned.
    disconnect_during_check: Mutex<Option<Arc<SessionManager>>>,
}

impl SimulatedChain {
    fn new(required: u32, detect_after: u32) -> Self {
        Self {
            required,
            detect_after: AtomicU32::new(detect_after),
            checks: AtomicU32::new(0),
            contribution_calls: AtomicUsize::new(0),
            disconnect_during_check: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DepositService for SimulatedChain {
    async fn generate_deposit_address(&self, asset: Asset) -> Result<String, RpcError> {
        Ok(format!("{}-deposit-address", asset.id().to_lowercase()))
    }

    async fn monitor_deposits(&self, _asset: Asset) -> Result<Option<TxHashValue>, RpcError> {
        // Count down the remaining empty probes before the deposit appears.
        let remaining = self.detect_after.load(Ordering::SeqCst);
        if remaining > 0 {
            self.detect_after.store(remaining - 1, Ordering::SeqCst);
            Ok(None)
        } else {
            Ok(Some(TxHashValue::Sequence(vec!["txhash-1".to_string()])))
        }
    }

    async fn check_deposit_status(
        &self,
        _asset: Asset,
        _tx_hash: &str,
    ) -> Result<DepositStatusReport, RpcError> {
        let session = self.disconnect_during_check.lock().take();
        if let Some(session) = session {
            session.disconnect().await;
        }

        let confirmations = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
        let confirmations = confirmations.min(self.required);
        let status = if confirmations >= self.required {
            DepositStatus::Ready
        } else {
            DepositStatus::Confirming
        };
        Ok(DepositStatusReport {
            status,
            confirmations,
            required_confirmations: self.required,
            amount: 100_000_000,
        })
    }

    async fn mint_ck_token(&self, _asset: Asset, _amount: u128) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn get_iso_details(&self) -> Result<IsoDetails, RpcError> {
        Ok(IsoDetails {
            start_date: 1_700_000_000,
            end_date: 1_800_000_000,
            min_contribution: vec![(Asset::Btc, 10_000)],
            max_contribution: vec![(Asset::Btc, 10_000_000_000)],
        })
    }

    async fn get_user_contribution(&self) -> Result<UserContribution, RpcError> {
        self.contribution_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserContribution {
            deposits: vec![(Asset::Btc, 100_000_000)],
            total_value: 68_500,
            estimated_allocation: 685,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    fn titles(&self) -> Vec<String> {
        self.alerts.lock().iter().map(|a| a.title.clone()).collect()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, alert: &Alert) {
        self.alerts.lock().push(alert.clone());
    }
}

struct Harness {
    orchestrator: Arc<DepositOrchestrator>,
    session: Arc<SessionManager>,
    chain: Arc<SimulatedChain>,
    history: Arc<HistoryStore>,
    sink: Arc<RecordingSink>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn harness_with_store(chain: SimulatedChain, store: Arc<dyn KvStore>) -> Harness {
    init_tracing();
    let session = Arc::new(SessionManager::new(Arc::new(OkIdentity)));
    session.connect().await.unwrap();

    let chain = Arc::new(chain);
    let history = Arc::new(HistoryStore::load(store.clone()));
    let sink = Arc::new(RecordingSink::default());
    let notify = Arc::new(NotificationDispatcher::new(sink.clone()));

    let orchestrator = Arc::new(DepositOrchestrator::new(
        session.clone(),
        chain.clone(),
        history.clone(),
        notify,
        store,
        &ClientConfig::default(),
    ));
    Harness {
        orchestrator,
        session,
        chain,
        history,
        sink,
    }
}

async fn harness(chain: SimulatedChain) -> Harness {
    harness_with_store(chain, Arc::new(MemoryStore::new())).await
}

#[tokio::test(start_paused = true)]
async fn btc_deposit_runs_to_ready_under_polling() {
    let h = harness(SimulatedChain::new(3, 1)).await;

    let address = h
        .orchestrator
        .generate_deposit_address(Asset::Btc)
        .await
        .unwrap();
    assert_eq!(address, "btc-deposit-address");

    h.orchestrator.clone().start_polling(Asset::Btc);
    assert!(h.orchestrator.is_polling(Asset::Btc));

    // Two detection probes (10s apart), then one status check per 5s until
    // the third confirmation reaches finality.
    tokio::time::sleep(Duration::from_secs(60)).await;

    let record = h.orchestrator.record(Asset::Btc);
    assert_eq!(record.status, DepositStatus::Ready);
    assert_eq!(record.confirmations, 3);
    assert_eq!(record.amount, 100_000_000);
    assert_eq!(record.tx_hash.as_deref(), Some("txhash-1"));

    // The poll task stopped itself at the terminal status.
    assert!(!h.orchestrator.is_polling(Asset::Btc));

    // Exactly one contribution refresh and one ready alert.
    assert_eq!(h.chain.contribution_calls.load(Ordering::SeqCst), 1);
    let titles = h.sink.titles();
    assert_eq!(
        titles.iter().filter(|t| *t == "Deposit Confirmed!").count(),
        1
    );
    assert_eq!(
        titles.iter().filter(|t| *t == "Deposit Detected").count(),
        1
    );

    // The history record followed the deposit to its terminal status.
    let stored = h.history.find_by_tx_hash("txhash-1").unwrap();
    assert_eq!(stored.status, RecordStatus::Ready);
    assert_eq!(stored.amount, 100_000_000);
}

#[tokio::test]
async fn stale_session_result_is_discarded() {
    let h = harness(SimulatedChain::new(6, 0)).await;
    h.orchestrator
        .generate_deposit_address(Asset::Btc)
        .await
        .unwrap();
    h.orchestrator.monitor_deposits(Asset::Btc).await.unwrap();
    let before = h.orchestrator.record(Asset::Btc);

    // The next status check loses its session mid-flight.
    *h.chain.disconnect_during_check.lock() = Some(h.session.clone());
    let report = h
        .orchestrator
        .check_deposit_status(Asset::Btc, "txhash-1")
        .await
        .unwrap();

    // The remote answered, but nothing was applied locally.
    assert_eq!(report.confirmations, before.confirmations + 1);
    assert_eq!(h.orchestrator.record(Asset::Btc).confirmations, before.confirmations);
}

#[tokio::test]
async fn operations_require_authentication() {
    let h = harness(SimulatedChain::new(3, 0)).await;
    h.session.disconnect().await;

    assert!(matches!(
        h.orchestrator.generate_deposit_address(Asset::Eth).await,
        Err(ClientError::Auth(_))
    ));
    assert!(matches!(
        h.orchestrator.get_iso_details().await,
        Err(ClientError::Auth(_))
    ));
}

#[tokio::test]
async fn mint_and_history_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::open(&path));
        let h = harness_with_store(SimulatedChain::new(3, 0), store).await;
        h.orchestrator
            .generate_deposit_address(Asset::Btc)
            .await
            .unwrap();
        h.orchestrator.mint_ck_tokens(50_000_000).await.unwrap();
        assert_eq!(h.history.len(), 1);
    }

    // A fresh process over the same file sees the mint and the address.
    let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::open(&path));
    let history = HistoryStore::load(store.clone());
    let records = history.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, TransactionKind::Mint);
    assert_eq!(records[0].amount, 50_000_000);
    assert_eq!(records[0].status, RecordStatus::Completed);

    let h = harness_with_store(SimulatedChain::new(3, 0), store).await;
    assert_eq!(
        h.orchestrator.cached_address(Asset::Btc),
        Some("btc-deposit-address".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_stops_polling_at_next_tick() {
    let h = harness(SimulatedChain::new(3, 10)).await;
    h.orchestrator
        .generate_deposit_address(Asset::Btc)
        .await
        .unwrap();
    h.orchestrator.clone().start_polling(Asset::Btc);

    h.session.disconnect().await;
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert!(!h.orchestrator.is_polling(Asset::Btc));
    // No state was produced after teardown.
    assert!(h.history.is_empty());
}

#[tokio::test]
async fn asset_switch_resets_transient_state_and_poller() {
    let h = harness(SimulatedChain::new(3, 0)).await;
    h.orchestrator
        .generate_deposit_address(Asset::Btc)
        .await
        .unwrap();
    h.orchestrator.monitor_deposits(Asset::Btc).await.unwrap();
    h.orchestrator.clone().start_polling(Asset::Btc);
    let recorded = h.history.len();

    h.orchestrator.select_asset(Asset::UsdcEth);

    assert!(!h.orchestrator.is_polling(Asset::Btc));
    assert_eq!(h.orchestrator.selected_asset(), Some(Asset::UsdcEth));
    let record = h.orchestrator.record(Asset::UsdcEth);
    assert_eq!(record.status, DepositStatus::Idle);
    assert!(record.tx_hash.is_none());
    // Durable records are never part of the transient reset.
    assert_eq!(h.history.len(), recorded);
}

#[tokio::test]
async fn iso_details_and_contribution_are_cached() {
    let h = harness(SimulatedChain::new(3, 0)).await;

    assert!(h.orchestrator.iso_details().is_none());
    let details = h.orchestrator.get_iso_details().await.unwrap();
    assert_eq!(h.orchestrator.iso_details(), Some(details));

    let contribution = h.orchestrator.get_user_contribution().await.unwrap();
    assert_eq!(h.orchestrator.contribution(), Some(contribution));
    assert_eq!(h.chain.contribution_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn loading_flag_clears_after_each_operation() {
    let h = harness(SimulatedChain::new(3, 0)).await;
    assert!(!h.orchestrator.is_loading());
    h.orchestrator
        .generate_deposit_address(Asset::Btc)
        .await
        .unwrap();
    assert!(!h.orchestrator.is_loading());
}
