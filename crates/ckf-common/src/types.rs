//! Domain types shared between the deposit orchestrator and the trading session.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error for an unrecognized asset identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown asset: {0}")]
pub struct ParseAssetError(String);

/// Identity handle of an authenticated caller.
///
/// Opaque to the client; assigned by the identity provider and used as the
/// owner key for orders and contributions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Native assets accepted for deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "USDC-ETH")]
    UsdcEth,
}

impl Asset {
    /// All supported assets, in display order.
    pub fn all() -> &'static [Asset] {
        &[Asset::Btc, Asset::Eth, Asset::UsdcEth]
    }

    /// Stable identifier used on the wire and as a storage key.
    pub fn id(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::UsdcEth => "USDC-ETH",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Asset::Btc => "Bitcoin",
            Asset::Eth => "Ethereum",
            Asset::UsdcEth => "USDC (Ethereum)",
        }
    }

    /// Ticker symbol used in formatted amounts.
    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
            Asset::UsdcEth => "USDC",
        }
    }

    /// Brand color hint for consumers that render asset badges.
    pub fn color_hint(&self) -> &'static str {
        match self {
            Asset::Btc => "#F7931A",
            Asset::Eth => "#627EEA",
            Asset::UsdcEth => "#2775CA",
        }
    }

    /// Number of base-unit decimals on the native network.
    pub fn decimals(&self) -> u32 {
        match self {
            Asset::Btc => 8,
            Asset::Eth => 18,
            Asset::UsdcEth => 6,
        }
    }

    /// Decimal places shown when formatting an amount for display.
    pub fn display_scale(&self) -> u32 {
        match self {
            Asset::Btc => 8,
            Asset::Eth => 6,
            Asset::UsdcEth => 2,
        }
    }

    /// Convert raw base units to a whole-asset decimal value.
    pub fn to_decimal(&self, base_units: u128) -> Decimal {
        Decimal::from_i128_with_scale(base_units as i128, self.decimals())
    }

    /// Format raw base units as a display string, e.g. `"1.00000000 BTC"`.
    pub fn format_base_units(&self, base_units: u128) -> String {
        let value = self.to_decimal(base_units).round_dp(self.display_scale());
        format!("{} {}", value, self.symbol())
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Asset {
    type Err = ParseAssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(Asset::Btc),
            "ETH" => Ok(Asset::Eth),
            "USDC-ETH" => Ok(Asset::UsdcEth),
            _ => Err(ParseAssetError(s.to_string())),
        }
    }
}

/// Order side for trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle state of an order on the remote book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
}

/// A trading pair identifier, e.g. `"ckBTC-ICP"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenPair(String);

impl TokenPair {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base token symbol (left of the dash), if well-formed.
    pub fn base(&self) -> Option<&str> {
        self.0.split_once('-').map(|(base, _)| base)
    }

    /// Quote token symbol (right of the dash), if well-formed.
    pub fn quote(&self) -> Option<&str> {
        self.0.split_once('-').map(|(_, quote)| quote)
    }
}

impl std::fmt::Display for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-through copy of an order owned by the remote order-book service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique id assigned by the remote service.
    pub id: u64,
    /// Principal that placed the order.
    pub owner: Principal,
    /// Trading pair.
    pub pair: TokenPair,
    /// Buy or sell.
    pub side: Side,
    /// Limit price in quote units.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Total size in base units.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    /// Portion already matched.
    #[serde(with = "rust_decimal::serde::str")]
    pub filled: Decimal,
    /// Remote lifecycle state.
    pub status: OrderStatus,
    /// Placement time reported by the service.
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of one side-aggregated order book, replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookView {
    pub buy_orders: Vec<Order>,
    pub sell_orders: Vec<Order>,
    /// Buy/sell markup applied by the trading service, sourced from volatility.
    #[serde(with = "rust_decimal::serde::str")]
    pub spread: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub last_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    pub volatility: Decimal,
}

/// Per-asset deposit lifecycle state.
///
/// `Idle → Pending → Detecting → Confirming → Ready`, with `Failed`
/// reachable from every non-terminal state on a remote-call rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    /// No deposit cycle in progress.
    #[default]
    #[serde(rename = "none")]
    Idle,
    /// A remote call for this cycle is in flight.
    Pending,
    /// Waiting for an inbound transaction to appear.
    Detecting,
    /// Transaction observed, confirmations accumulating.
    Confirming,
    /// Finality reached; terminal for this cycle.
    Ready,
    /// A deposit-affecting remote call was rejected.
    Failed,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Idle => "none",
            DepositStatus::Pending => "pending",
            DepositStatus::Detecting => "detecting",
            DepositStatus::Confirming => "confirming",
            DepositStatus::Ready => "ready",
            DepositStatus::Failed => "failed",
        }
    }

    /// True once the current deposit cycle can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositStatus::Ready | DepositStatus::Failed)
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction hash as returned by the monitoring service.
///
/// Some backends wrap the optional hash in a single-element sequence;
/// `normalize` collapses either shape to one string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxHashValue {
    Single(String),
    Sequence(Vec<String>),
}

impl TxHashValue {
    /// Collapse to a single hash string. Empty sequences yield `None`.
    pub fn normalize(self) -> Option<String> {
        match self {
            TxHashValue::Single(hash) => Some(hash),
            TxHashValue::Sequence(hashes) => hashes.into_iter().next(),
        }
    }
}

/// Result of a deposit status check against the monitoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositStatusReport {
    pub status: DepositStatus,
    pub confirmations: u32,
    #[serde(rename = "required")]
    pub required_confirmations: u32,
    /// Deposited amount in base units.
    pub amount: u128,
}

/// Static details of the current sale round, owned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsoDetails {
    pub start_date: i64,
    pub end_date: i64,
    pub min_contribution: Vec<(Asset, u128)>,
    pub max_contribution: Vec<(Asset, u128)>,
}

/// The caller's aggregate contribution across all assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContribution {
    pub deposits: Vec<(Asset, u128)>,
    pub total_value: u128,
    pub estimated_allocation: u128,
}

/// Kind of a locally recorded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Mint,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Mint => write!(f, "mint"),
        }
    }
}

/// Status stored on a local transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Detecting,
    Confirming,
    Ready,
    Completed,
    Failed,
}

impl From<DepositStatus> for RecordStatus {
    fn from(status: DepositStatus) -> Self {
        match status {
            DepositStatus::Idle | DepositStatus::Pending => RecordStatus::Pending,
            DepositStatus::Detecting => RecordStatus::Detecting,
            DepositStatus::Confirming => RecordStatus::Confirming,
            DepositStatus::Ready => RecordStatus::Ready,
            DepositStatus::Failed => RecordStatus::Failed,
        }
    }
}

/// Durable local record of a user transaction.
///
/// Ids are client-generated and monotonic; records are mutated in place by
/// id and never duplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: u64,
    pub kind: TransactionKind,
    pub asset: Asset,
    /// Amount in base units; 0 until the deposit amount is known.
    pub amount: u128,
    pub tx_hash: Option<String>,
    pub status: RecordStatus,
    /// RFC 3339 creation time.
    pub timestamp: String,
}
