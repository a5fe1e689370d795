//! Remote service contracts.
//!
//! One explicit typed client interface per remote collaborator, each with
//! fixed method signatures and result/error shapes. The orchestration code
//! only ever sees these traits; `http` provides reqwest-backed
//! implementations and tests substitute in-memory doubles.

pub mod http;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use ckf_common::{
    Asset, DepositStatusReport, IsoDetails, Order, OrderBookView, Principal, TokenPair,
    TxHashValue, UserContribution,
};

pub use http::{HttpDepositService, HttpOrderBookService, HttpTokenService};

/// Identity provider failure. The session stays unauthenticated.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct AuthError(String);

impl AuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors surfaced by remote service calls.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service error: status {status}, body: {body}")]
    Service { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// External identity provider owning login and logout.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Delegate to the identity provider; suspends until it resolves.
    async fn login(&self) -> Result<Principal, AuthError>;

    /// Revoke the current credential.
    async fn logout(&self) -> Result<(), AuthError>;

    /// Whether a credential currently exists.
    async fn is_authenticated(&self) -> bool;
}

/// Blockchain monitoring and minting backend.
#[async_trait]
pub trait DepositService: Send + Sync {
    /// Generate a fresh deposit address for the asset.
    async fn generate_deposit_address(&self, asset: Asset) -> Result<String, RpcError>;

    /// One detection probe; `Some` once an inbound transaction is observed.
    async fn monitor_deposits(&self, asset: Asset) -> Result<Option<TxHashValue>, RpcError>;

    /// Confirmation progress for a detected transaction.
    async fn check_deposit_status(
        &self,
        asset: Asset,
        tx_hash: &str,
    ) -> Result<DepositStatusReport, RpcError>;

    /// Mint chain-key tokens against a confirmed deposit.
    async fn mint_ck_token(&self, asset: Asset, amount: u128) -> Result<bool, RpcError>;

    /// Static details of the current sale round.
    async fn get_iso_details(&self) -> Result<IsoDetails, RpcError>;

    /// The caller's aggregate contribution.
    async fn get_user_contribution(&self) -> Result<UserContribution, RpcError>;
}

/// Balance read for one synthetic token ledger.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// Balance in base units for the given principal.
    async fn balance_of(&self, principal: &Principal) -> Result<u128, RpcError>;
}

/// Remote order-matching service.
#[async_trait]
pub trait OrderBookService: Send + Sync {
    async fn get_supported_pairs(&self) -> Result<Vec<TokenPair>, RpcError>;

    async fn get_order_book(&self, pair: &TokenPair) -> Result<OrderBookView, RpcError>;

    async fn get_user_orders(&self, principal: &Principal) -> Result<Vec<Order>, RpcError>;

    /// Submit an order; returns the id assigned by the service.
    async fn place_order(
        &self,
        pair: &TokenPair,
        side: ckf_common::Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<u64, RpcError>;

    /// Request cancellation; `false` means the service refused.
    async fn cancel_order(&self, order_id: u64) -> Result<bool, RpcError>;
}
