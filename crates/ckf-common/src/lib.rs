//! Shared types for the chain-key finance client.
//!
//! CRITICAL: All prices and trade quantities use `rust_decimal::Decimal`.
//! On-chain amounts are integer base units (`u128`) scaled by the asset's
//! decimals. NEVER use f64 for financial math.

pub mod types;

pub use types::{
    Asset, DepositStatus, DepositStatusReport, IsoDetails, Order, OrderBookView, OrderStatus,
    ParseAssetError, Principal, RecordStatus, Side, TokenPair, TransactionKind, TransactionRecord,
    TxHashValue, UserContribution,
};
