//! Chain-key finance client core.
//!
//! Orchestrates the client-observable side of moving value from external
//! asset networks (Bitcoin, Ethereum, an ERC-20 stablecoin) into 1:1-backed
//! chain-key tokens, and trading those tokens on a remote order book.
//!
//! ## Architecture
//!
//! - **Typed service seams**: every remote collaborator (identity, deposit/
//!   mint, token balances, order book) is a trait in [`rpc`], so the same
//!   orchestration code runs against HTTP backends or in-memory test doubles.
//! - **Cancellable polling**: deposit detection and confirmation tracking
//!   run as owned tokio tasks with an explicit cancellation contract
//!   (asset change, session teardown, terminal status).
//! - **Epoch-stamped sessions**: every remote result is applied only if the
//!   session it was issued under is still live.
//!
//! ## Modules
//!
//! - `config`: client configuration (poll intervals, storage, endpoints)
//! - `session`: authenticated session lifecycle
//! - `deposit`: per-asset deposit state machine and poll tasks
//! - `trading`: pair selection, order book, order placement
//! - `history`: durable local transaction records
//! - `notify`: status-to-alert mapping
//! - `storage`: durable key-value persistence
//! - `rpc`: remote service contracts and HTTP implementations

pub mod config;
pub mod deposit;
pub mod error;
pub mod history;
pub mod notify;
pub mod rpc;
pub mod session;
pub mod storage;
pub mod trading;

mod busy;

pub use config::{ClientConfig, ServiceEndpoints};
pub use deposit::{
    DepositEvent, DepositOrchestrator, DepositRecord, FixedPriceOracle, PriceOracle,
};
pub use error::ClientError;
pub use history::{HistoryStore, RecordPatch};
pub use notify::{Alert, NotificationDispatcher, NotificationSink};
pub use rpc::{
    AuthError, DepositService, IdentityService, OrderBookService, RpcError, TokenService,
};
pub use session::{Channel, SessionManager, SessionState};
pub use storage::{JsonFileStore, KvStore, MemoryStore, StorageError};
pub use trading::{TradingSession, TradingSnapshot};
