//! Order trading session over the remote order book.
//!
//! Holds the client-side view of the exchange: supported pairs, the selected
//! pair's book, the caller's open orders and chain-key token balances. All
//! remote results are applied only when the session channel they were issued
//! under is still current.
//!
//! After a successful placement or cancellation the order book is refreshed
//! before the user's orders, so the two views never reflect states from
//! opposite sides of the mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use ckf_common::{Order, OrderBookView, Side, TokenPair};

use crate::busy::BusyGuard;
use crate::error::ClientError;
use crate::rpc::{AuthError, OrderBookService, TokenService};
use crate::session::{Channel, SessionManager};

/// Point-in-time copy of the trading state for rendering.
#[derive(Debug, Clone, Default)]
pub struct TradingSnapshot {
    pub pairs: Vec<TokenPair>,
    pub selected_pair: Option<TokenPair>,
    pub order_book: Option<OrderBookView>,
    pub user_orders: Vec<Order>,
    /// Token label → balance in base units. A label absent here had no
    /// successful fetch yet.
    pub balances: HashMap<String, u128>,
}

/// Client-side trading state over one order-book service.
pub struct TradingSession {
    session: Arc<SessionManager>,
    service: Arc<dyn OrderBookService>,
    /// Token label → ledger, one per chain-key token.
    tokens: Vec<(String, Arc<dyn TokenService>)>,
    pairs: RwLock<Vec<TokenPair>>,
    selected_pair: RwLock<Option<TokenPair>>,
    order_book: RwLock<Option<OrderBookView>>,
    user_orders: RwLock<Vec<Order>>,
    balances: RwLock<HashMap<String, u128>>,
    loading: Arc<AtomicBool>,
    last_error: RwLock<Option<String>>,
}

impl TradingSession {
    pub fn new(
        session: Arc<SessionManager>,
        service: Arc<dyn OrderBookService>,
        tokens: Vec<(String, Arc<dyn TokenService>)>,
    ) -> Self {
        Self {
            session,
            service,
            tokens,
            pairs: RwLock::new(Vec::new()),
            selected_pair: RwLock::new(None),
            order_book: RwLock::new(None),
            user_orders: RwLock::new(Vec::new()),
            balances: RwLock::new(HashMap::new()),
            loading: Arc::new(AtomicBool::new(false)),
            last_error: RwLock::new(None),
        }
    }

    /// Fetch the supported pairs; the first becomes selected if none is.
    pub async fn load_pairs(&self) -> Result<Vec<TokenPair>, ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        match self.service.get_supported_pairs().await {
            Ok(pairs) => {
                if !self.session.is_current(&channel) {
                    debug!("Session changed during pair load, result discarded");
                    return Ok(pairs);
                }
                *self.pairs.write() = pairs.clone();
                let mut selected = self.selected_pair.write();
                if selected.is_none() {
                    *selected = pairs.first().cloned();
                }
                debug!(count = pairs.len(), "Supported pairs loaded");
                Ok(pairs)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to load trading pairs. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Select a pair and refresh its order book.
    pub async fn select_pair(&self, pair: TokenPair) -> Result<(), ClientError> {
        {
            *self.selected_pair.write() = Some(pair.clone());
            *self.order_book.write() = None;
        }
        debug!(pair = %pair, "Pair selected");
        self.refresh_order_book(&pair).await?;
        Ok(())
    }

    /// Fetch the pair's order book, replacing the prior view wholesale.
    pub async fn refresh_order_book(&self, pair: &TokenPair) -> Result<OrderBookView, ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        match self.service.get_order_book(pair).await {
            Ok(book) => {
                if !self.session.is_current(&channel) {
                    debug!("Session changed during book refresh, result discarded");
                    return Ok(book);
                }
                *self.order_book.write() = Some(book.clone());
                Ok(book)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to fetch order book. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Refresh the caller's open orders.
    pub async fn refresh_user_orders(&self) -> Result<Vec<Order>, ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        match self.service.get_user_orders(&channel.principal).await {
            Ok(orders) => {
                if !self.session.is_current(&channel) {
                    debug!("Session changed during order refresh, result discarded");
                    return Ok(orders);
                }
                *self.user_orders.write() = orders.clone();
                Ok(orders)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to fetch your orders. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Place an order on the given pair. Returns the order id.
    ///
    /// On success the pair's order book and the user's orders are refreshed
    /// in that order; refresh failures are logged, the placement still
    /// succeeds.
    pub async fn place_order(
        &self,
        pair: &TokenPair,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<u64, ClientError> {
        if price <= Decimal::ZERO {
            return Err(ClientError::validation("order price must be positive"));
        }
        if amount <= Decimal::ZERO {
            return Err(ClientError::validation("order amount must be positive"));
        }
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        match self.service.place_order(pair, side, price, amount).await {
            Ok(order_id) => {
                info!(order_id, pair = %pair, side = %side, %price, %amount, "Order placed");
                if self.session.is_current(&channel) {
                    self.refresh_after_mutation(Some(pair)).await;
                }
                Ok(order_id)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to place order. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Cancel an order by id. Returns whether the remote cancelled it.
    pub async fn cancel_order(&self, order_id: u64) -> Result<bool, ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);
        self.clear_error();

        match self.service.cancel_order(order_id).await {
            Ok(cancelled) => {
                if cancelled {
                    info!(order_id, "Order cancelled");
                    if self.session.is_current(&channel) {
                        self.refresh_after_mutation(None).await;
                    }
                } else {
                    debug!(order_id, "Cancel rejected by the order book");
                }
                Ok(cancelled)
            }
            Err(err) => {
                *self.last_error.write() =
                    Some("Failed to cancel order. Please try again.".to_string());
                Err(err.into())
            }
        }
    }

    /// Refresh every chain-key token balance.
    ///
    /// Ledger failures are isolated: a failing ledger keeps its previous
    /// balance and the others still update.
    pub async fn refresh_balances(&self) -> Result<(), ClientError> {
        let channel = self.require_channel()?;
        let _busy = BusyGuard::new(&self.loading);

        for (label, ledger) in &self.tokens {
            match ledger.balance_of(&channel.principal).await {
                Ok(balance) => {
                    if !self.session.is_current(&channel) {
                        debug!("Session changed during balance refresh, results discarded");
                        return Ok(());
                    }
                    self.balances.write().insert(label.clone(), balance);
                }
                Err(err) => {
                    warn!(token = %label, error = %err, "Balance fetch failed");
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Read state
    // =========================================================================

    pub fn pairs(&self) -> Vec<TokenPair> {
        self.pairs.read().clone()
    }

    pub fn selected_pair(&self) -> Option<TokenPair> {
        self.selected_pair.read().clone()
    }

    pub fn order_book(&self) -> Option<OrderBookView> {
        self.order_book.read().clone()
    }

    pub fn user_orders(&self) -> Vec<Order> {
        self.user_orders.read().clone()
    }

    /// Balance of one token label, if a fetch has succeeded for it.
    pub fn balance(&self, label: &str) -> Option<u128> {
        self.balances.read().get(label).copied()
    }

    pub fn snapshot(&self) -> TradingSnapshot {
        TradingSnapshot {
            pairs: self.pairs(),
            selected_pair: self.selected_pair(),
            order_book: self.order_book(),
            user_orders: self.user_orders(),
            balances: self.balances.read().clone(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Drop all trading state, e.g. on session teardown.
    pub fn clear(&self) {
        *self.pairs.write() = Vec::new();
        *self.selected_pair.write() = None;
        *self.order_book.write() = None;
        *self.user_orders.write() = Vec::new();
        self.balances.write().clear();
        debug!("Trading state cleared");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_channel(&self) -> Result<Channel, ClientError> {
        self.session
            .channel()
            .ok_or_else(|| ClientError::Auth(AuthError::new("session is not authenticated")))
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Book first, then user orders, strictly in that order.
    ///
    /// With no explicit pair the selected one is refreshed, if any.
    async fn refresh_after_mutation(&self, pair: Option<&TokenPair>) {
        let pair = pair.cloned().or_else(|| self.selected_pair());
        if let Some(pair) = pair {
            if let Err(err) = self.refresh_order_book(&pair).await {
                warn!(error = %err, "Order book refresh after mutation failed");
            }
        }
        if let Err(err) = self.refresh_user_orders().await {
            warn!(error = %err, "User order refresh after mutation failed");
        }
    }
}
