//! HTTP JSON implementations of the remote service contracts.
//!
//! Each client wraps one service base URL with a shared request timeout.
//! Bodies are plain JSON; decimal fields travel as strings. Non-success
//! statuses become `RpcError::Service` with the body preserved for the
//! user-visible message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ckf_common::{
    Asset, DepositStatusReport, IsoDetails, Order, OrderBookView, Principal, Side, TokenPair,
    TxHashValue, UserContribution,
};

use super::{DepositService, OrderBookService, RpcError, TokenService};

/// Request timeout for all service calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RpcError::Decode(err.to_string())
        } else {
            RpcError::Transport(err.to_string())
        }
    }
}

fn build_http() -> Result<Client, RpcError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(RpcError::from)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RpcError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Service call rejected");
        return Err(RpcError::Service {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// HTTP client for the deposit/mint service.
pub struct HttpDepositService {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct MintRequest<'a> {
    asset: &'a str,
    amount: u128,
}

impl HttpDepositService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcError> {
        Ok(Self {
            http: build_http()?,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Deposit service GET");
        let response = check_status(self.http.get(&url).send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RpcError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Deposit service POST");
        let response = check_status(self.http.post(&url).json(body).send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DepositService for HttpDepositService {
    async fn generate_deposit_address(&self, asset: Asset) -> Result<String, RpcError> {
        self.post_json(&format!("deposit-address/{}", asset.id()), &())
            .await
    }

    async fn monitor_deposits(&self, asset: Asset) -> Result<Option<TxHashValue>, RpcError> {
        self.post_json(&format!("monitor/{}", asset.id()), &()).await
    }

    async fn check_deposit_status(
        &self,
        asset: Asset,
        tx_hash: &str,
    ) -> Result<DepositStatusReport, RpcError> {
        self.get_json(&format!("deposit-status/{}/{}", asset.id(), tx_hash))
            .await
    }

    async fn mint_ck_token(&self, asset: Asset, amount: u128) -> Result<bool, RpcError> {
        self.post_json(
            "mint",
            &MintRequest {
                asset: asset.id(),
                amount,
            },
        )
        .await
    }

    async fn get_iso_details(&self) -> Result<IsoDetails, RpcError> {
        self.get_json("iso-details").await
    }

    async fn get_user_contribution(&self) -> Result<UserContribution, RpcError> {
        self.get_json("contribution").await
    }
}

/// HTTP client for one synthetic token ledger.
pub struct HttpTokenService {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: u128,
}

impl HttpTokenService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcError> {
        Ok(Self {
            http: build_http()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl TokenService for HttpTokenService {
    async fn balance_of(&self, principal: &Principal) -> Result<u128, RpcError> {
        let url = format!("{}/balance/{}", self.base_url, principal);
        debug!(url = %url, "Token balance GET");
        let response = check_status(self.http.get(&url).send().await?).await?;
        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(body.balance)
    }
}

/// HTTP client for the order-book service.
pub struct HttpOrderBookService {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct PlaceOrderRequest<'a> {
    pair: &'a str,
    side: Side,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
}

#[derive(Deserialize)]
struct PlaceOrderResponse {
    order_id: u64,
}

#[derive(Deserialize)]
struct CancelOrderResponse {
    cancelled: bool,
}

impl HttpOrderBookService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RpcError> {
        Ok(Self {
            http: build_http()?,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Order book GET");
        let response = check_status(self.http.get(&url).send().await?).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[async_trait]
impl OrderBookService for HttpOrderBookService {
    async fn get_supported_pairs(&self) -> Result<Vec<TokenPair>, RpcError> {
        self.get_json("pairs").await
    }

    async fn get_order_book(&self, pair: &TokenPair) -> Result<OrderBookView, RpcError> {
        self.get_json(&format!("order-book/{}", pair)).await
    }

    async fn get_user_orders(&self, principal: &Principal) -> Result<Vec<Order>, RpcError> {
        self.get_json(&format!("orders/{}", principal)).await
    }

    async fn place_order(
        &self,
        pair: &TokenPair,
        side: Side,
        price: Decimal,
        amount: Decimal,
    ) -> Result<u64, RpcError> {
        let url = format!("{}/orders", self.base_url);
        debug!(url = %url, pair = %pair, side = %side, "Placing order");
        let request = PlaceOrderRequest {
            pair: pair.as_str(),
            side,
            price,
            amount,
        };
        let response = check_status(self.http.post(&url).json(&request).send().await?).await?;
        let body: PlaceOrderResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(body.order_id)
    }

    async fn cancel_order(&self, order_id: u64) -> Result<bool, RpcError> {
        let url = format!("{}/orders/{}/cancel", self.base_url, order_id);
        debug!(url = %url, "Cancelling order");
        let response = check_status(self.http.post(&url).send().await?).await?;
        let body: CancelOrderResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(body.cancelled)
    }
}
