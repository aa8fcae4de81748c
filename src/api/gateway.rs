use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::execution::OrderSpec;
use crate::models::{
    Balance, Candle, InstrumentInfo, OpenOrder, OrderAck, OrderFill, PositionRisk,
};

/// Operations the lifecycle controller needs from a derivatives exchange
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Futures wallet balances per asset
    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError>;

    /// All positions, including flat ones
    async fn get_positions(&self) -> Result<Vec<PositionRisk>, ExchangeError>;

    /// Working orders for one symbol
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    /// Submit a batch; each order succeeds or fails independently
    async fn place_orders(&self, orders: &[OrderSpec]) -> Result<Vec<OrderAck>, ExchangeError>;

    /// Order previously submitted with `client_order_id`, None if the exchange never saw it
    async fn find_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderFill>, ExchangeError>;

    /// Current mark price, None when the symbol is unknown
    async fn get_mark_price(&self, symbol: &str) -> Result<Option<f64>, ExchangeError>;

    /// Most recent candles, oldest first
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Full instrument rule set
    async fn get_exchange_rules(&self) -> Result<Vec<InstrumentInfo>, ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    /// Switch the symbol to isolated margin; already-isolated is not an error
    async fn set_isolated_margin(&self, symbol: &str) -> Result<(), ExchangeError>;
}

/// Wallet balance of the USDT futures account, if reported
pub async fn usdt_balance(gateway: &dyn ExchangeGateway) -> Result<Option<f64>, ExchangeError> {
    let balances = gateway.get_balance().await?;
    Ok(balances
        .into_iter()
        .find(|b| b.asset == "USDT")
        .map(|b| b.balance))
}
