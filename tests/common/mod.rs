#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use signalbot::config::Settings;
use signalbot::error::ExchangeError;
use signalbot::execution::{LifecycleController, OrderSpec};
use signalbot::models::{
    Balance, Candle, InstrumentInfo, OpenOrder, OrderAck, OrderFill, PositionRisk, Side, Signal,
    SignalStatus,
};
use signalbot::store::{MemoryStore, SignalStore};
use signalbot::ExchangeGateway;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Exchange stand-in with scripted answers and a log of what was sent
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    balance: Option<f64>,
    mark_prices: HashMap<String, f64>,
    candles: HashMap<String, Vec<Candle>>,
    open_orders: HashMap<String, Vec<OpenOrder>>,
    positions: Vec<PositionRisk>,
    rules: Vec<InstrumentInfo>,
    /// Remaining rejections per order kind
    rejections: HashMap<&'static str, usize>,
    failing_cancels: HashSet<String>,
    failing_mark_prices: HashSet<String>,
    failing_candles: HashSet<String>,
    failing_open_orders: HashSet<String>,
    /// Batches that are executed but whose response never arrives
    lost_responses: usize,
    fills: HashMap<String, OrderFill>,
    next_order_id: i64,
    submitted: Vec<OrderSpec>,
    cancelled: Vec<String>,
    leverage_calls: Vec<(String, u32)>,
    margin_calls: Vec<String>,
    candle_limits: Vec<u32>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        fake.state().next_order_id = 1000;
        Arc::new(fake)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn set_balance(&self, balance: f64) {
        self.state().balance = Some(balance);
    }

    pub fn set_mark_price(&self, symbol: &str, price: f64) {
        self.state().mark_prices.insert(symbol.to_string(), price);
    }

    pub fn fail_mark_price(&self, symbol: &str) {
        self.state().failing_mark_prices.insert(symbol.to_string());
    }

    pub fn fail_candles(&self, symbol: &str) {
        self.state().failing_candles.insert(symbol.to_string());
    }

    pub fn fail_open_orders(&self, symbol: &str) {
        self.state().failing_open_orders.insert(symbol.to_string());
    }

    /// Execute the next `times` batches but report a transport failure
    pub fn lose_responses(&self, times: usize) {
        self.state().lost_responses = times;
    }

    pub fn set_candles(&self, symbol: &str, closes: &[f64]) {
        let start = Utc::now() - chrono::Duration::minutes(5 * closes.len() as i64);
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                open_time: start + chrono::Duration::minutes(5 * i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        self.state().candles.insert(symbol.to_string(), candles);
    }

    pub fn set_open_orders(&self, symbol: &str, count: usize) {
        let orders = (0..count)
            .map(|i| OpenOrder {
                symbol: symbol.to_string(),
                order_id: 500 + i as i64,
                order_type: "STOP_MARKET".to_string(),
            })
            .collect();
        self.state().open_orders.insert(symbol.to_string(), orders);
    }

    pub fn add_position(&self, symbol: &str, amount: Decimal) {
        self.state().positions.push(PositionRisk {
            symbol: symbol.to_string(),
            position_amount: amount,
        });
    }

    pub fn add_instrument(&self, symbol: &str, price_precision: u32, quantity_precision: u32) {
        self.state().rules.push(InstrumentInfo {
            symbol: symbol.to_string(),
            price_precision,
            quantity_precision,
            status: "TRADING".to_string(),
        });
    }

    /// Reject the next `times` orders of `kind`
    pub fn reject(&self, kind: &'static str, times: usize) {
        self.state().rejections.insert(kind, times);
    }

    pub fn fail_cancel(&self, symbol: &str) {
        self.state().failing_cancels.insert(symbol.to_string());
    }

    pub fn submitted(&self) -> Vec<OrderSpec> {
        self.state().submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state().cancelled.clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.state().leverage_calls.clone()
    }

    pub fn margin_calls(&self) -> Vec<String> {
        self.state().margin_calls.clone()
    }

    pub fn candle_limits(&self) -> Vec<u32> {
        self.state().candle_limits.clone()
    }

    /// Non-reduce-only market orders sent, i.e. entries
    pub fn entries_submitted(&self) -> usize {
        self.state()
            .submitted
            .iter()
            .filter(|o| matches!(o, OrderSpec::Market { reduce_only: false, .. }))
            .count()
    }
}

fn unavailable() -> ExchangeError {
    ExchangeError::RetriesExhausted {
        attempts: 3,
        last_error: "503 Service Unavailable".to_string(),
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        Ok(self
            .state()
            .balance
            .map(|balance| Balance {
                asset: "USDT".to_string(),
                balance,
                available_balance: balance,
            })
            .into_iter()
            .collect())
    }

    async fn get_positions(&self) -> Result<Vec<PositionRisk>, ExchangeError> {
        Ok(self.state().positions.clone())
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<OpenOrder>, ExchangeError> {
        let state = self.state();
        if state.failing_open_orders.contains(symbol) {
            return Err(unavailable());
        }
        Ok(state
            .open_orders
            .get(symbol)
            .cloned()
            .unwrap_or_default())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let mut state = self.state();
        if state.failing_cancels.contains(symbol) {
            return Err(ExchangeError::Api {
                code: -2011,
                message: "Unknown order sent.".to_string(),
            });
        }
        state.cancelled.push(symbol.to_string());
        state.open_orders.remove(symbol);
        Ok(())
    }

    async fn place_orders(&self, orders: &[OrderSpec]) -> Result<Vec<OrderAck>, ExchangeError> {
        let mut state = self.state();
        let mut acks = Vec::new();

        for order in orders {
            state.submitted.push(order.clone());

            let remaining = state.rejections.get(order.kind()).copied().unwrap_or(0);
            if remaining > 0 {
                state.rejections.insert(order.kind(), remaining - 1);
                acks.push(OrderAck::Rejected {
                    code: -2021,
                    message: "Order would immediately trigger.".to_string(),
                });
                continue;
            }

            state.next_order_id += 1;
            let order_id = state.next_order_id;
            if let OrderSpec::Market {
                quantity,
                client_order_id: Some(client_order_id),
                ..
            } = order
            {
                state.fills.insert(
                    client_order_id.clone(),
                    OrderFill {
                        order_id,
                        status: "FILLED".to_string(),
                        executed_quantity: *quantity,
                    },
                );
            }
            acks.push(OrderAck::Accepted { order_id });
        }

        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(ExchangeError::RetriesExhausted {
                attempts: 1,
                last_error: "operation timed out".to_string(),
            });
        }

        Ok(acks)
    }

    async fn find_order(
        &self,
        _symbol: &str,
        client_order_id: &str,
    ) -> Result<Option<OrderFill>, ExchangeError> {
        Ok(self.state().fills.get(client_order_id).cloned())
    }

    async fn get_mark_price(&self, symbol: &str) -> Result<Option<f64>, ExchangeError> {
        let state = self.state();
        if state.failing_mark_prices.contains(symbol) {
            return Err(unavailable());
        }
        Ok(state.mark_prices.get(symbol).copied())
    }

    async fn get_candles(
        &self,
        symbol: &str,
        _interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let mut state = self.state();
        state.candle_limits.push(limit);
        if state.failing_candles.contains(symbol) {
            return Err(unavailable());
        }

        let candles = state.candles.get(symbol).cloned().unwrap_or_default();
        let skip = candles.len().saturating_sub(limit as usize);
        Ok(candles.into_iter().skip(skip).collect())
    }

    async fn get_exchange_rules(&self) -> Result<Vec<InstrumentInfo>, ExchangeError> {
        Ok(self.state().rules.clone())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.state()
            .leverage_calls
            .push((symbol.to_string(), leverage));
        Ok(())
    }

    async fn set_isolated_margin(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.state().margin_calls.push(symbol.to_string());
        Ok(())
    }
}

/// Capital 1000, 2 pairs, 10x, tp 4%, sl 2%, 24h TTL, legs without delay
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.budget.max_capital = Some(1000.0);
    settings.budget.max_pairs = Some(2);
    settings.budget.leverage = 10;
    settings.budget.take_profit_rate = 0.04;
    settings.budget.stop_loss_rate = 0.02;
    settings.budget.order_ttl_secs = 24 * 60 * 60;
    settings.protection.leg_delay_ms = 0;
    settings.protection.retry_backoff_ms = 0;
    settings.protection.reconcile_grace_secs = 0;
    settings
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<MemoryStore>,
    pub controller: LifecycleController,
}

impl Harness {
    /// Controller over a fake exchange listing BTCUSDT (2/3) and ETHUSDT (2/3)
    pub async fn new(settings: Settings) -> Self {
        let gateway = FakeGateway::new();
        gateway.add_instrument("BTCUSDT", 2, 3);
        gateway.add_instrument("ETHUSDT", 2, 3);

        let store = Arc::new(MemoryStore::new());
        let controller =
            LifecycleController::new(gateway.clone(), store.clone(), store.clone(), &settings)
                .unwrap();
        controller.refresh_instruments().await.unwrap();

        Self {
            gateway,
            store,
            controller,
        }
    }

    /// Store a signal directly in `status`, as if earlier passes had run
    pub async fn seed(
        &self,
        symbol: &str,
        side: Side,
        reference_price: f64,
        status: SignalStatus,
        quantity: Decimal,
        created_at: DateTime<Utc>,
    ) -> Signal {
        let mut signal = Signal::new_at(symbol, side, reference_price, created_at);
        signal.status = status;
        signal.quantity = quantity;
        if status == SignalStatus::Open {
            signal.order_id = 42;
        }
        self.store.insert(&signal).await.unwrap();
        signal
    }

    pub async fn reload(&self, signal: &Signal) -> Signal {
        self.store.get(signal.id).await.unwrap().unwrap()
    }
}
