use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

use super::orders::OrderSpecError;
use super::protection::{LegHandle, ProtectionQueue};
use super::OrderSpec;
use crate::api::ExchangeGateway;
use crate::error::ExchangeError;
use crate::models::{InstrumentInfo, OrderAck, Signal};
use crate::risk::{to_precision, CapitalBudget};

#[derive(Debug, Error)]
pub enum BracketError {
    #[error("invalid bracket: {0}")]
    Plan(#[from] OrderSpecError),

    #[error("bound {0} cannot be expressed at the instrument's price precision")]
    Price(f64),

    #[error("entry rejected: {message} ({code})")]
    EntryRejected { code: i64, message: String },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Entry order plus the protective legs that follow it
#[derive(Debug, Clone, PartialEq)]
pub struct BracketPlan {
    pub entry: OrderSpec,
    pub stop: OrderSpec,
    /// Take-profit market, or a trailing stop when a callback rate is configured
    pub exit: OrderSpec,
}

impl BracketPlan {
    pub fn protective_legs(&self) -> [&OrderSpec; 2] {
        [&self.stop, &self.exit]
    }
}

/// Confirmed entry awaiting its protective legs
#[derive(Debug, Clone, PartialEq)]
pub struct BracketTicket {
    pub order_id: i64,
    pub quantity: Decimal,
    pub plan: BracketPlan,
}

/// Client order id of a signal's entry, stable across retries
pub fn entry_client_order_id(signal: &Signal) -> String {
    format!("sb-{}", signal.id.simple())
}

/// Build the bracket for `signal`, anchored on its reference price
pub fn plan_bracket(
    signal: &Signal,
    quantity: Decimal,
    instrument: &InstrumentInfo,
    budget: &CapitalBudget,
) -> Result<BracketPlan, BracketError> {
    let bounds = budget.bounds(signal.side, signal.reference_price);
    let round = |price: f64| {
        to_precision(price, instrument.price_precision).ok_or(BracketError::Price(price))
    };
    let stop_price = round(bounds.stop)?;
    let take_profit_price = round(bounds.take_profit)?;

    let exit_side = signal.side.exit_side();
    let entry = OrderSpec::market(&signal.symbol, signal.side.entry_side(), quantity, false)?
        .with_client_order_id(entry_client_order_id(signal));
    let stop = OrderSpec::stop_market(&signal.symbol, exit_side, stop_price)?;

    let exit = match budget.trailing_callback_rate {
        Some(rate) => {
            let callback = Decimal::try_from(rate)
                .map_err(|_| OrderSpecError::CallbackRate(Decimal::ZERO))?
                .round_dp(1);
            OrderSpec::trailing_stop_market(
                &signal.symbol,
                exit_side,
                quantity,
                take_profit_price,
                callback,
            )?
        }
        None => OrderSpec::take_profit_market(&signal.symbol, exit_side, take_profit_price)?,
    };

    Ok(BracketPlan { entry, stop, exit })
}

/// Submits entries and hands their protective legs to the protection queue
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    protection: ProtectionQueue,
}

impl OrderExecutor {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, protection: ProtectionQueue) -> Self {
        Self {
            gateway,
            protection,
        }
    }

    /// Configure the symbol and place the market entry
    ///
    /// Nothing is submitted if the plan is invalid. On success the returned
    /// ticket still has to be passed to [`OrderExecutor::protect`] once the
    /// signal is recorded as OPEN.
    pub async fn place_bracket(
        &self,
        signal: &Signal,
        quantity: Decimal,
        instrument: &InstrumentInfo,
        budget: &CapitalBudget,
    ) -> Result<BracketTicket, BracketError> {
        let plan = plan_bracket(signal, quantity, instrument, budget)?;

        // An earlier attempt may have filled even though its response was lost
        let client_order_id = entry_client_order_id(signal);
        if let Some(fill) = self
            .gateway
            .find_order(&signal.symbol, &client_order_id)
            .await?
        {
            if fill.executed_quantity > Decimal::ZERO {
                tracing::warn!(
                    "{} entry {} already {} as #{} for qty {}, not resubmitting",
                    signal.symbol,
                    client_order_id,
                    fill.status,
                    fill.order_id,
                    fill.executed_quantity
                );
                return Ok(BracketTicket {
                    order_id: fill.order_id,
                    quantity: fill.executed_quantity,
                    plan: plan_bracket(signal, fill.executed_quantity, instrument, budget)?,
                });
            }
        }

        tracing::debug!("Set leverage {} for {}", budget.leverage, signal.symbol);
        self.gateway
            .set_leverage(&signal.symbol, budget.leverage)
            .await?;
        tracing::debug!("Set margin type ISOLATED for {}", signal.symbol);
        self.gateway.set_isolated_margin(&signal.symbol).await?;

        tracing::info!(
            "📤 {} {} MARKET qty {} (ref {})",
            signal.side,
            signal.symbol,
            quantity,
            signal.reference_price
        );

        let acks = self
            .gateway
            .place_orders(std::slice::from_ref(&plan.entry))
            .await?;

        match acks.into_iter().next() {
            Some(OrderAck::Accepted { order_id }) => Ok(BracketTicket {
                order_id,
                quantity,
                plan,
            }),
            Some(OrderAck::Rejected { code, message }) => {
                Err(BracketError::EntryRejected { code, message })
            }
            None => Err(BracketError::Exchange(ExchangeError::Decode(
                "empty batch response for entry order".to_string(),
            ))),
        }
    }

    /// Queue the stop and exit legs of a confirmed entry
    pub fn protect(&self, signal: &Signal, ticket: &BracketTicket) -> Vec<LegHandle> {
        ticket
            .plan
            .protective_legs()
            .into_iter()
            .map(|leg| {
                self.protection
                    .enqueue(signal.id, signal.side, ticket.quantity, leg.clone())
            })
            .collect()
    }
}
