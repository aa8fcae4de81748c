use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use super::executor::{BracketError, OrderExecutor};
use super::protection::{LegHandle, ProtectionPolicy, ProtectionQueue};
use super::OrderSpec;
use crate::api::{usdt_balance, ExchangeGateway};
use crate::config::{BudgetSettings, Settings};
use crate::error::{ConfigError, LifecycleError, StoreError, ValidationError};
use crate::models::{InstrumentInfo, InstrumentSnapshot, OrderAck, Side, Signal, SignalStatus};
use crate::risk::{size_position, CapitalBudget};
use crate::store::{InstrumentStore, SignalStore};
use crate::strategy::{candle_limit, should_enter, EntryDecision};

const SYMBOL_NOT_FOUND: &str = "Symbol not found";

/// Build a NEW signal from raw inbound fields
pub fn validate_signal(
    symbol: &str,
    side: &str,
    price: Option<f64>,
) -> Result<Signal, ValidationError> {
    let symbol = symbol.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(ValidationError::MissingSymbol);
    }

    if side.trim().is_empty() {
        return Err(ValidationError::MissingSide);
    }
    let side: Side = side
        .parse()
        .map_err(|_| ValidationError::InvalidSide(side.to_string()))?;

    let price = price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or(ValidationError::MissingPrice)?;

    Ok(Signal::new(symbol, side, price))
}

/// Inputs resolved once at the start of a pass
#[derive(Debug, Clone)]
pub struct BudgetContext {
    pub budget: CapitalBudget,
    /// Signals in NEW, WAITING or OPEN when the pass started
    pub in_flight: usize,
    pub instruments: InstrumentSnapshot,
}

/// One persisted status change
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub signal_id: uuid::Uuid,
    pub symbol: String,
    pub from: SignalStatus,
    pub to: SignalStatus,
}

/// What a pass did
#[derive(Debug, Default)]
pub struct PassSummary {
    pub examined: usize,
    pub transitions: Vec<Transition>,
    /// Protective legs queued during the pass
    pub legs: Vec<LegHandle>,
}

impl PassSummary {
    pub fn count(&self, to: SignalStatus) -> usize {
        self.transitions.iter().filter(|t| t.to == to).count()
    }
}

/// Result of the emergency close
#[derive(Debug, Default)]
pub struct ForceCloseReport {
    /// Symbols whose exchange position was flattened
    pub liquidated: Vec<String>,
    pub failures: Vec<String>,
    pub signals: PassSummary,
}

/// Drives signals through NEW -> WAITING -> OPEN -> CLOSED
pub struct LifecycleController {
    gateway: Arc<dyn ExchangeGateway>,
    signals: Arc<dyn SignalStore>,
    instruments: Arc<dyn InstrumentStore>,
    executor: OrderExecutor,
    budget: BudgetSettings,
    candle_interval: String,
    candle_interval_duration: Duration,
    reconcile_grace: chrono::Duration,
    order_ttl: chrono::Duration,
}

impl LifecycleController {
    /// Wire the controller and start its protection worker
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        signals: Arc<dyn SignalStore>,
        instruments: Arc<dyn InstrumentStore>,
        settings: &Settings,
    ) -> Result<Self, ConfigError> {
        let protection = ProtectionQueue::spawn(
            gateway.clone(),
            signals.clone(),
            ProtectionPolicy::from(&settings.protection),
        );
        let reconcile_grace =
            chrono::Duration::seconds(settings.protection.reconcile_grace_secs as i64);
        let order_ttl = chrono::Duration::from_std(settings.budget.order_ttl())
            .map_err(|_| ConfigError::Invalid("budget.order_ttl_secs is out of range".to_string()))?;

        Ok(Self {
            executor: OrderExecutor::new(gateway.clone(), protection),
            gateway,
            signals,
            instruments,
            budget: settings.budget.clone(),
            candle_interval: settings.schedule.candle_interval.clone(),
            candle_interval_duration: settings.schedule.candle_interval_duration()?,
            reconcile_grace,
            order_ttl,
        })
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Validate and store a new signal
    pub async fn accept_signal(
        &self,
        symbol: &str,
        side: &str,
        price: Option<f64>,
    ) -> Result<Signal, LifecycleError> {
        let signal = match validate_signal(symbol, side, price) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!("Rejected signal {} {} {:?}: {}", symbol, side, price, e);
                return Err(e.into());
            }
        };

        self.signals.insert(&signal).await?;
        tracing::info!(
            "📥 Accepted {} {} @ {} ({})",
            signal.side,
            signal.symbol,
            signal.reference_price,
            signal.id
        );

        Ok(signal)
    }

    // ========================================================================
    // Scheduled passes
    // ========================================================================

    /// Resolve capital, pair budget and instrument rules for one pass
    ///
    /// Returns None when the pass cannot size anything yet.
    pub async fn budget_context(&self) -> Result<Option<BudgetContext>, LifecycleError> {
        let Some(instruments) = self.instruments.latest_instrument_snapshot().await? else {
            tracing::warn!("No instrument snapshot stored yet, skipping pass");
            return Ok(None);
        };

        let live_balance = match self.budget.max_capital {
            Some(_) => None,
            None => usdt_balance(self.gateway.as_ref()).await?,
        };
        let Some(budget) = CapitalBudget::resolve(&self.budget, live_balance) else {
            tracing::warn!("No capital cap configured and no USDT balance reported, skipping pass");
            return Ok(None);
        };

        let in_flight = self
            .signals
            .find_by_status(&SignalStatus::IN_FLIGHT)
            .await?
            .len();

        Ok(Some(BudgetContext {
            budget,
            in_flight,
            instruments,
        }))
    }

    /// Size every NEW signal: WAITING with a quantity, PASSED, or ERROR
    pub async fn sizing_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, LifecycleError> {
        let mut summary = PassSummary::default();
        let pending = self.signals.find_by_status(&[SignalStatus::New]).await?;
        if pending.is_empty() {
            return Ok(summary);
        }
        let Some(ctx) = self.budget_context().await? else {
            return Ok(summary);
        };

        for signal in pending {
            summary.examined += 1;

            let price = match self.gateway.get_mark_price(&signal.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!("Mark price for {} unavailable: {}", signal.symbol, e);
                    continue;
                }
            };

            let (Some(instrument), Some(price)) = (ctx.instruments.find(&signal.symbol), price)
            else {
                self.commit(&signal, SignalStatus::Error, now, &mut summary, |s| {
                    s.message = SYMBOL_NOT_FOUND.to_string();
                })
                .await?;
                continue;
            };

            let quantity = size_position(price, instrument, &ctx.budget, ctx.in_flight);
            if quantity.is_zero() {
                self.commit(&signal, SignalStatus::Passed, now, &mut summary, |s| {
                    s.message = format!("Quantity rounds to zero at price {}", price);
                })
                .await?;
            } else {
                self.commit(&signal, SignalStatus::Waiting, now, &mut summary, |s| {
                    s.quantity = quantity;
                    s.message.clear();
                })
                .await?;
            }
        }

        Ok(summary)
    }

    /// Evaluate every WAITING signal and enter the ones whose conditions hold
    pub async fn entry_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, LifecycleError> {
        let mut summary = PassSummary::default();
        let waiting = self.signals.find_by_status(&[SignalStatus::Waiting]).await?;
        if waiting.is_empty() {
            return Ok(summary);
        }
        let Some(ctx) = self.budget_context().await? else {
            return Ok(summary);
        };

        for signal in waiting {
            summary.examined += 1;
            if let Err(e) = self.evaluate_entry(&signal, &ctx, now, &mut summary).await {
                match e {
                    LifecycleError::Store(e) => return Err(e.into()),
                    other => tracing::warn!(
                        "Entry check for {} failed, retrying next tick: {}",
                        signal.symbol,
                        other
                    ),
                }
            }
        }

        Ok(summary)
    }

    async fn evaluate_entry(
        &self,
        signal: &Signal,
        ctx: &BudgetContext,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) -> Result<(), LifecycleError> {
        let price = self.gateway.get_mark_price(&signal.symbol).await?;
        let (Some(instrument), Some(price)) = (ctx.instruments.find(&signal.symbol), price) else {
            self.commit(signal, SignalStatus::Error, now, summary, |s| {
                s.message = SYMBOL_NOT_FOUND.to_string();
            })
            .await?;
            return Ok(());
        };

        let limit = candle_limit(signal.created_at, now, self.candle_interval_duration);
        let candles = self
            .gateway
            .get_candles(&signal.symbol, &self.candle_interval, limit)
            .await?;

        match should_enter(signal, &candles, price, &ctx.budget) {
            EntryDecision::Missed { close } => {
                tracing::debug!("Missed order {} by price {}", signal.symbol, signal.reference_price);
                self.commit(signal, SignalStatus::MissedOrder, now, summary, |s| {
                    s.message = format!(
                        "Candle closed at {} beyond reference {}",
                        close, s.reference_price
                    );
                })
                .await?;
            }
            EntryDecision::Wait(reason) => {
                tracing::debug!("{} still waiting: {:?}", signal.symbol, reason);
            }
            EntryDecision::Enter => {
                self.enter(signal, instrument, price, ctx, now, summary)
                    .await?;
            }
        }

        Ok(())
    }

    async fn enter(
        &self,
        signal: &Signal,
        instrument: &InstrumentInfo,
        price: f64,
        ctx: &BudgetContext,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
    ) -> Result<(), LifecycleError> {
        let quantity = size_position(price, instrument, &ctx.budget, ctx.in_flight);
        if quantity.is_zero() {
            self.commit(signal, SignalStatus::Passed, now, summary, |s| {
                s.message = format!("Quantity rounds to zero at price {}", price);
            })
            .await?;
            return Ok(());
        }

        let ticket = match self
            .executor
            .place_bracket(signal, quantity, instrument, &ctx.budget)
            .await
        {
            Ok(ticket) => ticket,
            Err(BracketError::Exchange(e)) => return Err(e.into()),
            Err(BracketError::EntryRejected { code, message }) => {
                tracing::warn!(
                    "Entry for {} rejected ({} {}), retrying next tick",
                    signal.symbol,
                    code,
                    message
                );
                return Ok(());
            }
            Err(e @ (BracketError::Plan(_) | BracketError::Price(_))) => {
                self.commit(signal, SignalStatus::Error, now, summary, |s| {
                    s.message = e.to_string();
                })
                .await?;
                return Ok(());
            }
        };

        let opened = self
            .commit(signal, SignalStatus::Open, now, summary, |s| {
                s.quantity = ticket.quantity;
                s.order_id = ticket.order_id;
                s.message.clear();
            })
            .await?;

        if opened.is_none() {
            tracing::error!(
                "{} entry #{} filled but the signal changed concurrently; arming protection anyway",
                signal.symbol,
                ticket.order_id
            );
        }
        let protected = opened.as_ref().unwrap_or(signal);
        summary.legs.extend(self.executor.protect(protected, &ticket));

        Ok(())
    }

    /// Reconcile OPEN signals against the exchange and close expired ones
    pub async fn close_pass(&self, now: DateTime<Utc>) -> Result<PassSummary, LifecycleError> {
        let mut summary = PassSummary::default();
        let open = self.signals.find_by_status(&[SignalStatus::Open]).await?;

        for signal in open {
            summary.examined += 1;
            let age = now - signal.updated_at;

            // Protective legs may still be in flight
            if age < self.reconcile_grace {
                continue;
            }

            let orders = match self.gateway.get_open_orders(&signal.symbol).await {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::warn!("Open orders for {} unavailable: {}", signal.symbol, e);
                    continue;
                }
            };

            if orders.is_empty() {
                self.commit(&signal, SignalStatus::ClosedAuto, now, &mut summary, |s| {
                    s.message = "No working orders left on the exchange".to_string();
                })
                .await?;
                continue;
            }

            if age >= self.order_ttl {
                tracing::info!("⏰ {} open for {}s, force closing", signal.symbol, age.num_seconds());
                let failures = self.expire(&signal).await;

                if failures.is_empty() {
                    self.commit(&signal, SignalStatus::Closed, now, &mut summary, |s| {
                        s.message = "Closed after order TTL".to_string();
                    })
                    .await?;
                } else {
                    self.commit(&signal, SignalStatus::Error, now, &mut summary, |s| {
                        s.message = failures.join("; ");
                    })
                    .await?;
                }
            }
        }

        Ok(summary)
    }

    /// Cancel working orders and flatten the signal's quantity; returns exchange errors
    async fn expire(&self, signal: &Signal) -> Vec<String> {
        let mut failures = Vec::new();

        if let Err(e) = self.gateway.cancel_all_orders(&signal.symbol).await {
            failures.push(e.payload());
        }

        match OrderSpec::market(&signal.symbol, signal.side.exit_side(), signal.quantity, true) {
            Ok(close) => match self.gateway.place_orders(&[close]).await {
                Ok(acks) => {
                    failures.extend(
                        acks.iter()
                            .filter(|ack| matches!(ack, OrderAck::Rejected { .. }))
                            .map(|ack| ack.to_string()),
                    );
                }
                Err(e) => failures.push(e.payload()),
            },
            Err(e) => failures.push(e.to_string()),
        }

        failures
    }

    /// Fetch and store the exchange rule set; returns the instrument count
    pub async fn refresh_instruments(&self) -> Result<usize, LifecycleError> {
        let rules = self.gateway.get_exchange_rules().await?;
        let snapshot = InstrumentSnapshot::new(rules);
        self.instruments.save_instrument_snapshot(&snapshot).await?;

        tracing::info!("📚 Stored {} instruments", snapshot.instruments.len());
        Ok(snapshot.instruments.len())
    }

    // ========================================================================
    // Emergency close
    // ========================================================================

    /// Flatten every exchange position, then settle OPEN and WAITING signals
    pub async fn force_close_all(&self) -> Result<ForceCloseReport, LifecycleError> {
        let mut report = ForceCloseReport::default();
        let now = Utc::now();

        for position in self.gateway.get_positions().await? {
            if position.position_amount.is_zero() {
                continue;
            }

            let side = if position.position_amount > Decimal::ZERO {
                Side::Long
            } else {
                Side::Short
            };
            let close = OrderSpec::market(
                &position.symbol,
                side.exit_side(),
                position.position_amount.abs(),
                true,
            );

            let result = match close {
                Ok(spec) => self
                    .gateway
                    .place_orders(&[spec])
                    .await
                    .map_err(|e| e.payload())
                    .and_then(|acks| match acks.into_iter().next() {
                        Some(OrderAck::Accepted { .. }) => Ok(()),
                        Some(rejected) => Err(rejected.to_string()),
                        None => Err("empty batch response".to_string()),
                    }),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(()) => {
                    tracing::info!("🧹 Liquidated {} {}", position.symbol, position.position_amount);
                    report.liquidated.push(position.symbol);
                }
                Err(e) => {
                    tracing::error!("Failed to liquidate {}: {}", position.symbol, e);
                    report.failures.push(format!("{}: {}", position.symbol, e));
                }
            }
        }

        let signals = self
            .signals
            .find_by_status(&[SignalStatus::Open, SignalStatus::Waiting])
            .await?;

        for signal in signals {
            report.signals.examined += 1;

            let orders = match self.gateway.get_open_orders(&signal.symbol).await {
                Ok(orders) => orders,
                Err(e) => {
                    tracing::error!("Open orders for {} unavailable: {}", signal.symbol, e);
                    report.failures.push(format!("{}: {}", signal.symbol, e.payload()));
                    continue;
                }
            };

            if orders.is_empty() {
                self.commit(&signal, SignalStatus::ClosedAuto, now, &mut report.signals, |s| {
                    s.message = "Force close: no working orders".to_string();
                })
                .await?;
                continue;
            }

            match self.gateway.cancel_all_orders(&signal.symbol).await {
                Ok(()) => {
                    self.commit(&signal, SignalStatus::Closed, now, &mut report.signals, |s| {
                        s.message = "Force closed".to_string();
                    })
                    .await?;
                }
                Err(e) => {
                    report.failures.push(format!("{}: {}", signal.symbol, e.payload()));
                    self.commit(&signal, SignalStatus::Error, now, &mut report.signals, |s| {
                        s.message = e.payload();
                    })
                    .await?;
                }
            }
        }

        tracing::warn!(
            "Force close finished: {} positions liquidated, {} signals settled, {} failures",
            report.liquidated.len(),
            report.signals.transitions.len(),
            report.failures.len()
        );

        Ok(report)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Persist `signal` moving to `to`, guarded by its current status and version
    ///
    /// Illegal transitions and lost races are logged and skipped.
    async fn commit(
        &self,
        signal: &Signal,
        to: SignalStatus,
        now: DateTime<Utc>,
        summary: &mut PassSummary,
        update: impl FnOnce(&mut Signal) + Send,
    ) -> Result<Option<Signal>, StoreError> {
        if !signal.status.can_transition_to(to) {
            tracing::error!(
                "Refusing illegal transition {} -> {} for {}",
                signal.status,
                to,
                signal.id
            );
            return Ok(None);
        }

        let mut next = signal.clone();
        update(&mut next);
        next.status = to;
        next.updated_at = now;

        match self.signals.transition(&next, signal.status).await? {
            Some(stored) => {
                tracing::info!(
                    "{} {} -> {}{}",
                    stored.symbol,
                    signal.status,
                    to,
                    if stored.message.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", stored.message)
                    }
                );
                summary.transitions.push(Transition {
                    signal_id: stored.id,
                    symbol: stored.symbol.clone(),
                    from: signal.status,
                    to,
                });
                Ok(Some(stored))
            }
            None => {
                tracing::warn!(
                    "{} ({}) changed concurrently, skipping {} -> {}",
                    signal.symbol,
                    signal.id,
                    signal.status,
                    to
                );
                Ok(None)
            }
        }
    }
}
