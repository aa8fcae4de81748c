use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use uuid::Uuid;

use super::OrderSpec;
use crate::api::ExchangeGateway;
use crate::config::ProtectionSettings;
use crate::models::{OrderAck, Side, SignalStatus};
use crate::store::SignalStore;

/// Timing and failure policy for protective legs
#[derive(Debug, Clone, PartialEq)]
pub struct ProtectionPolicy {
    pub leg_delay: Duration,
    pub retry_backoff: Duration,
    pub unwind_on_failure: bool,
}

impl From<&ProtectionSettings> for ProtectionPolicy {
    fn from(settings: &ProtectionSettings) -> Self {
        Self {
            leg_delay: Duration::from_millis(settings.leg_delay_ms),
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
            unwind_on_failure: settings.unwind_on_leg_failure,
        }
    }
}

/// Final result of one protective leg
#[derive(Debug, Clone, PartialEq)]
pub enum LegOutcome {
    Placed { order_id: i64 },
    /// Both attempts failed; the signal was flagged ERROR if it was still OPEN
    Failed { message: String },
}

/// Completion handle for a queued protective leg
#[derive(Debug)]
pub struct LegHandle {
    pub signal_id: Uuid,
    pub kind: &'static str,
    rx: oneshot::Receiver<LegOutcome>,
}

impl LegHandle {
    /// Wait for the leg to be placed or to fail terminally
    pub async fn outcome(self) -> LegOutcome {
        self.rx.await.unwrap_or_else(|_| LegOutcome::Failed {
            message: "protection worker stopped".to_string(),
        })
    }
}

/// Open position a leg protects, used for the optional unwind
#[derive(Debug, Clone)]
struct Exposure {
    signal_id: Uuid,
    symbol: String,
    side: Side,
    quantity: Decimal,
}

struct LegJob {
    exposure: Exposure,
    leg: OrderSpec,
    done: oneshot::Sender<LegOutcome>,
}

/// Work queue placing stop and take-profit legs after entry
///
/// Each leg waits `leg_delay`, gets one retry after `retry_backoff`, and on a
/// second failure moves its signal OPEN -> ERROR. Legs run independently of
/// each other and of the pass that queued them.
#[derive(Clone)]
pub struct ProtectionQueue {
    tx: mpsc::UnboundedSender<LegJob>,
}

impl ProtectionQueue {
    /// Start the worker on the current runtime
    pub fn spawn(
        gateway: Arc<dyn ExchangeGateway>,
        store: Arc<dyn SignalStore>,
        policy: ProtectionPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = LegWorker {
            gateway,
            store,
            policy,
        };
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Queue one protective leg for an OPEN signal
    pub fn enqueue(
        &self,
        signal_id: Uuid,
        side: Side,
        quantity: Decimal,
        leg: OrderSpec,
    ) -> LegHandle {
        let (done, rx) = oneshot::channel();
        let kind = leg.kind();
        let job = LegJob {
            exposure: Exposure {
                signal_id,
                symbol: leg.symbol().to_string(),
                side,
                quantity,
            },
            leg,
            done,
        };

        // A closed channel drops the sender, and the handle then reports the worker as stopped
        if self.tx.send(job).is_err() {
            tracing::error!("Protection worker is gone, {} leg for {} not queued", kind, signal_id);
        }

        LegHandle {
            signal_id,
            kind,
            rx,
        }
    }
}

#[derive(Clone)]
struct LegWorker {
    gateway: Arc<dyn ExchangeGateway>,
    store: Arc<dyn SignalStore>,
    policy: ProtectionPolicy,
}

impl LegWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<LegJob>) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                job = rx.recv() => match job {
                    Some(job) => {
                        let worker = self.clone();
                        tasks.spawn(async move { worker.process(job).await });
                    }
                    None => break,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!("Protective leg task failed: {}", e);
                    }
                }
            }
        }

        // Queue closed: let in-flight legs finish
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("Protective leg task failed: {}", e);
            }
        }
    }

    async fn process(&self, job: LegJob) {
        let LegJob {
            exposure,
            leg,
            done,
        } = job;

        tokio::time::sleep(self.policy.leg_delay).await;

        let outcome = match self.attempt(&leg).await {
            Ok(order_id) => LegOutcome::Placed { order_id },
            Err(first) => {
                tracing::warn!(
                    "{} leg for {} failed ({}), retrying in {:?}",
                    leg.kind(),
                    exposure.symbol,
                    first,
                    self.policy.retry_backoff
                );
                tokio::time::sleep(self.policy.retry_backoff).await;

                match self.attempt(&leg).await {
                    Ok(order_id) => LegOutcome::Placed { order_id },
                    Err(second) => {
                        let message = format!("{} leg failed: {}", leg.kind(), second);
                        self.flag_error(&exposure, &message).await;
                        LegOutcome::Failed { message }
                    }
                }
            }
        };

        if let LegOutcome::Placed { order_id } = &outcome {
            tracing::info!(
                "🛡️  {} leg placed for {} (order #{})",
                leg.kind(),
                exposure.symbol,
                order_id
            );
        }

        // Receiver may have been dropped; nobody is waiting then
        let _ = done.send(outcome);
    }

    /// One placement attempt; the error string is the exchange payload
    async fn attempt(&self, leg: &OrderSpec) -> Result<i64, String> {
        let acks = self
            .gateway
            .place_orders(std::slice::from_ref(leg))
            .await
            .map_err(|e| e.payload())?;

        match acks.into_iter().next() {
            Some(OrderAck::Accepted { order_id }) => Ok(order_id),
            Some(rejected) => Err(rejected.to_string()),
            None => Err("empty batch response".to_string()),
        }
    }

    async fn flag_error(&self, exposure: &Exposure, message: &str) {
        let mut message = message.to_string();
        if self.policy.unwind_on_failure {
            message = format!("{}; {}", message, self.unwind(exposure).await);
        }

        let current = match self.store.get(exposure.signal_id).await {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                tracing::error!("Signal {} vanished before leg failure could be recorded", exposure.signal_id);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load signal {}: {}", exposure.signal_id, e);
                return;
            }
        };

        if current.status != SignalStatus::Open {
            tracing::warn!(
                "{} is {} already, not flagging leg failure: {}",
                current.symbol,
                current.status,
                message
            );
            return;
        }

        let mut next = current.clone();
        next.status = SignalStatus::Error;
        next.message = message;
        next.updated_at = Utc::now();

        match self.store.transition(&next, SignalStatus::Open).await {
            Ok(Some(_)) => tracing::error!(
                "❌ {} OPEN -> ERROR: {}",
                current.symbol,
                next.message
            ),
            Ok(None) => tracing::warn!(
                "{} changed concurrently, leg failure not recorded: {}",
                current.symbol,
                next.message
            ),
            Err(e) => tracing::error!("Failed to record leg failure for {}: {}", current.symbol, e),
        }
    }

    /// Cancel working orders and flatten the entry; returns a summary for the signal message
    async fn unwind(&self, exposure: &Exposure) -> String {
        let mut notes = Vec::new();

        match self.gateway.cancel_all_orders(&exposure.symbol).await {
            Ok(()) => notes.push("orders cancelled".to_string()),
            Err(e) => notes.push(format!("cancel failed: {}", e.payload())),
        }

        let close = OrderSpec::market(
            &exposure.symbol,
            exposure.side.exit_side(),
            exposure.quantity,
            true,
        );
        match close {
            Ok(spec) => match self.gateway.place_orders(&[spec]).await {
                Ok(acks) => match acks.first() {
                    Some(OrderAck::Accepted { order_id }) => {
                        notes.push(format!("unwound by order #{}", order_id))
                    }
                    Some(rejected) => notes.push(format!("unwind rejected: {}", rejected)),
                    None => notes.push("unwind returned no result".to_string()),
                },
                Err(e) => notes.push(format!("unwind failed: {}", e.payload())),
            },
            Err(e) => notes.push(format!("unwind skipped: {}", e)),
        }

        tracing::warn!("Unwound {} after leg failure: {}", exposure.symbol, notes.join(", "));
        notes.join(", ")
    }
}
