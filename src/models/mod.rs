use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction of a trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }

    /// Order side that opens a position in this direction
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that reduces or closes a position in this direction
    pub fn exit_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            "SHORT" | "SELL" => Ok(Side::Short),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// Exchange order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Lifecycle state of a signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStatus {
    New,
    Waiting,
    Open,
    Closed,
    ClosedAuto,
    MissedOrder,
    Error,
    Passed,
}

impl SignalStatus {
    pub const ALL: [SignalStatus; 8] = [
        SignalStatus::New,
        SignalStatus::Waiting,
        SignalStatus::Open,
        SignalStatus::Closed,
        SignalStatus::ClosedAuto,
        SignalStatus::MissedOrder,
        SignalStatus::Error,
        SignalStatus::Passed,
    ];

    /// Statuses that still hold (or may soon hold) capital on the exchange
    pub const IN_FLIGHT: [SignalStatus; 3] =
        [SignalStatus::New, SignalStatus::Waiting, SignalStatus::Open];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "NEW",
            SignalStatus::Waiting => "WAITING",
            SignalStatus::Open => "OPEN",
            SignalStatus::Closed => "CLOSED",
            SignalStatus::ClosedAuto => "CLOSED_AUTO",
            SignalStatus::MissedOrder => "MISSED_ORDER",
            SignalStatus::Error => "ERROR",
            SignalStatus::Passed => "PASSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            SignalStatus::New | SignalStatus::Waiting | SignalStatus::Open
        )
    }

    /// Transition table of the signal state machine.
    ///
    /// WAITING may also be closed directly by the emergency force-close path.
    pub fn can_transition_to(&self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (New, Waiting)
                | (New, Passed)
                | (New, Error)
                | (Waiting, Open)
                | (Waiting, Passed)
                | (Waiting, MissedOrder)
                | (Waiting, Error)
                | (Waiting, Closed)
                | (Waiting, ClosedAuto)
                | (Open, Closed)
                | (Open, ClosedAuto)
                | (Open, Error)
        )
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid signal status '{}'", s))
    }
}

/// One trading intent and its execution record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub reference_price: f64, // Immutable after creation
    pub quantity: Decimal,    // Zero until sized
    pub status: SignalStatus,
    pub message: String,
    pub order_id: i64, // Entry order id, zero until placed
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, side: Side, reference_price: f64) -> Self {
        Self::new_at(symbol, side, reference_price, Utc::now())
    }

    pub fn new_at(
        symbol: impl Into<String>,
        side: Side,
        reference_price: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            reference_price,
            quantity: Decimal::ZERO,
            status: SignalStatus::New,
            message: String::new(),
            order_id: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Trading rules for one instrument, taken from the exchange rule set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentInfo {
    pub symbol: String,
    pub price_precision: u32,
    pub quantity_precision: u32,
    #[serde(default)]
    pub status: String,
}

/// Full instrument rule set captured at one point in time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub instruments: Vec<InstrumentInfo>,
}

impl InstrumentSnapshot {
    pub fn new(instruments: Vec<InstrumentInfo>) -> Self {
        Self {
            fetched_at: Utc::now(),
            instruments,
        }
    }

    pub fn find(&self, symbol: &str) -> Option<&InstrumentInfo> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }
}

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Futures account balance for one asset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub balance: f64,
    pub available_balance: f64,
}

/// Exchange-held position; amount is signed (negative = short)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amount: Decimal,
}

/// Working order reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: i64,
    pub order_type: String,
}

/// Per-order result of a batch placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrderAck {
    Accepted { order_id: i64 },
    Rejected { code: i64, message: String },
}

/// An order looked up by its client order id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFill {
    pub order_id: i64,
    pub status: String,
    pub executed_quantity: Decimal,
}

impl fmt::Display for OrderAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAck::Accepted { order_id } => write!(f, "accepted #{}", order_id),
            OrderAck::Rejected { code, message } => write!(f, "{} ({})", message, code),
        }
    }
}
