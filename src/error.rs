//! Error types shared across the crate

use thiserror::Error;

/// Errors returned by the exchange gateway
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network, timeout or TLS failure
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error payload returned by the exchange, e.g. `{"code": -2019, "msg": "Margin is insufficient."}`
    #[error("exchange error {code}: {message}")]
    Api { code: i64, message: String },

    /// Response body did not match the expected shape
    #[error("failed to decode exchange response: {0}")]
    Decode(String),

    /// Gave up after retrying a transient failure
    #[error("exchange request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ExchangeError {
    /// Parse a Binance error body of the form `{"code": -1000, "msg": "..."}`
    pub fn from_api_body(status: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ApiBody {
            code: i64,
            msg: String,
        }

        match serde_json::from_str::<ApiBody>(body) {
            Ok(err) => Self::Api {
                code: err.code,
                message: err.msg,
            },
            Err(_) => Self::Api {
                code: i64::from(status),
                message: body.to_string(),
            },
        }
    }

    /// Message suitable for recording on a signal
    pub fn payload(&self) -> String {
        match self {
            Self::Api { code, message } => format!("{} ({})", message, code),
            other => other.to_string(),
        }
    }
}

/// Errors returned by signal and instrument stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("signal {0} already exists")]
    Duplicate(uuid::Uuid),
}

/// Rejection of a malformed inbound signal
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("symbol is required")]
    MissingSymbol,

    #[error("side is required (LONG or SHORT)")]
    MissingSide,

    #[error("invalid side: {0}")]
    InvalidSide(String),

    #[error("price is required and must be positive")]
    MissingPrice,
}

/// Invalid or incomplete configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by the lifecycle controller
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
