//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub budget: BudgetSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub protection: ProtectionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl Settings {
    /// Reject values that would make sizing or bracket math meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = &self.budget;

        if let Some(capital) = budget.max_capital {
            if !(capital.is_finite() && capital > 0.0) {
                return Err(invalid("budget.max_capital must be positive"));
            }
        }
        if budget.max_pairs == Some(0) {
            return Err(invalid("budget.max_pairs must be at least 1"));
        }
        if !(1..=125).contains(&budget.leverage) {
            return Err(invalid("budget.leverage must be between 1 and 125"));
        }
        if !(budget.take_profit_rate > 0.0 && budget.take_profit_rate < 1.0) {
            return Err(invalid("budget.take_profit_rate must be in (0, 1)"));
        }
        if !(budget.stop_loss_rate > 0.0 && budget.stop_loss_rate < 1.0) {
            return Err(invalid("budget.stop_loss_rate must be in (0, 1)"));
        }
        if let Some(rate) = budget.trailing_callback_rate {
            // Exchange accepts callback rates between 0.1% and 5%
            if !(0.1..=5.0).contains(&rate) {
                return Err(invalid(
                    "budget.trailing_callback_rate must be between 0.1 and 5 (percent)",
                ));
            }
        }
        if budget.order_ttl_secs == 0 {
            return Err(invalid("budget.order_ttl_secs must be positive"));
        }

        // Reconciling before both leg attempts can finish would read a bare entry as closed
        let protection = &self.protection;
        let leg_window_ms = protection
            .leg_delay_ms
            .saturating_add(protection.retry_backoff_ms)
            .saturating_add(self.exchange.request_timeout_secs.saturating_mul(2 * 1000));
        if protection.reconcile_grace_secs.saturating_mul(1000) < leg_window_ms {
            return Err(ConfigError::Invalid(format!(
                "protection.reconcile_grace_secs must cover both leg attempts ({}ms)",
                leg_window_ms
            )));
        }

        let schedule = &self.schedule;
        if schedule.sizing_interval_secs == 0
            || schedule.entry_interval_secs == 0
            || schedule.close_interval_secs == 0
        {
            return Err(invalid("schedule intervals must be positive"));
        }
        if schedule.instrument_refresh_hour_utc > 23 {
            return Err(invalid("schedule.instrument_refresh_hour_utc must be 0-23"));
        }
        schedule.candle_interval_duration()?;

        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// Exchange connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    /// Base URL override; defaults to mainnet or testnet depending on `testnet`
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ExchangeSettings {
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.testnet => TESTNET_URL.to_string(),
            None => MAINNET_URL.to_string(),
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            testnet: false,
            api_key: String::new(),
            api_secret: String::new(),
            recv_window_ms: default_recv_window(),
            requests_per_minute: default_requests_per_minute(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_recv_window() -> u64 {
    5000
}

fn default_requests_per_minute() -> u32 {
    1200
}

fn default_request_timeout() -> u64 {
    10
}

/// Capital allocation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Capital cap; the live USDT futures balance is used when unset
    #[serde(default)]
    pub max_capital: Option<f64>,
    /// Max simultaneous pairs; the in-flight signal count is used when unset
    #[serde(default)]
    pub max_pairs: Option<u32>,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_take_profit_rate")]
    pub take_profit_rate: f64,
    #[serde(default = "default_stop_loss_rate")]
    pub stop_loss_rate: f64,
    /// Trailing callback in percent; selects a trailing stop instead of a fixed take-profit
    #[serde(default)]
    pub trailing_callback_rate: Option<f64>,
    #[serde(default = "default_order_ttl")]
    pub order_ttl_secs: u64,
}

impl BudgetSettings {
    pub fn order_ttl(&self) -> Duration {
        Duration::from_secs(self.order_ttl_secs)
    }
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            max_capital: None,
            max_pairs: None,
            leverage: default_leverage(),
            take_profit_rate: default_take_profit_rate(),
            stop_loss_rate: default_stop_loss_rate(),
            trailing_callback_rate: None,
            order_ttl_secs: default_order_ttl(),
        }
    }
}

fn default_leverage() -> u32 {
    1
}

fn default_take_profit_rate() -> f64 {
    0.04
}

fn default_stop_loss_rate() -> f64 {
    0.02
}

fn default_order_ttl() -> u64 {
    24 * 60 * 60
}

/// Pass intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_sizing_interval")]
    pub sizing_interval_secs: u64,
    #[serde(default = "default_entry_interval")]
    pub entry_interval_secs: u64,
    #[serde(default = "default_close_interval")]
    pub close_interval_secs: u64,
    /// Hour of day (UTC) at which the instrument rule set is refreshed
    #[serde(default = "default_refresh_hour")]
    pub instrument_refresh_hour_utc: u32,
    /// Kline interval used by the entry evaluator, in exchange notation
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
}

impl ScheduleSettings {
    pub fn candle_interval_duration(&self) -> Result<Duration, ConfigError> {
        parse_interval(&self.candle_interval).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unsupported candle interval '{}'",
                self.candle_interval
            ))
        })
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            sizing_interval_secs: default_sizing_interval(),
            entry_interval_secs: default_entry_interval(),
            close_interval_secs: default_close_interval(),
            instrument_refresh_hour_utc: default_refresh_hour(),
            candle_interval: default_candle_interval(),
        }
    }
}

fn default_sizing_interval() -> u64 {
    60
}

fn default_entry_interval() -> u64 {
    300
}

fn default_close_interval() -> u64 {
    60
}

fn default_refresh_hour() -> u32 {
    22
}

fn default_candle_interval() -> String {
    "5m".to_string()
}

/// Parse an exchange kline interval such as `1m`, `5m`, `1h` or `1d`
pub fn parse_interval(interval: &str) -> Option<Duration> {
    let (split, unit) = interval.char_indices().last()?;
    let amount: u64 = interval[..split].parse().ok().filter(|a| *a > 0)?;
    let unit_secs = match unit {
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return None,
    };
    amount.checked_mul(unit_secs).map(Duration::from_secs)
}

/// Protective leg placement policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionSettings {
    /// Delay between entry confirmation and the first leg attempt
    #[serde(default = "default_leg_delay")]
    pub leg_delay_ms: u64,
    /// Delay before the single retry of a failed leg
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Flatten the entry immediately when a protective leg cannot be placed
    #[serde(default)]
    pub unwind_on_leg_failure: bool,
    /// OPEN signals younger than this are not reconciled against open orders
    #[serde(default = "default_reconcile_grace")]
    pub reconcile_grace_secs: u64,
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            leg_delay_ms: default_leg_delay(),
            retry_backoff_ms: default_retry_backoff(),
            unwind_on_leg_failure: false,
            reconcile_grace_secs: default_reconcile_grace(),
        }
    }
}

fn default_leg_delay() -> u64 {
    3000
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_reconcile_grace() -> u64 {
    30
}

/// Storage endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/signalbot".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
