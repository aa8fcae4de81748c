use crate::config::BudgetSettings;
use crate::models::Side;

/// Capital allocation parameters resolved for a single pass
///
/// Built fresh at the start of every pass: the capital cap may fall back to the
/// live balance and the pair budget may fall back to the in-flight count, so
/// neither is cached between passes.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalBudget {
    pub max_capital: f64,
    pub max_concurrent_pairs: Option<u32>,
    pub leverage: u32,
    pub take_profit_rate: f64,
    pub stop_loss_rate: f64,
    pub trailing_callback_rate: Option<f64>,
}

/// Protective price levels around a reference price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBounds {
    pub stop: f64,
    pub take_profit: f64,
}

impl PriceBounds {
    /// True when `price` lies strictly between the stop and take-profit levels
    pub fn contains(&self, price: f64) -> bool {
        let (low, high) = if self.stop < self.take_profit {
            (self.stop, self.take_profit)
        } else {
            (self.take_profit, self.stop)
        };
        price > low && price < high
    }
}

impl CapitalBudget {
    /// Resolve the budget from settings, using `live_balance` when no cap is configured
    ///
    /// Returns None when neither a cap nor a balance is available.
    pub fn resolve(settings: &BudgetSettings, live_balance: Option<f64>) -> Option<Self> {
        let max_capital = settings.max_capital.or(live_balance)?;

        Some(Self {
            max_capital,
            max_concurrent_pairs: settings.max_pairs,
            leverage: settings.leverage,
            take_profit_rate: settings.take_profit_rate,
            stop_loss_rate: settings.stop_loss_rate,
            trailing_callback_rate: settings.trailing_callback_rate,
        })
    }

    /// Pair budget: the configured maximum, otherwise the in-flight count (never below 1)
    pub fn effective_pairs(&self, in_flight: usize) -> u32 {
        self.max_concurrent_pairs
            .unwrap_or_else(|| u32::try_from(in_flight).unwrap_or(u32::MAX))
            .max(1)
    }

    /// Stop and take-profit levels for a position opened in `side` around `reference_price`
    pub fn bounds(&self, side: Side, reference_price: f64) -> PriceBounds {
        match side {
            Side::Long => PriceBounds {
                stop: reference_price * (1.0 - self.stop_loss_rate),
                take_profit: reference_price * (1.0 + self.take_profit_rate),
            },
            Side::Short => PriceBounds {
                stop: reference_price * (1.0 + self.stop_loss_rate),
                take_profit: reference_price * (1.0 - self.take_profit_rate),
            },
        }
    }
}

#[cfg(test)]
pub(crate) fn test_budget() -> CapitalBudget {
    CapitalBudget {
        max_capital: 1000.0,
        max_concurrent_pairs: Some(2),
        leverage: 10,
        take_profit_rate: 0.04,
        stop_loss_rate: 0.02,
        trailing_callback_rate: None,
    }
}
