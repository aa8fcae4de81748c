use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

use super::CapitalBudget;
use crate::models::InstrumentInfo;

/// Round a value to `precision` decimal digits, half away from zero
///
/// Returns None for NaN and infinities.
pub fn to_precision(value: f64, precision: u32) -> Option<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero))
}

/// Compute the order quantity for one signal
///
/// `quantity = round(max_capital / pairs * leverage / price, quantity_precision)`
/// where `pairs` is the configured pair budget or the in-flight count.
/// A zero result means the capital is too small for this instrument.
pub fn size_position(
    current_price: f64,
    instrument: &InstrumentInfo,
    budget: &CapitalBudget,
    in_flight: usize,
) -> Decimal {
    if !(current_price.is_finite() && current_price > 0.0) {
        return Decimal::ZERO;
    }

    let (Some(capital), Some(price)) = (
        Decimal::from_f64(budget.max_capital),
        Decimal::from_f64(current_price),
    ) else {
        return Decimal::ZERO;
    };

    let pairs = Decimal::from(budget.effective_pairs(in_flight));
    let leverage = Decimal::from(budget.leverage);

    let raw = capital
        .checked_div(pairs)
        .and_then(|per_pair| per_pair.checked_mul(leverage))
        .and_then(|notional| notional.checked_div(price))
        .unwrap_or(Decimal::ZERO);

    let quantity = raw
        .round_dp_with_strategy(instrument.quantity_precision, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ZERO);

    tracing::debug!(
        symbol = %instrument.symbol,
        price = current_price,
        pairs = %pairs,
        raw = raw.to_f64().unwrap_or_default(),
        quantity = %quantity,
        "Sized position"
    );

    quantity
}
