use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::models::{Candle, Side, Signal};
use crate::risk::CapitalBudget;

/// Upper bound the exchange accepts for a single kline request
pub const MAX_CANDLES: u32 = 1500;

/// Outcome of evaluating a WAITING signal
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    /// Both gates passed, place the bracket
    Enter,
    /// Not yet; evaluate again next tick
    Wait(WaitReason),
    /// Market already moved through the reference price; give up on this signal
    Missed { close: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitReason {
    NoCandles,
    CloseNotConfirmed { close: f64 },
    PriceOutsideBand { price: f64 },
}

/// Number of candles covering the time since the signal was created
pub fn candle_limit(created_at: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> u32 {
    let elapsed_ms = (now - created_at).num_milliseconds().max(0) as f64;
    let interval_ms = interval.as_millis().max(1) as f64;
    let count = (elapsed_ms / interval_ms).round() as u32;
    count.clamp(1, MAX_CANDLES)
}

/// Trend-confirmation gate
///
/// Every candle except the two most recent must not have closed beyond the
/// reference price against the signal: above it for LONG, below it for SHORT.
/// Returns the first offending close.
pub fn check_trend(signal: &Signal, candles: &[Candle]) -> Result<(), f64> {
    let settled = candles.len().saturating_sub(2);

    for candle in &candles[..settled] {
        let invalidated = match signal.side {
            Side::Long => candle.close > signal.reference_price,
            Side::Short => candle.close < signal.reference_price,
        };
        if invalidated {
            return Err(candle.close);
        }
    }

    Ok(())
}

/// Price-band gate
///
/// The latest close must have reached the reference price in the signal's
/// direction and the live price must sit strictly inside the protective bounds.
pub fn check_price_band(
    signal: &Signal,
    latest_close: f64,
    current_price: f64,
    budget: &CapitalBudget,
) -> Result<(), WaitReason> {
    let confirmed = match signal.side {
        Side::Long => latest_close >= signal.reference_price,
        Side::Short => latest_close <= signal.reference_price,
    };
    if !confirmed {
        return Err(WaitReason::CloseNotConfirmed {
            close: latest_close,
        });
    }

    if !budget
        .bounds(signal.side, signal.reference_price)
        .contains(current_price)
    {
        return Err(WaitReason::PriceOutsideBand {
            price: current_price,
        });
    }

    Ok(())
}

/// Decide whether a WAITING signal should be entered now
pub fn should_enter(
    signal: &Signal,
    candles: &[Candle],
    current_price: f64,
    budget: &CapitalBudget,
) -> EntryDecision {
    if let Err(close) = check_trend(signal, candles) {
        return EntryDecision::Missed { close };
    }

    let Some(latest) = candles.last() else {
        return EntryDecision::Wait(WaitReason::NoCandles);
    };

    match check_price_band(signal, latest.close, current_price, budget) {
        Ok(()) => EntryDecision::Enter,
        Err(reason) => EntryDecision::Wait(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::budget::test_budget;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc::now() - chrono::Duration::minutes(5 * closes.len() as i64);
        closes
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
            .collect()
    }

    fn long() -> Signal {
        Signal::new("BTCUSDT", Side::Long, 50000.0)
    }

    fn short() -> Signal {
        Signal::new("BTCUSDT", Side::Short, 50000.0)
    }

    #[test]
    fn test_reference_long_entry() {
        let history = candles(&[49000.0, 49500.0, 49800.0, 50100.0]);
        let decision = should_enter(&long(), &history, 49500.0, &test_budget());
        assert_eq!(decision, EntryDecision::Enter);
    }

    #[test]
    fn test_trend_violation_is_missed_regardless_of_price() {
        // Third-from-last candle closed above the reference
        let history = candles(&[49000.0, 50200.0, 49900.0, 50100.0]);

        for price in [49500.0, 51000.0, 60000.0] {
            let decision = should_enter(&long(), &history, price, &test_budget());
            assert_eq!(decision, EntryDecision::Missed { close: 50200.0 });
        }
    }

    #[test]
    fn test_last_two_candles_are_exempt_from_trend_gate() {
        let history = candles(&[49000.0, 50300.0, 50100.0]);
        assert!(check_trend(&long(), &history).is_ok());

        let history = candles(&[50300.0, 50100.0]);
        assert!(check_trend(&long(), &history).is_ok());
    }

    #[test]
    fn test_short_trend_violation() {
        let history = candles(&[50500.0, 49800.0, 50200.0, 49900.0]);
        assert_eq!(check_trend(&short(), &history), Err(49800.0));
    }

    #[test]
    fn test_waits_until_close_confirms() {
        let history = candles(&[49000.0, 49500.0, 49900.0]);
        let decision = should_enter(&long(), &history, 49950.0, &test_budget());
        assert_eq!(
            decision,
            EntryDecision::Wait(WaitReason::CloseNotConfirmed { close: 49900.0 })
        );
    }

    #[test]
    fn test_price_on_bounds_fails() {
        let budget = test_budget();
        let signal = long();
        let bounds = budget.bounds(signal.side, signal.reference_price);

        for price in [bounds.stop, bounds.take_profit] {
            assert_eq!(
                check_price_band(&signal, 50000.0, price, &budget),
                Err(WaitReason::PriceOutsideBand { price })
            );
        }

        assert!(check_price_band(&signal, 50000.0, bounds.stop + 0.01, &budget).is_ok());
        assert!(check_price_band(&signal, 50000.0, bounds.take_profit - 0.01, &budget).is_ok());
    }

    #[test]
    fn test_short_band() {
        let budget = test_budget();
        let history = candles(&[50500.0, 50200.0, 49900.0]);

        assert_eq!(should_enter(&short(), &history, 50400.0, &budget), EntryDecision::Enter);
        // Above the short stop (51000)
        assert!(matches!(
            should_enter(&short(), &history, 51200.0, &budget),
            EntryDecision::Wait(WaitReason::PriceOutsideBand { .. })
        ));
    }

    #[test]
    fn test_no_candles_waits() {
        let decision = should_enter(&long(), &[], 49500.0, &test_budget());
        assert_eq!(decision, EntryDecision::Wait(WaitReason::NoCandles));
    }

    #[test]
    fn test_candle_limit() {
        let now = Utc::now();
        let five_min = Duration::from_secs(300);

        assert_eq!(candle_limit(now, now, five_min), 1);
        assert_eq!(candle_limit(now - chrono::Duration::minutes(60), now, five_min), 12);
        assert_eq!(candle_limit(now - chrono::Duration::days(30), now, five_min), MAX_CANDLES);
        // Clock skew never produces a zero or negative limit
        assert_eq!(candle_limit(now + chrono::Duration::minutes(10), now, five_min), 1);
    }
}
