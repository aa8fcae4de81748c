// Entry evaluation
pub mod entry;

pub use entry::{candle_limit, check_price_band, check_trend, should_enter, EntryDecision, WaitReason};
