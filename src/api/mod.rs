// Exchange access
pub mod binance;
pub mod gateway;

pub use binance::BinanceFuturesClient;
pub use gateway::{usdt_balance, ExchangeGateway};
