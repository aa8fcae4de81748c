// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod risk;
pub mod store;
pub mod strategy;

// Re-export commonly used types
pub use api::{BinanceFuturesClient, ExchangeGateway};
pub use execution::LifecycleController;
pub use models::*;
