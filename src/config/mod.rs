// Configuration loading and validation
pub mod loader;
pub mod types;

pub use loader::load_settings;
pub use types::{
    BudgetSettings, ExchangeSettings, ProtectionSettings, ScheduleSettings, Settings,
    StorageSettings,
};
