// Order placement and signal lifecycle
pub mod controller;
pub mod executor;
pub mod orders;
pub mod protection;

pub use controller::{
    validate_signal, BudgetContext, ForceCloseReport, LifecycleController, PassSummary, Transition,
};
pub use executor::{
    entry_client_order_id, plan_bracket, BracketError, BracketPlan, BracketTicket, OrderExecutor,
};
pub use orders::{OrderSpec, OrderSpecError};
pub use protection::{LegHandle, LegOutcome, ProtectionPolicy, ProtectionQueue};
