// Capital budget and position sizing
pub mod budget;
pub mod sizer;

pub use budget::{CapitalBudget, PriceBounds};
pub use sizer::{size_position, to_precision};
