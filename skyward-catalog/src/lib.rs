pub mod pricing;
pub mod inventory;

pub use pricing::{FareCalculator, FareQuote, PricingConfig};
pub use inventory::{InventoryError, SeatInventory};
