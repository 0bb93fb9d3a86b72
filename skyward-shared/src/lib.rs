pub mod models;
pub mod pii;

pub use models::events::{SeatEvent, SeatEventKind};
pub use pii::Masked;
