pub mod drafts;
pub mod events;
pub mod ledger;
pub mod payment;
pub mod reference;
pub mod seats;

#[cfg(test)]
mod testing;

pub use drafts::PassengerDrafts;
pub use events::SeatEvents;
pub use ledger::{BookingLedger, CreateBooking};
pub use payment::{PaymentRecorder, SimulatedGateway};
pub use reference::{RandomReferences, ReferenceGenerator, ReferenceSource};
pub use seats::SeatAllocator;
