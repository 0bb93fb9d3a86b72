pub mod booking;
pub mod clock;
pub mod flight;
pub mod identity;
pub mod payment;
pub mod repository;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Expired: {0}")]
    Expired(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Seat unavailable: {0}")]
    SeatUnavailable(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    /// Seat, payment and state-machine collisions all surface as conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict(_) | CoreError::SeatUnavailable(_) | CoreError::InvalidTransition { .. }
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
