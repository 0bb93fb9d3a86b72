pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod flight_repo;
pub mod memory;
pub mod redis_repo;
pub mod user_repo;

pub use booking_repo::PostgresBookingRepository;
pub use database::DbClient;
pub use flight_repo::PostgresFlightRepository;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use user_repo::PostgresUserRepository;

use skyward_core::CoreError;

/// Driver failures carry no domain meaning
pub(crate) fn internal<E: std::fmt::Display>(err: E) -> CoreError {
    CoreError::InternalError(err.to_string())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
