pub mod draft;
pub mod geo;
pub mod hold;
pub mod notify;
pub mod reference;
pub mod repository;

pub use draft::{DayPlan, HotelRequest, PoiVisit, SeatPolicy, TripDraft, TripType};
pub use geo::GeoPoint;
pub use hold::{HoldTag, SourceType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Insufficient funds: required {required_cents}, available {available_cents}")]
    InsufficientFunds {
        required_cents: i64,
        available_cents: i64,
    },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("{} {} does not exist", what, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::ValidationError(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
