pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod error;
pub mod events;
pub mod reference_repo;

pub use booking_repo::{PgBookingTx, PgStore};
pub use database::DbClient;
pub use events::EventProducer;
pub use reference_repo::PgReferenceData;
