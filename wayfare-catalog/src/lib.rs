pub mod availability;
pub mod inventory;
pub mod pricing;

pub use availability::Availability;
pub use inventory::{GuideHold, InventoryError, RoomNight, RoomReservation};
pub use pricing::{PriceCalculator, PriceQuote, QuoteInputs};
