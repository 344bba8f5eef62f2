pub mod availability;
pub mod cancellation;
pub mod chat;
pub mod compiler;
pub mod inventory;
pub mod manager;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod refund;
pub mod repository;
pub mod service;

pub use cancellation::CancellationReceipt;
pub use compiler::{CompiledTrip, CreateTripOptions};
pub use inventory::InventoryManager;
pub use manager::{OrderError, OrderManager};
pub use models::{Order, OrderItem, OrderStatus, Trip, TripBooking, WalletStatement};
pub use orchestrator::BookingReceipt;
pub use refund::RefundSchedule;
pub use repository::{BookingStore, BookingTx};
pub use service::{BookingOperations, BookingService, BookingSettings};
