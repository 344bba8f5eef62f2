//! Storage contracts for the booking engine.
//!
//! Every method runs against an open transaction. Composite operations take a
//! `&mut` transaction handle and never open one themselves; the service layer
//! begins exactly one per call and commits it on success. Dropping a
//! transaction without committing rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use wayfare_catalog::{GuideHold, RoomNight, RoomReservation};
use wayfare_core::{CoreResult, HoldTag};

use crate::models::{
    ChatRole, LedgerEntry, Order, OrderItem, OrderStatus, PaymentRecord, RefundPolicy, Trip,
    TripBooking, TripDay, TripHotel, WalletMovement,
};

#[async_trait]
pub trait TripRepository: Send {
    async fn insert_trip(&mut self, trip: &Trip) -> CoreResult<()>;

    async fn update_trip(&mut self, trip: &Trip) -> CoreResult<()>;

    async fn trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>>;

    /// Same as `trip`, but serializes later writers on this trip until commit.
    async fn lock_trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>>;

    /// Removes the trip with its itinerary and hotel rows.
    async fn delete_trip(&mut self, id: Uuid) -> CoreResult<()>;

    async fn replace_itinerary(&mut self, trip_id: Uuid, days: &[TripDay]) -> CoreResult<()>;

    async fn itinerary(&mut self, trip_id: Uuid) -> CoreResult<Vec<TripDay>>;

    async fn replace_trip_hotel(&mut self, trip_id: Uuid, hotel: Option<&TripHotel>) -> CoreResult<()>;

    async fn trip_hotel(&mut self, trip_id: Uuid) -> CoreResult<Option<TripHotel>>;

    async fn insert_booking(&mut self, booking: &TripBooking) -> CoreResult<()>;

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<TripBooking>>;

    /// Sum of seats over bookings with no `cancelled_at`.
    async fn active_seats(&mut self, trip_id: Uuid) -> CoreResult<i64>;

    async fn cancel_booking(&mut self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()>;

    async fn refund_policy(&mut self, id: Uuid) -> CoreResult<Option<RefundPolicy>>;
}

#[async_trait]
pub trait InventoryRepository: Send {
    /// Existing rows among `dates`; dates with no row are omitted.
    async fn room_nights(&mut self, room_type_id: Uuid, dates: &[NaiveDate]) -> CoreResult<Vec<RoomNight>>;

    /// Book `rooms` on one date, creating the row from `total_rooms` if absent.
    /// Fails with a validation error instead of driving availability below zero.
    async fn allocate_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight>;

    /// Give back `rooms` on one date, clamped. Creates a full row if absent.
    async fn release_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight>;

    async fn room_reservation(&mut self, tag: HoldTag) -> CoreResult<Option<RoomReservation>>;

    async fn insert_room_reservation(&mut self, reservation: &RoomReservation) -> CoreResult<()>;

    async fn delete_room_reservation(&mut self, tag: HoldTag) -> CoreResult<()>;

    /// Serializes guide-calendar writers for `guide_id` until commit.
    async fn lock_guide(&mut self, guide_id: Uuid) -> CoreResult<()>;

    /// Holds for `guide_id` overlapping `[start, end)`.
    async fn guide_holds(&mut self, guide_id: Uuid, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<GuideHold>>;

    async fn insert_guide_hold(&mut self, hold: &GuideHold) -> CoreResult<()>;

    /// Deletes holds carrying exactly `tag`; returns how many went.
    async fn delete_guide_holds(&mut self, tag: HoldTag) -> CoreResult<u64>;
}

#[async_trait]
pub trait LedgerRepository: Send {
    /// Compare-and-update: succeeds only if the balance covers `amount_cents`.
    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement>;

    async fn credit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement>;

    async fn wallet_balance(&mut self, user_id: Uuid) -> CoreResult<Option<i64>>;

    async fn insert_order(&mut self, order: &Order) -> CoreResult<()>;

    async fn order(&mut self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> CoreResult<()>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> CoreResult<()>;

    async fn order_items(&mut self, order_id: Uuid) -> CoreResult<Vec<OrderItem>>;

    async fn record_item_refund(&mut self, item_id: Uuid, refunded_cents: i64) -> CoreResult<()>;

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> CoreResult<()>;

    /// Ledger rows for `user_id`, oldest first.
    async fn ledger(&mut self, user_id: Uuid) -> CoreResult<Vec<LedgerEntry>>;

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> CoreResult<()>;
}

#[async_trait]
pub trait ChatRepository: Send {
    async fn chat_room_for_trip(&mut self, trip_id: Uuid) -> CoreResult<Option<Uuid>>;

    async fn create_chat_room(&mut self, trip_id: Uuid) -> CoreResult<Uuid>;

    /// Idempotent; returns false if the member was already present.
    async fn add_chat_member(&mut self, room_id: Uuid, user_id: Uuid, role: ChatRole) -> CoreResult<bool>;

    async fn remove_chat_member(&mut self, room_id: Uuid, user_id: Uuid) -> CoreResult<()>;

    async fn chat_member_count(&mut self, room_id: Uuid) -> CoreResult<i64>;

    /// Cascades to membership and messages.
    async fn delete_chat_room(&mut self, room_id: Uuid) -> CoreResult<()>;

    /// Ids from `ids` that belong to an existing account.
    async fn existing_users(&mut self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>>;

    async fn admin_user_ids(&mut self) -> CoreResult<Vec<Uuid>>;
}

/// One open unit of work.
#[async_trait]
pub trait BookingTx: TripRepository + InventoryRepository + LedgerRepository + ChatRepository + Send {
    async fn commit(self) -> CoreResult<()>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    type Tx: BookingTx;

    async fn begin(&self) -> CoreResult<Self::Tx>;
}
