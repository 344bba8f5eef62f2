use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult};

use crate::availability::seat_availability;
use crate::chat::provision_room;
use crate::manager::OrderManager;
use crate::models::{
    LedgerEntry, Order, OrderItem, PaymentRecord, PaymentStatus, TransactionSource, TripBooking,
};
use crate::repository::BookingTx;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub order_id: Uuid,
    pub trip_id: Uuid,
    pub chat_room_id: Uuid,
    pub seats: i32,
    pub total_cents: i64,
}

/// Pay for `seats` on a trip out of the user's wallet and confirm the booking.
///
/// Runs inside the caller's transaction. Any error leaves nothing behind once
/// the caller drops the transaction.
pub async fn book_trip<T: BookingTx>(
    tx: &mut T,
    reference: &dyn ReferenceData,
    currency: &str,
    user_id: Uuid,
    trip_id: Uuid,
    seats: i32,
) -> CoreResult<BookingReceipt> {
    let trip = tx
        .lock_trip(trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found("trip", trip_id))?;

    // Seat count is re-read under the trip lock
    seat_availability(tx, trip_id, seats).await?.into_result()?;

    let unit_cents = trip.price_per_person_cents;
    let total_cents = unit_cents * seats as i64;

    let movement = tx.debit_wallet(user_id, total_cents).await?;

    let mut order = Order::new(user_id, total_cents, currency);
    OrderManager::confirm(&mut order)?;
    tx.insert_order(&order).await?;

    let item = OrderItem::trip(order.id, &trip, seats);
    tx.insert_order_item(&item).await?;

    let booking = TripBooking {
        id: Uuid::new_v4(),
        trip_id,
        user_id,
        seats,
        total_cents,
        source: trip.source_type(),
        order_id: order.id,
        created_at: Utc::now(),
        cancelled_at: None,
    };
    tx.insert_booking(&booking).await?;

    tx.append_ledger(&LedgerEntry::record(user_id, TransactionSource::Booking, movement, Some(order.id)))
        .await?;
    tx.insert_payment(&PaymentRecord::wallet(user_id, order.id, total_cents, PaymentStatus::Posted))
        .await?;

    let guide_user_id = match trip.guide_id {
        Some(guide_id) => reference.guide(guide_id).await?.map(|g| g.user_id),
        None => None,
    };
    let chat_room_id = provision_room(tx, trip_id, user_id, guide_user_id).await?;

    tracing::info!(
        "Booked {} seats on trip {} for user {} (order {}, {} cents)",
        seats, trip_id, user_id, order.id, total_cents
    );

    Ok(BookingReceipt {
        booking_id: booking.id,
        order_id: order.id,
        trip_id,
        chat_room_id,
        seats,
        total_cents,
    })
}
