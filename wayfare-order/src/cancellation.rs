use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, TripType};

use crate::chat::leave_room;
use crate::inventory::InventoryManager;
use crate::manager::OrderManager;
use crate::models::{LedgerEntry, PaymentRecord, PaymentStatus, TransactionSource, TRIP_ITEM};
use crate::refund::RefundSchedule;
use crate::repository::BookingTx;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationReceipt {
    pub booking_id: Uuid,
    pub order_id: Uuid,
    pub trip_id: Uuid,
    pub refund_percent: u8,
    pub refunded_cents: i64,
}

/// Cancel a booking on or before the trip's start date and refund by tier.
///
/// `now` is both the recorded cancellation time and the clock the refund
/// tier is read from.
///
/// Tiers come from the refund policy the booking was sold under, falling back
/// to the trip's policy and then to `default_tiers`. Custom trips also give
/// back their guide and room holds.
pub async fn cancel_trip_booking<T: BookingTx>(
    tx: &mut T,
    reference: &dyn ReferenceData,
    default_tiers: &RefundSchedule,
    user_id: Uuid,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> CoreResult<CancellationReceipt> {
    let today = now.date_naive();
    let booking = tx
        .booking(booking_id)
        .await?
        .ok_or_else(|| CoreError::not_found("booking", booking_id))?;
    if !booking.is_active() {
        return Err(CoreError::Conflict(format!("booking {} is already cancelled", booking_id)));
    }
    if booking.user_id != user_id {
        return Err(CoreError::Forbidden(format!("booking {} belongs to another user", booking_id)));
    }

    let trip = tx
        .lock_trip(booking.trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found("trip", booking.trip_id))?;
    if today > trip.start_date {
        return Err(CoreError::validation(format!(
            "trip started on {}, cancellation window is closed",
            trip.start_date
        )));
    }

    tx.cancel_booking(booking.id, now).await?;
    let mut order = tx
        .order(booking.order_id)
        .await?
        .ok_or_else(|| CoreError::not_found("order", booking.order_id))?;
    OrderManager::cancel(&mut order)?;
    tx.update_order_status(order.id, order.status).await?;

    let item = tx
        .order_items(order.id)
        .await?
        .into_iter()
        .find(|i| i.product_type == TRIP_ITEM && i.product_id == trip.id);

    let policy_id = item
        .as_ref()
        .and_then(|i| i.refund_policy_id)
        .or(trip.refund_policy_id);
    let schedule = match policy_id {
        Some(id) => match tx.refund_policy(id).await? {
            Some(policy) => RefundSchedule::from_policy(&policy)?,
            None => {
                tracing::warn!("Refund policy {} not found, using default tiers", id);
                default_tiers.clone()
            }
        },
        None => default_tiers.clone(),
    };

    let days_before = (trip.start_date - today).num_days();
    let refund_percent = schedule.percent_for(days_before);
    let refunded_cents = schedule.refund_cents(booking.total_cents, days_before);

    if let Some(item) = &item {
        tx.record_item_refund(item.id, refunded_cents).await?;
    }

    if refunded_cents > 0 {
        let movement = tx.credit_wallet(user_id, refunded_cents).await?;
        tx.append_ledger(&LedgerEntry::record(user_id, TransactionSource::Refund, movement, Some(order.id)))
            .await?;
        tx.insert_payment(&PaymentRecord::wallet(user_id, order.id, refunded_cents, PaymentStatus::Refunded))
            .await?;
    }

    leave_room(tx, trip.id, trip.trip_type, user_id).await?;

    if trip.trip_type == TripType::Custom {
        let tag = trip.hold_tag();
        InventoryManager::release_guide(tx, tag).await?;
        InventoryManager::release_rooms(tx, reference, tag).await?;
    }

    tracing::info!(
        "Cancelled booking {} on trip {}: {} days out, refunded {}% ({} cents)",
        booking.id, trip.id, days_before, refund_percent, refunded_cents
    );

    Ok(CancellationReceipt {
        booking_id: booking.id,
        order_id: order.id,
        trip_id: trip.id,
        refund_percent,
        refunded_cents,
    })
}
