//! Turns a quoted draft into persisted trip rows plus the holds it needs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_catalog::{PriceCalculator, PriceQuote, QuoteInputs};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, SeatPolicy, TripDraft, TripType};

use crate::availability::{guide_availability, room_availability};
use crate::chat::delete_room;
use crate::inventory::InventoryManager;
use crate::models::{Trip, TripDay, TripHotel};
use crate::orchestrator::{book_trip, BookingReceipt};
use crate::repository::BookingTx;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTripOptions {
    /// Pay for the whole party in the same transaction. Custom trips only.
    #[serde(default)]
    pub book_now: bool,
    /// Capacity rules for predefined trips.
    pub seat_policy: Option<SeatPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledTrip {
    pub trip: Trip,
    pub quote: PriceQuote,
    pub booking: Option<BookingReceipt>,
}

/// Validate every reference in `draft` and price it.
pub async fn quote_draft(reference: &dyn ReferenceData, draft: &TripDraft) -> CoreResult<(QuoteInputs, PriceQuote)> {
    draft.validate()?;
    let inputs = QuoteInputs::load(reference, draft).await?;
    if let Some(tag_id) = reference.missing_tags(&draft.tag_ids).await?.first() {
        return Err(CoreError::not_found("tag", tag_id));
    }
    let quote = PriceCalculator::quote(draft, &inputs)?;
    Ok((inputs, quote))
}

pub async fn create_trip_from_draft<T: BookingTx>(
    tx: &mut T,
    reference: &dyn ReferenceData,
    currency: &str,
    user_id: Uuid,
    draft: &TripDraft,
    trip_type: TripType,
    options: &CreateTripOptions,
) -> CoreResult<CompiledTrip> {
    if options.book_now && trip_type == TripType::Predefined {
        return Err(CoreError::validation(
            "predefined trips are booked per rider, not at creation",
        ));
    }

    let (inputs, quote) = quote_draft(reference, draft).await?;
    ensure_refund_policy(tx, draft).await?;
    let seats = seat_policy_for(trip_type, draft, options.seat_policy, None)?;

    let trip = Trip::from_draft(user_id, draft, trip_type, seats, &quote);
    tx.insert_trip(&trip).await?;
    tx.replace_itinerary(trip.id, &itinerary_rows(trip.id, draft)).await?;
    tx.replace_trip_hotel(trip.id, hotel_row(trip.id, draft, &quote).as_ref())
        .await?;
    reserve(tx, &trip, draft, &inputs, &quote).await?;

    let booking = if options.book_now {
        Some(book_trip(tx, reference, currency, user_id, trip.id, draft.people).await?)
    } else {
        None
    };

    tracing::info!(
        "Created {} trip {} for {} ({} cents per person)",
        trip_type.as_str(), trip.id, user_id, trip.price_per_person_cents
    );
    Ok(CompiledTrip { trip, quote, booking })
}

/// Re-quote and re-reserve an existing trip. Old holds are released by tag
/// before the new ones are taken, so they pair one-for-one.
pub async fn update_trip_from_draft<T: BookingTx>(
    tx: &mut T,
    reference: &dyn ReferenceData,
    user_id: Uuid,
    trip_id: Uuid,
    draft: &TripDraft,
    seat_policy: Option<SeatPolicy>,
) -> CoreResult<CompiledTrip> {
    let mut trip = tx
        .lock_trip(trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
    if trip.creator_id != user_id {
        return Err(CoreError::Forbidden(format!("trip {} belongs to another user", trip_id)));
    }

    let (inputs, quote) = quote_draft(reference, draft).await?;
    ensure_refund_policy(tx, draft).await?;
    let seats = seat_policy_for(trip.trip_type, draft, seat_policy, Some(trip.seats))?;

    let booked = tx.active_seats(trip.id).await?;
    if (seats.max_people as i64) < booked {
        return Err(CoreError::validation(format!(
            "{} seats are already booked, max people cannot drop to {}",
            booked, seats.max_people
        )));
    }

    let tag = trip.hold_tag();
    InventoryManager::release_guide(tx, tag).await?;
    InventoryManager::release_rooms(tx, reference, tag).await?;

    trip.apply_draft(draft, seats, &quote);
    reserve(tx, &trip, draft, &inputs, &quote).await?;
    tx.update_trip(&trip).await?;
    tx.replace_itinerary(trip.id, &itinerary_rows(trip.id, draft)).await?;
    tx.replace_trip_hotel(trip.id, hotel_row(trip.id, draft, &quote).as_ref())
        .await?;

    tracing::info!("Updated trip {} ({} cents per person)", trip.id, trip.price_per_person_cents);
    Ok(CompiledTrip { trip, quote, booking: None })
}

/// Remove a trip nobody holds seats on, together with its holds and chat room.
pub async fn delete_trip<T: BookingTx>(
    tx: &mut T,
    reference: &dyn ReferenceData,
    user_id: Uuid,
    trip_id: Uuid,
) -> CoreResult<Trip> {
    let trip = tx
        .lock_trip(trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
    if trip.creator_id != user_id {
        return Err(CoreError::Forbidden(format!("trip {} belongs to another user", trip_id)));
    }
    let booked = tx.active_seats(trip.id).await?;
    if booked > 0 {
        return Err(CoreError::Conflict(format!(
            "trip {} still has {} booked seats",
            trip_id, booked
        )));
    }

    let tag = trip.hold_tag();
    InventoryManager::release_guide(tx, tag).await?;
    InventoryManager::release_rooms(tx, reference, tag).await?;
    delete_room(tx, trip.id).await?;
    tx.delete_trip(trip.id).await?;

    tracing::info!("Deleted trip {}", trip.id);
    Ok(trip)
}

async fn ensure_refund_policy<T: BookingTx>(tx: &mut T, draft: &TripDraft) -> CoreResult<()> {
    if let Some(policy_id) = draft.refund_policy_id {
        if tx.refund_policy(policy_id).await?.is_none() {
            return Err(CoreError::not_found("refund policy", policy_id));
        }
    }
    Ok(())
}

/// Custom trips seat exactly the drafted party. Predefined trips take the
/// requested policy, then `fallback`, then one to `people` seats per rider.
fn seat_policy_for(
    trip_type: TripType,
    draft: &TripDraft,
    requested: Option<SeatPolicy>,
    fallback: Option<SeatPolicy>,
) -> CoreResult<SeatPolicy> {
    let policy = match trip_type {
        TripType::Custom => {
            let exact = SeatPolicy::exact(draft.people);
            if requested.is_some_and(|p| p != exact) {
                return Err(CoreError::validation(
                    "custom trips seat exactly the drafted party",
                ));
            }
            exact
        }
        TripType::Predefined => requested.or(fallback).unwrap_or(SeatPolicy {
            min_people: 1,
            max_people: draft.people,
            min_seats_per_user: 1,
            max_seats_per_user: draft.people,
        }),
    };
    policy.validate()?;
    if policy.max_people > draft.people {
        return Err(CoreError::validation(format!(
            "seat policy allows {} people but the trip is priced and reserved for {}",
            policy.max_people, draft.people
        )));
    }
    Ok(policy)
}

/// Guide and room holds for the trip's service window, tagged to the trip.
async fn reserve<T: BookingTx>(
    tx: &mut T,
    trip: &Trip,
    draft: &TripDraft,
    inputs: &QuoteInputs,
    quote: &PriceQuote,
) -> CoreResult<()> {
    let tag = trip.hold_tag();
    let start = draft.start_date;
    let end = draft.service_end();

    if let Some(guide_id) = draft.guide_id {
        guide_availability(tx, guide_id, start, end, Some(tag))
            .await?
            .into_result()?;
        InventoryManager::hold_guide(tx, guide_id, start, end, tag).await?;
    }

    if let (Some(request), Some(room_type)) = (draft.lodging(), inputs.room_type.as_ref()) {
        let rooms = quote.rooms_used.unwrap_or(request.rooms_requested);
        room_availability(tx, room_type, start, end, rooms)
            .await?
            .into_result()?;
        InventoryManager::allocate_rooms(tx, tag, room_type, start, end, rooms).await?;
    }
    Ok(())
}

fn itinerary_rows(trip_id: Uuid, draft: &TripDraft) -> Vec<TripDay> {
    let mut days: Vec<TripDay> = draft.days.iter().map(|d| TripDay::from_plan(trip_id, d)).collect();
    days.sort_by_key(|d| d.day_number);
    days
}

fn hotel_row(trip_id: Uuid, draft: &TripDraft, quote: &PriceQuote) -> Option<TripHotel> {
    let request = draft.lodging()?;
    Some(TripHotel {
        trip_id,
        hotel_id: request.hotel_id,
        room_type_id: request.room_type_id?,
        rooms_needed: quote.rooms_used.unwrap_or(request.rooms_requested),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn draft(people: i32) -> TripDraft {
        TripDraft {
            city_id: Uuid::new_v4(),
            name: "Aswan loop".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 9, 4).unwrap(),
            people,
            with_meals: false,
            with_transport: false,
            hotel_included: false,
            days: vec![],
            hotels: vec![],
            guide_id: None,
            meet_point: None,
            drop_point: None,
            tag_ids: vec![],
            refund_policy_id: None,
            attachments: vec![],
        }
    }

    #[test]
    fn test_custom_trips_seat_the_party() {
        let policy = seat_policy_for(TripType::Custom, &draft(3), None, None).unwrap();
        assert_eq!(policy, SeatPolicy::exact(3));

        let other = SeatPolicy { min_people: 1, max_people: 3, min_seats_per_user: 1, max_seats_per_user: 1 };
        assert!(seat_policy_for(TripType::Custom, &draft(3), Some(other), None).is_err());
    }

    #[test]
    fn test_predefined_policy_resolution() {
        let d = draft(12);
        let default = seat_policy_for(TripType::Predefined, &d, None, None).unwrap();
        assert_eq!(default.max_people, 12);
        assert_eq!(default.min_seats_per_user, 1);

        let existing = SeatPolicy { min_people: 4, max_people: 10, min_seats_per_user: 1, max_seats_per_user: 2 };
        assert_eq!(seat_policy_for(TripType::Predefined, &d, None, Some(existing)).unwrap(), existing);

        let too_big = SeatPolicy { min_people: 1, max_people: 20, min_seats_per_user: 1, max_seats_per_user: 2 };
        assert!(seat_policy_for(TripType::Predefined, &d, Some(too_big), None).is_err());
    }
}
