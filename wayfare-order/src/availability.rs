use chrono::NaiveDate;
use uuid::Uuid;
use wayfare_catalog::availability::{check_guide, check_rooms, check_seats};
use wayfare_catalog::inventory::stay_dates;
use wayfare_catalog::Availability;
use wayfare_core::reference::RoomType;
use wayfare_core::{CoreError, CoreResult, HoldTag};

use crate::repository::{InventoryRepository, TripRepository};

pub async fn seat_availability<T: TripRepository + ?Sized>(
    tx: &mut T,
    trip_id: Uuid,
    seats: i32,
) -> CoreResult<Availability> {
    let trip = tx
        .trip(trip_id)
        .await?
        .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
    let booked = tx.active_seats(trip_id).await?;
    Ok(check_seats(&trip.seats, booked, seats))
}

pub async fn room_availability<T: InventoryRepository + ?Sized>(
    tx: &mut T,
    room_type: &RoomType,
    check_in: NaiveDate,
    check_out: NaiveDate,
    rooms: i32,
) -> CoreResult<Availability> {
    if check_out <= check_in {
        return Ok(Availability::unavailable("check-out must be after check-in"));
    }
    let dates = stay_dates(check_in, check_out);
    let rows = tx.room_nights(room_type.id, &dates).await?;

    let nights: Vec<(NaiveDate, Option<i32>)> = dates
        .into_iter()
        .map(|date| {
            let available = rows.iter().find(|r| r.date == date).map(|r| r.available_rooms);
            (date, available)
        })
        .collect();
    Ok(check_rooms(room_type, &nights, rooms))
}

pub async fn guide_availability<T: InventoryRepository + ?Sized>(
    tx: &mut T,
    guide_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    exclude: Option<HoldTag>,
) -> CoreResult<Availability> {
    if end <= start {
        return Ok(Availability::unavailable("end date must be after start date"));
    }
    let holds = tx.guide_holds(guide_id, start, end).await?;
    Ok(check_guide(&holds, start, end, exclude))
}
