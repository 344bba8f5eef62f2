//! Pure availability rules. Callers fetch the rows; these functions decide.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wayfare_core::reference::RoomType;
use wayfare_core::{CoreError, CoreResult, HoldTag, SeatPolicy};

use crate::inventory::GuideHold;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Availability {
    pub fn ok() -> Self {
        Self { available: true, message: None }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self { available: false, message: Some(message.into()) }
    }

    /// Turn a negative answer into a validation error carrying the message.
    pub fn into_result(self) -> CoreResult<()> {
        if self.available {
            Ok(())
        } else {
            Err(CoreError::ValidationError(
                self.message.unwrap_or_else(|| "not available".to_string()),
            ))
        }
    }
}

/// Requested seats must sit inside the per-user bounds and fit in what is left.
pub fn check_seats(policy: &SeatPolicy, booked_seats: i64, requested: i32) -> Availability {
    if requested < policy.min_seats_per_user || requested > policy.max_seats_per_user {
        return Availability::unavailable(format!(
            "seats must be between {} and {} per booking, got {}",
            policy.min_seats_per_user, policy.max_seats_per_user, requested
        ));
    }
    let remaining = policy.max_people as i64 - booked_seats;
    if requested as i64 > remaining {
        return Availability::unavailable(format!(
            "only {} of {} seats left, {} requested",
            remaining.max(0),
            policy.max_people,
            requested
        ));
    }
    Availability::ok()
}

/// `nights` pairs each stay date with its inventory row's available count, if a
/// row exists. Missing rows mean the room type is fully free that night.
pub fn check_rooms(
    room_type: &RoomType,
    nights: &[(NaiveDate, Option<i32>)],
    rooms_needed: i32,
) -> Availability {
    if !room_type.is_active {
        return Availability::unavailable(format!("room type {} is not active", room_type.name));
    }
    for (date, available) in nights {
        let available = available.unwrap_or(room_type.total_rooms);
        if available < rooms_needed {
            return Availability::unavailable(format!(
                "only {} {} rooms available on {}, {} needed",
                available, room_type.name, date, rooms_needed
            ));
        }
    }
    Availability::ok()
}

/// Strict half-open overlap: `a_start < b_end && a_end > b_start`.
pub fn overlaps(a_start: NaiveDate, a_end: NaiveDate, b_start: NaiveDate, b_end: NaiveDate) -> bool {
    a_start < b_end && a_end > b_start
}

/// A guide is busy if any hold not owned by `exclude` overlaps `[start, end)`.
pub fn check_guide(
    holds: &[GuideHold],
    start: NaiveDate,
    end: NaiveDate,
    exclude: Option<HoldTag>,
) -> Availability {
    let clash = holds
        .iter()
        .filter(|h| Some(h.tag) != exclude)
        .find(|h| overlaps(h.start_date, h.end_date, start, end));

    match clash {
        Some(hold) => Availability::unavailable(format!(
            "guide is already booked from {} to {}",
            hold.start_date, hold.end_date
        )),
        None => Availability::ok(),
    }
}
