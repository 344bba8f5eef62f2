use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_core::{CoreError, HoldTag};

/// Per-date room inventory for one room type.
///
/// Invariant: `available_rooms == total_rooms - booked_rooms` and
/// `0 <= available_rooms <= total_rooms`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomNight {
    pub room_type_id: Uuid,
    pub date: NaiveDate,
    pub total_rooms: i32,
    pub booked_rooms: i32,
    pub available_rooms: i32,
}

impl RoomNight {
    /// A row that has never been allocated against: everything is free.
    pub fn fresh(room_type_id: Uuid, date: NaiveDate, total_rooms: i32) -> Self {
        Self {
            room_type_id,
            date,
            total_rooms,
            booked_rooms: 0,
            available_rooms: total_rooms,
        }
    }

    /// Book `rooms`; refuses to drive availability below zero.
    pub fn allocate(&mut self, rooms: i32) -> Result<(), InventoryError> {
        if rooms < 1 {
            return Err(InventoryError::InvalidQuantity(rooms));
        }
        if self.available_rooms < rooms {
            return Err(InventoryError::InsufficientInventory {
                date: self.date,
                requested: rooms,
                available: self.available_rooms,
            });
        }
        self.booked_rooms += rooms;
        self.available_rooms -= rooms;
        Ok(())
    }

    /// Give back `rooms`, clamped to `[0, total_rooms]`.
    pub fn release(&mut self, rooms: i32) {
        self.booked_rooms = (self.booked_rooms - rooms.max(0)).clamp(0, self.total_rooms);
        self.available_rooms = self.total_rooms - self.booked_rooms;
    }

    pub fn is_consistent(&self) -> bool {
        self.available_rooms >= 0
            && self.available_rooms <= self.total_rooms
            && self.available_rooms + self.booked_rooms == self.total_rooms
    }
}

/// Every night in `[check_in, check_out)`.
pub fn stay_dates(check_in: NaiveDate, check_out: NaiveDate) -> Vec<NaiveDate> {
    let nights = (check_out - check_in).num_days().max(0);
    (0..nights).map(|i| check_in + Duration::days(i)).collect()
}

/// A booked date range spanning many `RoomNight` rows, owned by one tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomReservation {
    pub id: Uuid,
    pub tag: HoldTag,
    pub hotel_id: Uuid,
    pub room_type_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub rooms: i32,
    pub created_at: DateTime<Utc>,
}

/// A guide calendar block `[start_date, end_date)` owned by one tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuideHold {
    pub id: Uuid,
    pub guide_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tag: HoldTag,
}

impl GuideHold {
    pub fn new(guide_id: Uuid, start_date: NaiveDate, end_date: NaiveDate, tag: HoldTag) -> Self {
        Self { id: Uuid::new_v4(), guide_id, start_date, end_date, tag }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Insufficient rooms on {date}: requested {requested}, available {available}")]
    InsufficientInventory {
        date: NaiveDate,
        requested: i32,
        available: i32,
    },

    #[error("Room quantity must be positive, got {0}")]
    InvalidQuantity(i32),
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}
