use chrono::{NaiveDate, Utc};
use uuid::Uuid;
use wayfare_catalog::availability::check_guide;
use wayfare_catalog::inventory::stay_dates;
use wayfare_catalog::{GuideHold, RoomReservation};
use wayfare_core::reference::RoomType;
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, HoldTag};

use crate::repository::InventoryRepository;

/// Allocates and releases room-nights and guide calendar blocks by tag.
pub struct InventoryManager;

impl InventoryManager {
    /// Book `rooms` of `room_type` for every night in `[check_in, check_out)`.
    ///
    /// A tag owns at most one room reservation, so a release always undoes
    /// exactly one allocation.
    pub async fn allocate_rooms<T: InventoryRepository + ?Sized>(
        tx: &mut T,
        tag: HoldTag,
        room_type: &RoomType,
        check_in: NaiveDate,
        check_out: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomReservation> {
        if rooms < 1 {
            return Err(CoreError::validation("rooms must be at least 1"));
        }
        if tx.room_reservation(tag).await?.is_some() {
            return Err(CoreError::Conflict(format!("{} already holds a room reservation", tag)));
        }

        for date in stay_dates(check_in, check_out) {
            tx.allocate_room_night(room_type.id, room_type.total_rooms, date, rooms).await?;
        }

        let reservation = RoomReservation {
            id: Uuid::new_v4(),
            tag,
            hotel_id: room_type.hotel_id,
            room_type_id: room_type.id,
            check_in,
            check_out,
            rooms,
            created_at: Utc::now(),
        };
        tx.insert_room_reservation(&reservation).await?;

        tracing::debug!(
            "Allocated {} x {} for {} from {} to {}",
            rooms, room_type.name, tag, check_in, check_out
        );
        Ok(reservation)
    }

    /// Undo the reservation `tag` owns, replaying its recorded dates and count.
    /// Returns `None` when there is nothing to release.
    pub async fn release_rooms<T: InventoryRepository + ?Sized>(
        tx: &mut T,
        reference: &dyn ReferenceData,
        tag: HoldTag,
    ) -> CoreResult<Option<RoomReservation>> {
        let Some(reservation) = tx.room_reservation(tag).await? else {
            return Ok(None);
        };
        let room_type = reference
            .room_type(reservation.room_type_id)
            .await?
            .ok_or_else(|| CoreError::not_found("room type", reservation.room_type_id))?;

        for date in stay_dates(reservation.check_in, reservation.check_out) {
            tx.release_room_night(room_type.id, room_type.total_rooms, date, reservation.rooms)
                .await?;
        }
        tx.delete_room_reservation(tag).await?;

        tracing::debug!("Released {} rooms held by {}", reservation.rooms, tag);
        Ok(Some(reservation))
    }

    /// Block the guide for `[start, end)` under `tag`, replacing any block the
    /// same tag already had.
    pub async fn hold_guide<T: InventoryRepository + ?Sized>(
        tx: &mut T,
        guide_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        tag: HoldTag,
    ) -> CoreResult<GuideHold> {
        tx.lock_guide(guide_id).await?;

        let holds = tx.guide_holds(guide_id, start, end).await?;
        check_guide(&holds, start, end, Some(tag)).into_result()?;

        tx.delete_guide_holds(tag).await?;
        let hold = GuideHold::new(guide_id, start, end, tag);
        tx.insert_guide_hold(&hold).await?;
        Ok(hold)
    }

    pub async fn release_guide<T: InventoryRepository + ?Sized>(tx: &mut T, tag: HoldTag) -> CoreResult<u64> {
        tx.delete_guide_holds(tag).await
    }
}
