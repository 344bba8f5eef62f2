//! Chat room and membership provisioning around bookings. Message transport
//! lives elsewhere.

use std::collections::HashSet;
use uuid::Uuid;
use wayfare_core::{CoreResult, TripType};

use crate::models::ChatRole;
use crate::repository::ChatRepository;

/// Make sure the trip's room exists and holds the customer, the guide and every
/// admin. Safe to repeat; user ids with no account are skipped.
pub async fn provision_room<T: ChatRepository + ?Sized>(
    tx: &mut T,
    trip_id: Uuid,
    customer_id: Uuid,
    guide_user_id: Option<Uuid>,
) -> CoreResult<Uuid> {
    let room_id = match tx.chat_room_for_trip(trip_id).await? {
        Some(id) => id,
        None => tx.create_chat_room(trip_id).await?,
    };

    let mut candidates = vec![(customer_id, ChatRole::Customer)];
    if let Some(guide_user) = guide_user_id {
        candidates.push((guide_user, ChatRole::Guide));
    }
    for admin in tx.admin_user_ids().await? {
        candidates.push((admin, ChatRole::Admin));
    }

    let ids: Vec<Uuid> = candidates.iter().map(|(id, _)| *id).collect();
    let existing: HashSet<Uuid> = tx.existing_users(&ids).await?.into_iter().collect();

    let mut seen = HashSet::new();
    for (user_id, role) in candidates {
        if !seen.insert(user_id) {
            continue;
        }
        if !existing.contains(&user_id) {
            tracing::debug!("Skipping chat member {}: no such user", user_id);
            continue;
        }
        tx.add_chat_member(room_id, user_id, role).await?;
    }
    Ok(room_id)
}

/// Custom trips lose their room; predefined trips lose only this member, and
/// the room too once nobody is left.
pub async fn leave_room<T: ChatRepository + ?Sized>(
    tx: &mut T,
    trip_id: Uuid,
    trip_type: TripType,
    user_id: Uuid,
) -> CoreResult<()> {
    let Some(room_id) = tx.chat_room_for_trip(trip_id).await? else {
        return Ok(());
    };
    match trip_type {
        TripType::Custom => tx.delete_chat_room(room_id).await,
        TripType::Predefined => {
            tx.remove_chat_member(room_id, user_id).await?;
            if tx.chat_member_count(room_id).await? == 0 {
                tx.delete_chat_room(room_id).await?;
            }
            Ok(())
        }
    }
}

pub async fn delete_room<T: ChatRepository + ?Sized>(tx: &mut T, trip_id: Uuid) -> CoreResult<()> {
    if let Some(room_id) = tx.chat_room_for_trip(trip_id).await? {
        tx.delete_chat_room(room_id).await?;
    }
    Ok(())
}
