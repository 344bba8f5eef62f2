use uuid::Uuid;

/// Domain events published after a booking-side transaction commits.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEvent {
    TripCreated {
        trip_id: Uuid,
        creator_id: Uuid,
        trip_type: String,
        price_per_person_cents: i64,
        timestamp: i64,
    },
    TripDeleted {
        trip_id: Uuid,
        timestamp: i64,
    },
    BookingConfirmed {
        booking_id: Uuid,
        order_id: Uuid,
        trip_id: Uuid,
        user_id: Uuid,
        seats: i32,
        total_cents: i64,
        timestamp: i64,
    },
    BookingCancelled {
        booking_id: Uuid,
        order_id: Uuid,
        trip_id: Uuid,
        user_id: Uuid,
        refunded_cents: i64,
        timestamp: i64,
    },
}

impl BookingEvent {
    /// Partition key: every event is keyed by the trip it concerns.
    pub fn trip_id(&self) -> Uuid {
        match self {
            BookingEvent::TripCreated { trip_id, .. }
            | BookingEvent::TripDeleted { trip_id, .. }
            | BookingEvent::BookingConfirmed { trip_id, .. }
            | BookingEvent::BookingCancelled { trip_id, .. } => *trip_id,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged_by_type() {
        let trip_id = Uuid::new_v4();
        let event = BookingEvent::TripDeleted { trip_id, timestamp: 0 };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TRIP_DELETED");
        assert_eq!(event.trip_id(), trip_id);
    }
}
