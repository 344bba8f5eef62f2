use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripType {
    /// One party, booked atomically with creation.
    Custom,
    /// Shared capacity, booked per rider.
    Predefined,
}

impl TripType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripType::Custom => "CUSTOM",
            TripType::Predefined => "PREDEFINED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CUSTOM" => Some(TripType::Custom),
            "PREDEFINED" => Some(TripType::Predefined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoiVisit {
    pub poi_id: Uuid,
    pub visit_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayPlan {
    pub day_number: i32,
    #[serde(default)]
    pub pois: Vec<PoiVisit>,
}

impl DayPlan {
    /// Visits sorted by `visit_order`.
    pub fn ordered_visits(&self) -> Vec<PoiVisit> {
        let mut visits = self.pois.clone();
        visits.sort_by_key(|v| v.visit_order);
        visits
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HotelRequest {
    pub hotel_id: Uuid,
    pub room_type_id: Option<Uuid>,
    #[serde(default = "default_rooms")]
    pub rooms_requested: i32,
}

fn default_rooms() -> i32 {
    1
}

/// An unpersisted trip specification, used to obtain a quote before any commitment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripDraft {
    pub city_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub people: i32,
    #[serde(default)]
    pub with_meals: bool,
    #[serde(default)]
    pub with_transport: bool,
    #[serde(default)]
    pub hotel_included: bool,
    #[serde(default)]
    pub days: Vec<DayPlan>,
    /// At most one entry is accepted.
    #[serde(default)]
    pub hotels: Vec<HotelRequest>,
    pub guide_id: Option<Uuid>,
    pub meet_point: Option<GeoPoint>,
    pub drop_point: Option<GeoPoint>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub refund_policy_id: Option<Uuid>,
    /// References into the external file store.
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl TripDraft {
    /// `max(1, end - start)` in whole days.
    pub fn nights(&self) -> i64 {
        (self.end_date - self.start_date).num_days().max(1)
    }

    /// Exclusive end of the service window: `start + nights`. Room nights and
    /// guide holds both cover `[start_date, service_end())`.
    pub fn service_end(&self) -> NaiveDate {
        self.start_date + Duration::days(self.nights())
    }

    pub fn hotel(&self) -> Option<&HotelRequest> {
        self.hotels.first()
    }

    /// The hotel request that actually drives lodging and room holds.
    pub fn lodging(&self) -> Option<&HotelRequest> {
        if self.hotel_included {
            self.hotel()
        } else {
            None
        }
    }

    /// Distinct POI ids across all days, in first-seen order.
    pub fn poi_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.days
            .iter()
            .flat_map(|d| d.pois.iter())
            .filter(|v| seen.insert(v.poi_id))
            .map(|v| v.poi_id)
            .collect()
    }

    /// Structural validation that needs no reference data.
    pub fn validate(&self) -> CoreResult<()> {
        if self.end_date < self.start_date {
            return Err(CoreError::validation("end date must not be before start date"));
        }
        if self.people < 1 {
            return Err(CoreError::validation("people must be at least 1"));
        }
        if self.hotels.len() > 1 {
            return Err(CoreError::validation("a trip may include at most one hotel"));
        }
        if let Some(hotel) = self.hotel() {
            if hotel.room_type_id.is_none() {
                return Err(CoreError::validation("hotel specified without a room type"));
            }
            if hotel.rooms_requested < 1 {
                return Err(CoreError::validation("rooms requested must be at least 1"));
            }
        }

        let mut day_numbers = HashSet::new();
        for day in &self.days {
            if day.day_number < 1 {
                return Err(CoreError::validation("day numbers start at 1"));
            }
            if !day_numbers.insert(day.day_number) {
                return Err(CoreError::validation(format!("day {} listed twice", day.day_number)));
            }
            let mut orders = HashSet::new();
            for visit in &day.pois {
                if !orders.insert(visit.visit_order) {
                    return Err(CoreError::validation(format!(
                        "visit order {} repeated on day {}",
                        visit.visit_order, day.day_number
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Capacity rules of a trip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatPolicy {
    pub min_people: i32,
    pub max_people: i32,
    pub min_seats_per_user: i32,
    pub max_seats_per_user: i32,
}

impl SeatPolicy {
    /// A private party: exactly `people` seats, taken by a single booking.
    pub fn exact(people: i32) -> Self {
        Self {
            min_people: people,
            max_people: people,
            min_seats_per_user: people,
            max_seats_per_user: people,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.min_people < 1 || self.min_people > self.max_people {
            return Err(CoreError::validation("people bounds must satisfy 1 <= min <= max"));
        }
        if self.min_seats_per_user < 1 || self.min_seats_per_user > self.max_seats_per_user {
            return Err(CoreError::validation(
                "seats per user must satisfy 1 <= min <= max",
            ));
        }
        if self.max_seats_per_user > self.max_people {
            return Err(CoreError::validation(
                "seats per user cannot exceed the trip's max people",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(start: NaiveDate, end: NaiveDate) -> TripDraft {
        TripDraft {
            city_id: Uuid::new_v4(),
            name: "Nile weekend".to_string(),
            start_date: start,
            end_date: end,
            people: 2,
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

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_nights_has_floor_of_one() {
        assert_eq!(draft(date(1), date(5)).nights(), 4);
        assert_eq!(draft(date(1), date(1)).nights(), 1);
        assert_eq!(draft(date(1), date(1)).service_end(), date(2));
        assert_eq!(draft(date(1), date(5)).service_end(), date(5));
    }

    #[test]
    fn test_rejects_reversed_dates() {
        let err = draft(date(5), date(1)).validate().unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_hotel_without_room_type() {
        let mut d = draft(date(1), date(3));
        d.hotels.push(HotelRequest { hotel_id: Uuid::new_v4(), room_type_id: None, rooms_requested: 1 });
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_two_hotels() {
        let mut d = draft(date(1), date(3));
        let h = HotelRequest { hotel_id: Uuid::new_v4(), room_type_id: Some(Uuid::new_v4()), rooms_requested: 1 };
        d.hotels = vec![h, h];
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_visit_order() {
        let mut d = draft(date(1), date(3));
        d.days.push(DayPlan {
            day_number: 1,
            pois: vec![
                PoiVisit { poi_id: Uuid::new_v4(), visit_order: 1 },
                PoiVisit { poi_id: Uuid::new_v4(), visit_order: 1 },
            ],
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_poi_ids_are_distinct() {
        let shared = Uuid::new_v4();
        let mut d = draft(date(1), date(3));
        d.days = vec![
            DayPlan { day_number: 1, pois: vec![PoiVisit { poi_id: shared, visit_order: 1 }] },
            DayPlan { day_number: 2, pois: vec![PoiVisit { poi_id: shared, visit_order: 1 }] },
        ];
        assert_eq!(d.poi_ids(), vec![shared]);
    }

    #[test]
    fn test_seat_policy_bounds() {
        assert!(SeatPolicy::exact(4).validate().is_ok());
        let bad = SeatPolicy { min_people: 2, max_people: 10, min_seats_per_user: 3, max_seats_per_user: 2 };
        assert!(bad.validate().is_err());
        let too_many = SeatPolicy { min_people: 1, max_people: 4, min_seats_per_user: 1, max_seats_per_user: 5 };
        assert!(too_many.validate().is_err());
    }
}
