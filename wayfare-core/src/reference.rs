//! Read-only reference records owned by the catalog CRUD side of the system.
//! The booking engine only ever looks them up by id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct City {
    pub id: Uuid,
    pub name: String,
    /// Default per-person meal price for one day.
    pub avg_meal_price_cents: i64,
}

/// Rates that change over time; the latest recorded value wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CityRates {
    pub latest_meal_price_cents: Option<i64>,
    pub latest_transport_price_per_km_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hotel {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomType {
    pub id: Uuid,
    pub hotel_id: Uuid,
    pub name: String,
    /// Guests per room.
    pub capacity: i32,
    /// Physical rooms of this type, per night.
    pub total_rooms: i32,
    pub base_nightly_rate_cents: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Poi {
    pub id: Uuid,
    pub city_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub discount_price_cents: Option<i64>,
    pub location: Option<GeoPoint>,
}

impl Poi {
    /// Discount applies only when it is non-negative and strictly below the base price.
    pub fn unit_price_cents(&self) -> i64 {
        match self.discount_price_cents {
            Some(discount) if discount >= 0 && discount < self.price_cents => discount,
            _ => self.price_cents,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guide {
    pub id: Uuid,
    /// The account the guide logs in with; used for chat membership.
    pub user_id: Uuid,
    pub name: String,
    pub price_per_day_cents: i64,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poi(price: i64, discount: Option<i64>) -> Poi {
        Poi {
            id: Uuid::new_v4(),
            city_id: Uuid::new_v4(),
            name: "Citadel".to_string(),
            price_cents: price,
            discount_price_cents: discount,
            location: None,
        }
    }

    #[test]
    fn test_discount_rules() {
        assert_eq!(poi(1000, None).unit_price_cents(), 1000);
        assert_eq!(poi(1000, Some(800)).unit_price_cents(), 800);
        assert_eq!(poi(1000, Some(0)).unit_price_cents(), 0);
        // Equal, higher or negative discounts are ignored
        assert_eq!(poi(1000, Some(1000)).unit_price_cents(), 1000);
        assert_eq!(poi(1000, Some(1200)).unit_price_cents(), 1000);
        assert_eq!(poi(1000, Some(-5)).unit_price_cents(), 1000);
    }
}
