use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use wayfare_core::geo::{path_length_km, GeoPoint};
use wayfare_core::reference::{City, CityRates, Guide, Poi, RoomType};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, TripDraft};

/// Reference data a quote depends on, fetched up front so that pricing itself
/// stays pure.
#[derive(Debug, Clone)]
pub struct QuoteInputs {
    pub city: City,
    pub rates: CityRates,
    pub pois: HashMap<Uuid, Poi>,
    pub room_type: Option<RoomType>,
    pub guide: Option<Guide>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CostBreakdown {
    pub poi_cents: i64,
    pub lodging_cents: i64,
    pub meals_cents: i64,
    pub transport_cents: i64,
    pub guide_cents: i64,
}

impl CostBreakdown {
    pub fn total(&self) -> i64 {
        self.poi_cents + self.lodging_cents + self.meals_cents + self.transport_cents + self.guide_cents
    }
}

/// Per-person components snapshotted onto the trip record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerPersonComponents {
    pub poi_cents: i64,
    pub meals_cents: i64,
    pub transport_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub total_cents: i64,
    pub per_person_cents: i64,
    pub breakdown: CostBreakdown,
    pub per_person: PerPersonComponents,
    pub nights: i64,
    pub people: i32,
    pub distance_km: f64,
    /// Rooms actually needed once capacity is taken into account.
    pub rooms_used: Option<i32>,
    pub meal_rate_cents: i64,
    pub transport_rate_per_km_cents: i64,
    pub warnings: Vec<String>,
}

/// Turns a trip draft into a cost breakdown.
pub struct PriceCalculator;

impl PriceCalculator {
    pub fn quote(draft: &TripDraft, inputs: &QuoteInputs) -> CoreResult<PriceQuote> {
        draft.validate()?;

        let nights = draft.nights();
        let people = draft.people as i64;
        let mut warnings = Vec::new();
        let mut breakdown = CostBreakdown::default();

        // POIs, one admission per trip however many days revisit them
        let mut poi_unit_sum = 0i64;
        for poi_id in draft.poi_ids() {
            let poi = inputs
                .pois
                .get(&poi_id)
                .ok_or_else(|| CoreError::not_found("POI", poi_id))?;
            poi_unit_sum += poi.unit_price_cents();
        }
        breakdown.poi_cents = poi_unit_sum * people;

        // Lodging
        let mut rooms_used = None;
        if let Some(request) = draft.lodging() {
            let room_type = inputs
                .room_type
                .as_ref()
                .filter(|rt| Some(rt.id) == request.room_type_id)
                .ok_or_else(|| {
                    CoreError::not_found("room type", request.room_type_id.unwrap_or_default())
                })?;
            let used = Self::rooms_needed(room_type, draft.people, request.rooms_requested)?;
            if used > request.rooms_requested {
                let warning = format!(
                    "{} rooms requested but {} guests need {} rooms of capacity {}",
                    request.rooms_requested, draft.people, used, room_type.capacity
                );
                tracing::warn!("{}", warning);
                warnings.push(warning);
            }
            breakdown.lodging_cents = room_type.base_nightly_rate_cents * used as i64 * nights;
            rooms_used = Some(used);
        }

        // Meals
        let meal_rate_cents = inputs
            .rates
            .latest_meal_price_cents
            .unwrap_or(inputs.city.avg_meal_price_cents);
        if draft.with_meals {
            breakdown.meals_cents = meal_rate_cents * people * nights;
        }

        // Transport
        let transport_rate_per_km_cents = inputs.rates.latest_transport_price_per_km_cents.unwrap_or(0);
        let distance_km = Self::itinerary_distance_km(draft, &inputs.pois);
        if draft.with_transport {
            breakdown.transport_cents = (distance_km * transport_rate_per_km_cents as f64).round() as i64;
        }

        // Guide
        if let Some(guide_id) = draft.guide_id {
            let guide = inputs
                .guide
                .as_ref()
                .filter(|g| g.id == guide_id)
                .ok_or_else(|| CoreError::not_found("guide", guide_id))?;
            breakdown.guide_cents = guide.price_per_day_cents * nights;
        }

        let total_cents = breakdown.total();
        let per_person = PerPersonComponents {
            poi_cents: poi_unit_sum,
            meals_cents: if draft.with_meals { meal_rate_cents * nights } else { 0 },
            transport_cents: divide_rounded(breakdown.transport_cents, people),
        };

        Ok(PriceQuote {
            total_cents,
            per_person_cents: divide_rounded(total_cents, people),
            breakdown,
            per_person,
            nights,
            people: draft.people,
            distance_km,
            rooms_used,
            meal_rate_cents,
            transport_rate_per_km_cents,
            warnings,
        })
    }

    /// `max(requested, ceil(people / capacity))`; fails for inactive room types.
    pub fn rooms_needed(room_type: &RoomType, people: i32, requested: i32) -> CoreResult<i32> {
        if !room_type.is_active {
            return Err(CoreError::validation(format!("room type {} is not active", room_type.id)));
        }
        if room_type.capacity < 1 {
            return Err(CoreError::validation(format!(
                "room type {} has no guest capacity",
                room_type.id
            )));
        }
        let by_capacity = (people + room_type.capacity - 1) / room_type.capacity;
        Ok(requested.max(by_capacity))
    }

    /// Sum over days of the path through that day's POIs in visit order.
    /// POIs without coordinates are skipped.
    pub fn itinerary_distance_km(draft: &TripDraft, pois: &HashMap<Uuid, Poi>) -> f64 {
        draft
            .days
            .iter()
            .map(|day| {
                let points: Vec<GeoPoint> = day
                    .ordered_visits()
                    .iter()
                    .filter_map(|v| pois.get(&v.poi_id).and_then(|p| p.location))
                    .collect();
                path_length_km(&points)
            })
            .sum()
    }
}

impl QuoteInputs {
    /// Fetch and cross-check everything `draft` references.
    pub async fn load(reference: &dyn ReferenceData, draft: &TripDraft) -> CoreResult<Self> {
        let city = reference
            .city(draft.city_id)
            .await?
            .ok_or_else(|| CoreError::not_found("city", draft.city_id))?;
        let rates = reference.city_rates(city.id).await?;

        let poi_ids = draft.poi_ids();
        let pois: HashMap<Uuid, Poi> = reference
            .pois(&poi_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        if let Some(missing) = poi_ids.iter().find(|id| !pois.contains_key(id)) {
            return Err(CoreError::not_found("POI", missing));
        }
        if let Some(foreign) = pois.values().find(|p| p.city_id != city.id) {
            return Err(CoreError::validation(format!(
                "POI {} is not in city {}",
                foreign.id, city.name
            )));
        }

        let mut room_type = None;
        if let Some(request) = draft.hotel() {
            let hotel = reference
                .hotel(request.hotel_id)
                .await?
                .ok_or_else(|| CoreError::not_found("hotel", request.hotel_id))?;
            if !hotel.is_active {
                return Err(CoreError::validation(format!("hotel {} is not active", hotel.id)));
            }
            if hotel.city_id != city.id {
                return Err(CoreError::validation(format!(
                    "hotel {} is not in city {}",
                    hotel.name, city.name
                )));
            }
            let room_type_id = request
                .room_type_id
                .ok_or_else(|| CoreError::validation("hotel specified without a room type"))?;
            let rt = reference
                .room_type(room_type_id)
                .await?
                .ok_or_else(|| CoreError::not_found("room type", room_type_id))?;
            if rt.hotel_id != hotel.id {
                return Err(CoreError::validation(format!(
                    "room type {} does not belong to hotel {}",
                    rt.id, hotel.name
                )));
            }
            room_type = Some(rt);
        }

        let mut guide = None;
        if let Some(guide_id) = draft.guide_id {
            let g = reference
                .guide(guide_id)
                .await?
                .ok_or_else(|| CoreError::not_found("guide", guide_id))?;
            if !g.is_active {
                return Err(CoreError::validation(format!("guide {} is not active", g.id)));
            }
            guide = Some(g);
        }

        Ok(Self { city, rates, pois, room_type, guide })
    }
}

/// Integer division rounded half away from zero, to the cent.
pub fn divide_rounded(amount: i64, by: i64) -> i64 {
    if by == 0 {
        return 0;
    }
    (amount as f64 / by as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wayfare_core::{DayPlan, HotelRequest, PoiVisit};

    fn city() -> City {
        City { id: Uuid::new_v4(), name: "Luxor".to_string(), avg_meal_price_cents: 1500 }
    }

    fn inputs(city: City) -> QuoteInputs {
        QuoteInputs { city, rates: CityRates::default(), pois: HashMap::new(), room_type: None, guide: None }
    }

    fn draft(city_id: Uuid, days: i64, people: i32) -> TripDraft {
        let start = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        TripDraft {
            city_id,
            name: "Valley of the Kings".to_string(),
            start_date: start,
            end_date: start + chrono::Duration::days(days),
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

    fn poi(city_id: Uuid, price: i64, discount: Option<i64>, at: Option<GeoPoint>) -> Poi {
        Poi {
            id: Uuid::new_v4(),
            city_id,
            name: "Karnak".to_string(),
            price_cents: price,
            discount_price_cents: discount,
            location: at,
        }
    }

    fn room_type(capacity: i32) -> RoomType {
        RoomType {
            id: Uuid::new_v4(),
            hotel_id: Uuid::new_v4(),
            name: "Double".to_string(),
            capacity,
            total_rooms: 10,
            base_nightly_rate_cents: 5000,
            is_active: true,
        }
    }

    #[test]
    fn test_meals_use_latest_override() {
        // 4 nights, $20 per person per day, 2 people -> $160
        let c = city();
        let mut inp = inputs(c.clone());
        inp.rates.latest_meal_price_cents = Some(2000);
        let mut d = draft(c.id, 4, 2);
        d.with_meals = true;

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert_eq!(quote.nights, 4);
        assert_eq!(quote.breakdown.meals_cents, 16000);
        assert_eq!(quote.per_person.meals_cents, 8000);
    }

    #[test]
    fn test_meals_fall_back_to_city_default() {
        let c = city();
        let mut d = draft(c.id, 2, 3);
        d.with_meals = true;
        let quote = PriceCalculator::quote(&d, &inputs(c)).unwrap();
        assert_eq!(quote.breakdown.meals_cents, 1500 * 3 * 2);
    }

    #[test]
    fn test_rooms_follow_capacity_with_warning() {
        // capacity 2, 5 people, 2 requested -> 3 rooms
        let c = city();
        let rt = room_type(2);
        let mut inp = inputs(c.clone());
        inp.room_type = Some(rt.clone());
        let mut d = draft(c.id, 2, 5);
        d.hotel_included = true;
        d.hotels.push(HotelRequest { hotel_id: rt.hotel_id, room_type_id: Some(rt.id), rooms_requested: 2 });

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert_eq!(quote.rooms_used, Some(3));
        assert_eq!(quote.warnings.len(), 1);
        assert_eq!(quote.breakdown.lodging_cents, 5000 * 3 * 2);
    }

    #[test]
    fn test_inactive_room_type_fails() {
        let mut rt = room_type(2);
        rt.is_active = false;
        assert!(PriceCalculator::rooms_needed(&rt, 2, 1).is_err());
    }

    #[test]
    fn test_hotel_ignored_when_not_included() {
        let c = city();
        let rt = room_type(2);
        let mut d = draft(c.id, 2, 2);
        d.hotels.push(HotelRequest { hotel_id: rt.hotel_id, room_type_id: Some(rt.id), rooms_requested: 1 });
        let quote = PriceCalculator::quote(&d, &inputs(c)).unwrap();
        assert_eq!(quote.breakdown.lodging_cents, 0);
        assert_eq!(quote.rooms_used, None);
    }

    #[test]
    fn test_poi_cost_uses_discounts() {
        let c = city();
        let a = poi(c.id, 1000, Some(700), None);
        let b = poi(c.id, 500, Some(600), None);
        let mut inp = inputs(c.clone());
        let mut d = draft(c.id, 1, 3);
        d.days.push(DayPlan {
            day_number: 1,
            pois: vec![
                PoiVisit { poi_id: a.id, visit_order: 1 },
                PoiVisit { poi_id: b.id, visit_order: 2 },
            ],
        });
        inp.pois.insert(a.id, a);
        inp.pois.insert(b.id, b);

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert_eq!(quote.per_person.poi_cents, 1200);
        assert_eq!(quote.breakdown.poi_cents, 3600);
        assert_eq!(quote.total_cents, 3600);
        assert_eq!(quote.per_person_cents, 1200);
    }

    #[test]
    fn test_poi_revisited_on_another_day_is_charged_once() {
        let c = city();
        let karnak = poi(c.id, 1000, None, None);
        let mut inp = inputs(c.clone());
        let mut d = draft(c.id, 2, 2);
        for day_number in 1..=2 {
            d.days.push(DayPlan { day_number, pois: vec![PoiVisit { poi_id: karnak.id, visit_order: 1 }] });
        }
        inp.pois.insert(karnak.id, karnak);

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert_eq!(quote.per_person.poi_cents, 1000);
        assert_eq!(quote.breakdown.poi_cents, 2000);
    }

    #[test]
    fn test_missing_poi_is_not_found() {
        let c = city();
        let mut d = draft(c.id, 1, 1);
        d.days.push(DayPlan { day_number: 1, pois: vec![PoiVisit { poi_id: Uuid::new_v4(), visit_order: 1 }] });
        let err = PriceCalculator::quote(&d, &inputs(c)).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_transport_follows_visit_order_and_skips_unlocated() {
        let c = city();
        let origin = poi(c.id, 0, None, Some(GeoPoint::new(0.0, 0.0)));
        let nowhere = poi(c.id, 0, None, None);
        let north = poi(c.id, 0, None, Some(GeoPoint::new(0.0, 1.0)));
        let mut inp = inputs(c.clone());
        inp.rates.latest_transport_price_per_km_cents = Some(100);
        let mut d = draft(c.id, 1, 2);
        d.with_transport = true;
        d.days.push(DayPlan {
            day_number: 1,
            pois: vec![
                PoiVisit { poi_id: north.id, visit_order: 3 },
                PoiVisit { poi_id: origin.id, visit_order: 1 },
                PoiVisit { poi_id: nowhere.id, visit_order: 2 },
            ],
        });
        for p in [origin, nowhere, north] {
            inp.pois.insert(p.id, p);
        }

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert!((quote.distance_km - 111.195).abs() < 0.01);
        assert_eq!(quote.breakdown.transport_cents, 11119);
        assert_eq!(quote.per_person.transport_cents, 5560);
    }

    #[test]
    fn test_transport_without_rate_is_free() {
        let c = city();
        let mut d = draft(c.id, 1, 2);
        d.with_transport = true;
        let quote = PriceCalculator::quote(&d, &inputs(c)).unwrap();
        assert_eq!(quote.breakdown.transport_cents, 0);
        assert_eq!(quote.transport_rate_per_km_cents, 0);
    }

    #[test]
    fn test_guide_is_charged_per_night_and_rounding() {
        let c = city();
        let guide = Guide {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Amr".to_string(),
            price_per_day_cents: 10000,
            is_active: true,
        };
        let mut inp = inputs(c.clone());
        inp.guide = Some(guide.clone());
        let mut d = draft(c.id, 3, 3);
        d.guide_id = Some(guide.id);

        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        assert_eq!(quote.breakdown.guide_cents, 30000);
        assert_eq!(quote.per_person_cents, 10000);

        d.people = 7;
        let quote = PriceCalculator::quote(&d, &inp).unwrap();
        // 30000 / 7 = 4285.71...
        assert_eq!(quote.per_person_cents, 4286);
    }
}
