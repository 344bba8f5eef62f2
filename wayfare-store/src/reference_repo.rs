use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use wayfare_core::reference::{City, CityRates, Guide, Hotel, Poi, RoomType};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreResult, GeoPoint};

use crate::error::db_error;

/// Reads catalog tables straight from the pool, outside any booking transaction.
#[derive(Clone)]
pub struct PgReferenceData {
    pool: PgPool,
}

impl PgReferenceData {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CityRow {
    id: Uuid,
    name: String,
    avg_meal_price_cents: i64,
}

#[derive(sqlx::FromRow)]
struct CityRatesRow {
    latest_meal_price_cents: Option<i64>,
    latest_transport_price_per_km_cents: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct HotelRow {
    id: Uuid,
    city_id: Uuid,
    name: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct RoomTypeRow {
    id: Uuid,
    hotel_id: Uuid,
    name: String,
    capacity: i32,
    total_rooms: i32,
    base_nightly_rate_cents: i64,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct PoiRow {
    id: Uuid,
    city_id: Uuid,
    name: String,
    price_cents: i64,
    discount_price_cents: Option<i64>,
    longitude: Option<f64>,
    latitude: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct GuideRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    price_per_day_cents: i64,
    is_active: bool,
}

#[async_trait]
impl ReferenceData for PgReferenceData {
    async fn city(&self, id: Uuid) -> CoreResult<Option<City>> {
        let row = sqlx::query_as::<_, CityRow>("SELECT id, name, avg_meal_price_cents FROM cities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(|r| City {
            id: r.id,
            name: r.name,
            avg_meal_price_cents: r.avg_meal_price_cents,
        }))
    }

    async fn city_rates(&self, city_id: Uuid) -> CoreResult<CityRates> {
        let row = sqlx::query_as::<_, CityRatesRow>(
            r"
            SELECT
                (SELECT price_cents FROM city_meal_prices
                 WHERE city_id = $1 ORDER BY recorded_at DESC LIMIT 1) AS latest_meal_price_cents,
                (SELECT price_per_km_cents FROM city_transport_prices
                 WHERE city_id = $1 ORDER BY recorded_at DESC LIMIT 1) AS latest_transport_price_per_km_cents
            ",
        )
        .bind(city_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(CityRates {
            latest_meal_price_cents: row.latest_meal_price_cents,
            latest_transport_price_per_km_cents: row.latest_transport_price_per_km_cents,
        })
    }

    async fn hotel(&self, id: Uuid) -> CoreResult<Option<Hotel>> {
        let row = sqlx::query_as::<_, HotelRow>("SELECT id, city_id, name, is_active FROM hotels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(row.map(|r| Hotel {
            id: r.id,
            city_id: r.city_id,
            name: r.name,
            is_active: r.is_active,
        }))
    }

    async fn room_type(&self, id: Uuid) -> CoreResult<Option<RoomType>> {
        let row = sqlx::query_as::<_, RoomTypeRow>(
            r"
            SELECT id, hotel_id, name, capacity, total_rooms, base_nightly_rate_cents, is_active
            FROM room_types
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|r| RoomType {
            id: r.id,
            hotel_id: r.hotel_id,
            name: r.name,
            capacity: r.capacity,
            total_rooms: r.total_rooms,
            base_nightly_rate_cents: r.base_nightly_rate_cents,
            is_active: r.is_active,
        }))
    }

    async fn pois(&self, ids: &[Uuid]) -> CoreResult<Vec<Poi>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PoiRow>(
            r"
            SELECT id, city_id, name, price_cents, discount_price_cents, longitude, latitude
            FROM pois
            WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| Poi {
                id: r.id,
                city_id: r.city_id,
                name: r.name,
                price_cents: r.price_cents,
                discount_price_cents: r.discount_price_cents,
                location: match (r.longitude, r.latitude) {
                    (Some(lon), Some(lat)) => Some(GeoPoint::new(lon, lat)),
                    _ => None,
                },
            })
            .collect())
    }

    async fn guide(&self, id: Uuid) -> CoreResult<Option<Guide>> {
        let row = sqlx::query_as::<_, GuideRow>(
            "SELECT id, user_id, name, price_per_day_cents, is_active FROM guides WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|r| Guide {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            price_per_day_cents: r.price_per_day_cents,
            is_active: r.is_active,
        }))
    }

    async fn missing_tags(&self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM tags WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(ids.iter().filter(|id| !found.contains(*id)).copied().collect())
    }
}
