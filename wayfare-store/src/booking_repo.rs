use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;
use wayfare_catalog::{GuideHold, InventoryError, RoomNight, RoomReservation};
use wayfare_core::{CoreError, CoreResult, GeoPoint, HoldTag, PoiVisit, SeatPolicy, SourceType, TripType};
use wayfare_order::models::{
    ChatRole, LedgerEntry, Order, OrderItem, OrderStatus, PaymentRecord, RefundPolicy, RefundTier,
    TransactionSource, Trip, TripBooking, TripDay, TripHotel, WalletMovement,
};
use wayfare_order::repository::{
    BookingStore, BookingTx, ChatRepository, InventoryRepository, LedgerRepository, TripRepository,
};

use crate::error::{corrupt, db_error};

/// Postgres-backed booking store. Each `begin` takes a pooled connection and
/// opens a transaction with a bounded statement timeout.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgStore {
    pub fn new(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self { pool, statement_timeout_ms }
    }
}

#[async_trait]
impl BookingStore for PgStore {
    type Tx = PgBookingTx;

    async fn begin(&self) -> CoreResult<PgBookingTx> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(self.statement_timeout_ms.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        Ok(PgBookingTx { tx })
    }
}

pub struct PgBookingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn commit(self) -> CoreResult<()> {
        self.tx.commit().await.map_err(db_error)
    }
}

fn hold_tag(source_type: &str, source_id: Uuid) -> CoreResult<HoldTag> {
    let source = SourceType::parse(source_type).ok_or_else(|| corrupt("source_type", source_type))?;
    Ok(HoldTag::new(source, source_id))
}

fn point(longitude: Option<f64>, latitude: Option<f64>) -> Option<GeoPoint> {
    Some(GeoPoint::new(longitude?, latitude?))
}

// ---------------------------------------------------------------------------
// Trips
// ---------------------------------------------------------------------------

const TRIP_SELECT: &str = r"
    SELECT id, city_id, creator_id, name, trip_type, start_date, end_date,
           price_per_person_cents, min_people, max_people, min_seats_per_user, max_seats_per_user,
           with_meals, with_transport, hotel_included,
           poi_price_per_person_cents, meal_price_per_person_cents, transport_price_per_person_cents,
           guide_id, meet_longitude, meet_latitude, drop_longitude, drop_latitude,
           refund_policy_id, tag_ids, attachments, created_at, updated_at
    FROM trips
    WHERE id = $1";

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    city_id: Uuid,
    creator_id: Uuid,
    name: String,
    trip_type: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    price_per_person_cents: i64,
    min_people: i32,
    max_people: i32,
    min_seats_per_user: i32,
    max_seats_per_user: i32,
    with_meals: bool,
    with_transport: bool,
    hotel_included: bool,
    poi_price_per_person_cents: i64,
    meal_price_per_person_cents: i64,
    transport_price_per_person_cents: i64,
    guide_id: Option<Uuid>,
    meet_longitude: Option<f64>,
    meet_latitude: Option<f64>,
    drop_longitude: Option<f64>,
    drop_latitude: Option<f64>,
    refund_policy_id: Option<Uuid>,
    tag_ids: Vec<Uuid>,
    attachments: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = CoreError;

    fn try_from(row: TripRow) -> CoreResult<Self> {
        let trip_type = TripType::parse(&row.trip_type).ok_or_else(|| corrupt("trips.trip_type", &row.trip_type))?;
        Ok(Trip {
            id: row.id,
            city_id: row.city_id,
            creator_id: row.creator_id,
            name: row.name,
            trip_type,
            start_date: row.start_date,
            end_date: row.end_date,
            price_per_person_cents: row.price_per_person_cents,
            seats: SeatPolicy {
                min_people: row.min_people,
                max_people: row.max_people,
                min_seats_per_user: row.min_seats_per_user,
                max_seats_per_user: row.max_seats_per_user,
            },
            with_meals: row.with_meals,
            with_transport: row.with_transport,
            hotel_included: row.hotel_included,
            poi_price_per_person_cents: row.poi_price_per_person_cents,
            meal_price_per_person_cents: row.meal_price_per_person_cents,
            transport_price_per_person_cents: row.transport_price_per_person_cents,
            guide_id: row.guide_id,
            meet_point: point(row.meet_longitude, row.meet_latitude),
            drop_point: point(row.drop_longitude, row.drop_latitude),
            refund_policy_id: row.refund_policy_id,
            tag_ids: row.tag_ids,
            attachments: row.attachments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Binds every trip column in table order, id first.
fn bind_trip<'q>(query: Query<'q, Postgres, PgArguments>, trip: &'q Trip) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(trip.id)
        .bind(trip.city_id)
        .bind(trip.creator_id)
        .bind(trip.name.as_str())
        .bind(trip.trip_type.as_str())
        .bind(trip.start_date)
        .bind(trip.end_date)
        .bind(trip.price_per_person_cents)
        .bind(trip.seats.min_people)
        .bind(trip.seats.max_people)
        .bind(trip.seats.min_seats_per_user)
        .bind(trip.seats.max_seats_per_user)
        .bind(trip.with_meals)
        .bind(trip.with_transport)
        .bind(trip.hotel_included)
        .bind(trip.poi_price_per_person_cents)
        .bind(trip.meal_price_per_person_cents)
        .bind(trip.transport_price_per_person_cents)
        .bind(trip.guide_id)
        .bind(trip.meet_point.map(|p| p.longitude))
        .bind(trip.meet_point.map(|p| p.latitude))
        .bind(trip.drop_point.map(|p| p.longitude))
        .bind(trip.drop_point.map(|p| p.latitude))
        .bind(trip.refund_policy_id)
        .bind(&trip.tag_ids)
        .bind(&trip.attachments)
        .bind(trip.created_at)
        .bind(trip.updated_at)
}

#[derive(sqlx::FromRow)]
struct TripPoiRow {
    day_number: i32,
    poi_id: Uuid,
    visit_order: i32,
}

#[derive(sqlx::FromRow)]
struct TripHotelRow {
    trip_id: Uuid,
    hotel_id: Uuid,
    room_type_id: Uuid,
    rooms_needed: i32,
}

#[derive(sqlx::FromRow)]
struct TripBookingRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: Uuid,
    seats: i32,
    total_cents: i64,
    source_type: String,
    order_id: Uuid,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<TripBookingRow> for TripBooking {
    type Error = CoreError;

    fn try_from(row: TripBookingRow) -> CoreResult<Self> {
        let source =
            SourceType::parse(&row.source_type).ok_or_else(|| corrupt("trip_bookings.source_type", &row.source_type))?;
        Ok(TripBooking {
            id: row.id,
            trip_id: row.trip_id,
            user_id: row.user_id,
            seats: row.seats,
            total_cents: row.total_cents,
            source,
            order_id: row.order_id,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefundTierRow {
    min_days: i64,
    percent: i16,
}

#[async_trait]
impl TripRepository for PgBookingTx {
    async fn insert_trip(&mut self, trip: &Trip) -> CoreResult<()> {
        let query = sqlx::query(
            r"
            INSERT INTO trips (
                id, city_id, creator_id, name, trip_type, start_date, end_date,
                price_per_person_cents, min_people, max_people, min_seats_per_user, max_seats_per_user,
                with_meals, with_transport, hotel_included,
                poi_price_per_person_cents, meal_price_per_person_cents, transport_price_per_person_cents,
                guide_id, meet_longitude, meet_latitude, drop_longitude, drop_latitude,
                refund_policy_id, tag_ids, attachments, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
            ",
        );
        bind_trip(query, trip).execute(&mut *self.tx).await.map_err(db_error)?;
        Ok(())
    }

    async fn update_trip(&mut self, trip: &Trip) -> CoreResult<()> {
        let query = sqlx::query(
            r"
            UPDATE trips SET
                city_id = $2, creator_id = $3, name = $4, trip_type = $5, start_date = $6, end_date = $7,
                price_per_person_cents = $8, min_people = $9, max_people = $10,
                min_seats_per_user = $11, max_seats_per_user = $12,
                with_meals = $13, with_transport = $14, hotel_included = $15,
                poi_price_per_person_cents = $16, meal_price_per_person_cents = $17,
                transport_price_per_person_cents = $18, guide_id = $19,
                meet_longitude = $20, meet_latitude = $21, drop_longitude = $22, drop_latitude = $23,
                refund_policy_id = $24, tag_ids = $25, attachments = $26,
                created_at = $27, updated_at = $28
            WHERE id = $1
            ",
        );
        let result = bind_trip(query, trip).execute(&mut *self.tx).await.map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("trip", trip.id));
        }
        Ok(())
    }

    async fn trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>> {
        let row = sqlx::query_as::<_, TripRow>(TRIP_SELECT)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.map(Trip::try_from).transpose()
    }

    async fn lock_trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>> {
        let sql = format!("{} FOR UPDATE", TRIP_SELECT);
        let row = sqlx::query_as::<_, TripRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.map(Trip::try_from).transpose()
    }

    async fn delete_trip(&mut self, id: Uuid) -> CoreResult<()> {
        // trip_days, trip_pois and trip_hotels cascade
        sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn replace_itinerary(&mut self, trip_id: Uuid, days: &[TripDay]) -> CoreResult<()> {
        sqlx::query("DELETE FROM trip_days WHERE trip_id = $1")
            .bind(trip_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        for day in days {
            sqlx::query("INSERT INTO trip_days (trip_id, day_number) VALUES ($1, $2)")
                .bind(trip_id)
                .bind(day.day_number)
                .execute(&mut *self.tx)
                .await
                .map_err(db_error)?;

            for visit in &day.pois {
                sqlx::query(
                    r"
                    INSERT INTO trip_pois (trip_id, day_number, poi_id, visit_order)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(trip_id)
                .bind(day.day_number)
                .bind(visit.poi_id)
                .bind(visit.visit_order)
                .execute(&mut *self.tx)
                .await
                .map_err(db_error)?;
            }
        }
        Ok(())
    }

    async fn itinerary(&mut self, trip_id: Uuid) -> CoreResult<Vec<TripDay>> {
        let day_numbers: Vec<i32> =
            sqlx::query_scalar("SELECT day_number FROM trip_days WHERE trip_id = $1 ORDER BY day_number")
                .bind(trip_id)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_error)?;

        let visits = sqlx::query_as::<_, TripPoiRow>(
            r"
            SELECT day_number, poi_id, visit_order
            FROM trip_pois
            WHERE trip_id = $1
            ORDER BY day_number, visit_order
            ",
        )
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        let mut by_day: BTreeMap<i32, Vec<PoiVisit>> = day_numbers.into_iter().map(|d| (d, Vec::new())).collect();
        for visit in visits {
            by_day.entry(visit.day_number).or_default().push(PoiVisit {
                poi_id: visit.poi_id,
                visit_order: visit.visit_order,
            });
        }

        Ok(by_day
            .into_iter()
            .map(|(day_number, pois)| TripDay { trip_id, day_number, pois })
            .collect())
    }

    async fn replace_trip_hotel(&mut self, trip_id: Uuid, hotel: Option<&TripHotel>) -> CoreResult<()> {
        sqlx::query("DELETE FROM trip_hotels WHERE trip_id = $1")
            .bind(trip_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        if let Some(hotel) = hotel {
            sqlx::query(
                r"
                INSERT INTO trip_hotels (trip_id, hotel_id, room_type_id, rooms_needed)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(trip_id)
            .bind(hotel.hotel_id)
            .bind(hotel.room_type_id)
            .bind(hotel.rooms_needed)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }

    async fn trip_hotel(&mut self, trip_id: Uuid) -> CoreResult<Option<TripHotel>> {
        let row = sqlx::query_as::<_, TripHotelRow>(
            "SELECT trip_id, hotel_id, room_type_id, rooms_needed FROM trip_hotels WHERE trip_id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(row.map(|r| TripHotel {
            trip_id: r.trip_id,
            hotel_id: r.hotel_id,
            room_type_id: r.room_type_id,
            rooms_needed: r.rooms_needed,
        }))
    }

    async fn insert_booking(&mut self, booking: &TripBooking) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO trip_bookings
                (id, trip_id, user_id, seats, total_cents, source_type, order_id, created_at, cancelled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(booking.id)
        .bind(booking.trip_id)
        .bind(booking.user_id)
        .bind(booking.seats)
        .bind(booking.total_cents)
        .bind(booking.source.as_str())
        .bind(booking.order_id)
        .bind(booking.created_at)
        .bind(booking.cancelled_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<TripBooking>> {
        let row = sqlx::query_as::<_, TripBookingRow>(
            r"
            SELECT id, trip_id, user_id, seats, total_cents, source_type, order_id, created_at, cancelled_at
            FROM trip_bookings
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;
        row.map(TripBooking::try_from).transpose()
    }

    async fn active_seats(&mut self, trip_id: Uuid) -> CoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(seats), 0)::BIGINT FROM trip_bookings WHERE trip_id = $1 AND cancelled_at IS NULL",
        )
        .bind(trip_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn cancel_booking(&mut self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        let result = sqlx::query("UPDATE trip_bookings SET cancelled_at = $2 WHERE id = $1 AND cancelled_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!("booking {} is already cancelled", id)));
        }
        Ok(())
    }

    async fn refund_policy(&mut self, id: Uuid) -> CoreResult<Option<RefundPolicy>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM refund_policies WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        let Some(name) = name else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, RefundTierRow>(
            "SELECT min_days, percent FROM refund_policy_tiers WHERE policy_id = $1 ORDER BY min_days DESC",
        )
        .bind(id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        let tiers = rows
            .into_iter()
            .map(|r| -> CoreResult<RefundTier> {
                let percent = u8::try_from(r.percent)
                    .map_err(|_| corrupt("refund_policy_tiers.percent", &r.percent.to_string()))?;
                Ok(RefundTier { min_days: r.min_days, percent })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Some(RefundPolicy { id, name, tiers }))
    }
}

// ---------------------------------------------------------------------------
// Room and guide inventory
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct RoomNightRow {
    room_type_id: Uuid,
    stay_date: NaiveDate,
    total_rooms: i32,
    booked_rooms: i32,
    available_rooms: i32,
}

impl From<RoomNightRow> for RoomNight {
    fn from(row: RoomNightRow) -> Self {
        RoomNight {
            room_type_id: row.room_type_id,
            date: row.stay_date,
            total_rooms: row.total_rooms,
            booked_rooms: row.booked_rooms,
            available_rooms: row.available_rooms,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoomReservationRow {
    id: Uuid,
    source_type: String,
    source_id: Uuid,
    hotel_id: Uuid,
    room_type_id: Uuid,
    check_in: NaiveDate,
    check_out: NaiveDate,
    rooms: i32,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct GuideHoldRow {
    id: Uuid,
    guide_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    source_type: String,
    source_id: Uuid,
}

#[async_trait]
impl InventoryRepository for PgBookingTx {
    async fn room_nights(&mut self, room_type_id: Uuid, dates: &[NaiveDate]) -> CoreResult<Vec<RoomNight>> {
        let rows = sqlx::query_as::<_, RoomNightRow>(
            r"
            SELECT room_type_id, stay_date, total_rooms, booked_rooms, available_rooms
            FROM room_inventory
            WHERE room_type_id = $1 AND stay_date = ANY($2)
            ORDER BY stay_date
            ",
        )
        .bind(room_type_id)
        .bind(dates)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(RoomNight::from).collect())
    }

    async fn allocate_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight> {
        if rooms < 1 {
            return Err(InventoryError::InvalidQuantity(rooms).into());
        }

        // The conflict branch only fires while enough rooms remain; otherwise
        // nothing is returned and the row is left untouched.
        let row = sqlx::query_as::<_, RoomNightRow>(
            r"
            INSERT INTO room_inventory (room_type_id, stay_date, total_rooms, booked_rooms, available_rooms)
            SELECT $1, $2, $3, $4, $3 - $4
            WHERE $4 <= $3
            ON CONFLICT (room_type_id, stay_date) DO UPDATE
            SET booked_rooms = room_inventory.booked_rooms + EXCLUDED.booked_rooms,
                available_rooms = room_inventory.available_rooms - EXCLUDED.booked_rooms
            WHERE room_inventory.available_rooms >= EXCLUDED.booked_rooms
            RETURNING room_type_id, stay_date, total_rooms, booked_rooms, available_rooms
            ",
        )
        .bind(room_type_id)
        .bind(date)
        .bind(total_rooms)
        .bind(rooms)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        let available: Option<i32> = sqlx::query_scalar(
            "SELECT available_rooms FROM room_inventory WHERE room_type_id = $1 AND stay_date = $2",
        )
        .bind(room_type_id)
        .bind(date)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Err(InventoryError::InsufficientInventory {
            date,
            requested: rooms,
            available: available.unwrap_or(total_rooms),
        }
        .into())
    }

    async fn release_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight> {
        let row = sqlx::query_as::<_, RoomNightRow>(
            r"
            INSERT INTO room_inventory (room_type_id, stay_date, total_rooms, booked_rooms, available_rooms)
            VALUES ($1, $2, $3, 0, $3)
            ON CONFLICT (room_type_id, stay_date) DO UPDATE
            SET booked_rooms = GREATEST(room_inventory.booked_rooms - $4, 0),
                available_rooms = room_inventory.total_rooms - GREATEST(room_inventory.booked_rooms - $4, 0)
            RETURNING room_type_id, stay_date, total_rooms, booked_rooms, available_rooms
            ",
        )
        .bind(room_type_id)
        .bind(date)
        .bind(total_rooms)
        .bind(rooms.max(0))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(row.into())
    }

    async fn room_reservation(&mut self, tag: HoldTag) -> CoreResult<Option<RoomReservation>> {
        let row = sqlx::query_as::<_, RoomReservationRow>(
            r"
            SELECT id, source_type, source_id, hotel_id, room_type_id, check_in, check_out, rooms, created_at
            FROM room_reservations
            WHERE source_type = $1 AND source_id = $2
            ",
        )
        .bind(tag.source.as_str())
        .bind(tag.source_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(|r| -> CoreResult<RoomReservation> {
            Ok(RoomReservation {
                id: r.id,
                tag: hold_tag(&r.source_type, r.source_id)?,
                hotel_id: r.hotel_id,
                room_type_id: r.room_type_id,
                check_in: r.check_in,
                check_out: r.check_out,
                rooms: r.rooms,
                created_at: r.created_at,
            })
        })
        .transpose()
    }

    async fn insert_room_reservation(&mut self, reservation: &RoomReservation) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO room_reservations
                (id, source_type, source_id, hotel_id, room_type_id, check_in, check_out, rooms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(reservation.id)
        .bind(reservation.tag.source.as_str())
        .bind(reservation.tag.source_id)
        .bind(reservation.hotel_id)
        .bind(reservation.room_type_id)
        .bind(reservation.check_in)
        .bind(reservation.check_out)
        .bind(reservation.rooms)
        .bind(reservation.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_room_reservation(&mut self, tag: HoldTag) -> CoreResult<()> {
        sqlx::query("DELETE FROM room_reservations WHERE source_type = $1 AND source_id = $2")
            .bind(tag.source.as_str())
            .bind(tag.source_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn lock_guide(&mut self, guide_id: Uuid) -> CoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1::text))")
            .bind(guide_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn guide_holds(&mut self, guide_id: Uuid, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<GuideHold>> {
        let rows = sqlx::query_as::<_, GuideHoldRow>(
            r"
            SELECT id, guide_id, start_date, end_date, source_type, source_id
            FROM guide_availability
            WHERE guide_id = $1 AND start_date < $3 AND end_date > $2
            ORDER BY start_date
            ",
        )
        .bind(guide_id)
        .bind(start)
        .bind(end)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| -> CoreResult<GuideHold> {
                Ok(GuideHold {
                    id: r.id,
                    guide_id: r.guide_id,
                    start_date: r.start_date,
                    end_date: r.end_date,
                    tag: hold_tag(&r.source_type, r.source_id)?,
                })
            })
            .collect()
    }

    async fn insert_guide_hold(&mut self, hold: &GuideHold) -> CoreResult<()> {
        // The exclusion constraint rejects overlaps with any other tag
        sqlx::query(
            r"
            INSERT INTO guide_availability (id, guide_id, start_date, end_date, source_type, source_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(hold.id)
        .bind(hold.guide_id)
        .bind(hold.start_date)
        .bind(hold.end_date)
        .bind(hold.tag.source.as_str())
        .bind(hold.tag.source_id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_guide_holds(&mut self, tag: HoldTag) -> CoreResult<u64> {
        let result = sqlx::query("DELETE FROM guide_availability WHERE source_type = $1 AND source_id = $2")
            .bind(tag.source.as_str())
            .bind(tag.source_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Wallet, orders and ledger
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct WalletMovementRow {
    balance_before_cents: i64,
    balance_after_cents: i64,
}

impl From<WalletMovementRow> for WalletMovement {
    fn from(row: WalletMovementRow) -> Self {
        WalletMovement {
            balance_before_cents: row.balance_before_cents,
            balance_after_cents: row.balance_after_cents,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    total_cents: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_type: String,
    product_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    total_price_cents: i64,
    refund_policy_id: Option<Uuid>,
    refunded_cents: Option<i64>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: Uuid,
    amount_cents: i64,
    source: String,
    balance_before_cents: i64,
    balance_after_cents: i64,
    order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl LedgerRepository for PgBookingTx {
    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement> {
        let row = sqlx::query_as::<_, WalletMovementRow>(
            r"
            UPDATE wallets
            SET balance_cents = balance_cents - $2, updated_at = NOW()
            WHERE user_id = $1 AND balance_cents >= $2
            RETURNING balance_cents + $2 AS balance_before_cents, balance_cents AS balance_after_cents
            ",
        )
        .bind(user_id)
        .bind(amount_cents)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        match self.wallet_balance(user_id).await? {
            Some(available_cents) => Err(CoreError::InsufficientFunds {
                required_cents: amount_cents,
                available_cents,
            }),
            None => Err(CoreError::not_found("wallet for user", user_id)),
        }
    }

    async fn credit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement> {
        let row = sqlx::query_as::<_, WalletMovementRow>(
            r"
            UPDATE wallets
            SET balance_cents = balance_cents + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING balance_cents - $2 AS balance_before_cents, balance_cents AS balance_after_cents
            ",
        )
        .bind(user_id)
        .bind(amount_cents)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(WalletMovement::from)
            .ok_or_else(|| CoreError::not_found("wallet for user", user_id))
    }

    async fn wallet_balance(&mut self, user_id: Uuid) -> CoreResult<Option<i64>> {
        sqlx::query_scalar("SELECT balance_cents FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn insert_order(&mut self, order: &Order) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO orders (id, user_id, total_cents, currency, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.total_cents)
        .bind(order.currency.as_str())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> CoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, total_cents, currency, status, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;

        row.map(|r| -> CoreResult<Order> {
            let status = OrderStatus::parse(&r.status).ok_or_else(|| corrupt("orders.status", &r.status))?;
            Ok(Order {
                id: r.id,
                user_id: r.user_id,
                total_cents: r.total_cents,
                currency: r.currency,
                status,
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
        })
        .transpose()
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> CoreResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("order", id));
        }
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO order_items (
                id, order_id, product_type, product_id, quantity, unit_price_cents,
                total_price_cents, refund_policy_id, refunded_cents, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(item.id)
        .bind(item.order_id)
        .bind(item.product_type.as_str())
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.total_price_cents)
        .bind(item.refund_policy_id)
        .bind(item.refunded_cents)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn order_items(&mut self, order_id: Uuid) -> CoreResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_type, product_id, quantity, unit_price_cents,
                   total_price_cents, refund_policy_id, refunded_cents, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY created_at
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|r| OrderItem {
                id: r.id,
                order_id: r.order_id,
                product_type: r.product_type,
                product_id: r.product_id,
                quantity: r.quantity,
                unit_price_cents: r.unit_price_cents,
                total_price_cents: r.total_price_cents,
                refund_policy_id: r.refund_policy_id,
                refunded_cents: r.refunded_cents,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn record_item_refund(&mut self, item_id: Uuid, refunded_cents: i64) -> CoreResult<()> {
        let result = sqlx::query("UPDATE order_items SET refunded_cents = $2 WHERE id = $1")
            .bind(item_id)
            .bind(refunded_cents)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("order item", item_id));
        }
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO user_transactions (
                id, user_id, amount_cents, source, balance_before_cents,
                balance_after_cents, order_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.amount_cents)
        .bind(entry.source.as_str())
        .bind(entry.balance_before_cents)
        .bind(entry.balance_after_cents)
        .bind(entry.order_id)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn ledger(&mut self, user_id: Uuid) -> CoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r"
            SELECT id, user_id, amount_cents, source, balance_before_cents,
                   balance_after_cents, order_id, created_at
            FROM user_transactions
            WHERE user_id = $1
            ORDER BY seq
            ",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(|r| -> CoreResult<LedgerEntry> {
                let source = TransactionSource::parse(&r.source)
                    .ok_or_else(|| corrupt("user_transactions.source", &r.source))?;
                Ok(LedgerEntry {
                    id: r.id,
                    user_id: r.user_id,
                    amount_cents: r.amount_cents,
                    source,
                    balance_before_cents: r.balance_before_cents,
                    balance_after_cents: r.balance_after_cents,
                    order_id: r.order_id,
                    created_at: r.created_at,
                })
            })
            .collect()
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> CoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO payment_history (id, user_id, order_id, amount_cents, status, method, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.order_id)
        .bind(payment.amount_cents)
        .bind(payment.status.as_str())
        .bind(payment.method.as_str())
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chat rooms
// ---------------------------------------------------------------------------

#[async_trait]
impl ChatRepository for PgBookingTx {
    async fn chat_room_for_trip(&mut self, trip_id: Uuid) -> CoreResult<Option<Uuid>> {
        sqlx::query_scalar("SELECT id FROM chat_rooms WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn create_chat_room(&mut self, trip_id: Uuid) -> CoreResult<Uuid> {
        // No-op update so RETURNING yields the existing room on conflict
        sqlx::query_scalar(
            r"
            INSERT INTO chat_rooms (id, trip_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (trip_id) DO UPDATE SET trip_id = EXCLUDED.trip_id
            RETURNING id
            ",
        )
        .bind(Uuid::new_v4())
        .bind(trip_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn add_chat_member(&mut self, room_id: Uuid, user_id: Uuid, role: ChatRole) -> CoreResult<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO chat_members (room_id, user_id, role, joined_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (room_id, user_id) DO NOTHING
            ",
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_chat_member(&mut self, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM chat_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn chat_member_count(&mut self, room_id: Uuid) -> CoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_members WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error)
    }

    async fn delete_chat_room(&mut self, room_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM chat_rooms WHERE id = $1")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn existing_users(&mut self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)?;
        // Keep caller order
        Ok(ids.iter().filter(|id| found.contains(*id)).copied().collect())
    }

    async fn admin_user_ids(&mut self) -> CoreResult<Vec<Uuid>> {
        sqlx::query_scalar("SELECT id FROM users WHERE role = 'ADMIN' ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_coordinates_are_dropped() {
        assert_eq!(point(Some(31.2), Some(30.0)), Some(GeoPoint::new(31.2, 30.0)));
        assert_eq!(point(Some(31.2), None), None);
        assert_eq!(point(None, None), None);
    }

    #[test]
    fn test_unknown_source_type_is_internal() {
        let id = Uuid::new_v4();
        assert_eq!(
            hold_tag("CUSTOM_TRIP", id).unwrap(),
            HoldTag::new(SourceType::CustomTrip, id)
        );
        assert!(matches!(hold_tag("TOUR", id), Err(CoreError::InternalError(_))));
    }

    #[test]
    fn test_trip_row_conversion() {
        let now = Utc::now();
        let row = TripRow {
            id: Uuid::new_v4(),
            city_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            name: "Nile week".to_string(),
            trip_type: "PREDEFINED".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            price_per_person_cents: 42_000,
            min_people: 2,
            max_people: 12,
            min_seats_per_user: 1,
            max_seats_per_user: 4,
            with_meals: true,
            with_transport: false,
            hotel_included: false,
            poi_price_per_person_cents: 12_000,
            meal_price_per_person_cents: 30_000,
            transport_price_per_person_cents: 0,
            guide_id: None,
            meet_longitude: Some(31.23),
            meet_latitude: Some(30.04),
            drop_longitude: None,
            drop_latitude: None,
            refund_policy_id: None,
            tag_ids: vec![],
            attachments: vec!["map.pdf".to_string()],
            created_at: now,
            updated_at: now,
        };

        let trip = Trip::try_from(row).unwrap();
        assert_eq!(trip.trip_type, TripType::Predefined);
        assert_eq!(trip.seats.max_seats_per_user, 4);
        assert_eq!(trip.meet_point, Some(GeoPoint::new(31.23, 30.04)));
        assert_eq!(trip.drop_point, None);
        assert_eq!(trip.hold_tag().source, SourceType::PredefinedTrip);
    }
}
