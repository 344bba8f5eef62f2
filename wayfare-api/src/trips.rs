use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_catalog::{Availability, PriceQuote};
use wayfare_core::{SeatPolicy, TripDraft, TripType};
use wayfare_order::{BookingReceipt, CompiledTrip, CreateTripOptions};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub draft: TripDraft,
    pub trip_type: TripType,
    #[serde(default)]
    pub options: CreateTripOptions,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTripRequest {
    pub draft: TripDraft,
    pub seat_policy: Option<SeatPolicy>,
}

#[derive(Debug, Deserialize)]
pub struct SeatQuery {
    pub seats: i32,
}

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub trip_id: Uuid,
    pub trip_type: TripType,
    pub price_per_person_cents: i64,
    pub seats: SeatPolicy,
    pub quote: PriceQuote,
    pub booking: Option<BookingReceipt>,
}

impl From<CompiledTrip> for TripResponse {
    fn from(compiled: CompiledTrip) -> Self {
        Self {
            trip_id: compiled.trip.id,
            trip_type: compiled.trip.trip_type,
            price_per_person_cents: compiled.trip.price_per_person_cents,
            seats: compiled.trip.seats,
            quote: compiled.quote,
            booking: compiled.booking,
        }
    }
}

/// Open to anonymous callers.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quotes", post(quote))
        .route("/v1/trips/{id}/availability/seats", get(seat_availability))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", post(create_trip))
        .route("/v1/trips/{id}", put(update_trip).delete(delete_trip))
}

async fn quote(
    State(state): State<AppState>,
    Json(draft): Json<TripDraft>,
) -> Result<Json<PriceQuote>, AppError> {
    let result = state.booking.quote(&draft).await;
    state.metrics.record("quote", &result);
    Ok(Json(result?))
}

async fn seat_availability(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    Query(query): Query<SeatQuery>,
) -> Result<Json<Availability>, AppError> {
    let result = state.booking.check_seat_availability(trip_id, query.seats).await;
    state.metrics.record("check_seat_availability", &result);
    Ok(Json(result?))
}

async fn create_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    let result = state
        .booking
        .create_trip_from_draft(user.user_id, &req.draft, req.trip_type, &req.options)
        .await;
    state.metrics.record("create_trip", &result);
    Ok((StatusCode::CREATED, Json(result?.into())))
}

async fn update_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<UpdateTripRequest>,
) -> Result<Json<TripResponse>, AppError> {
    let result = state
        .booking
        .update_trip_from_draft(user.user_id, trip_id, &req.draft, req.seat_policy)
        .await;
    state.metrics.record("update_trip", &result);
    Ok(Json(result?.into()))
}

async fn delete_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = state.booking.delete_trip(user.user_id, trip_id).await;
    state.metrics.record("delete_trip", &result);
    result?;
    Ok(StatusCode::NO_CONTENT)
}
