use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use wayfare_catalog::Availability;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    pub hotel_id: Uuid,
    pub room_type_id: Uuid,
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "one_room")]
    pub rooms: i32,
}

fn one_room() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct GuideQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/availability/rooms", get(rooms))
        .route("/v1/availability/guides/{guide_id}", get(guide))
}

async fn rooms(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Availability>, AppError> {
    let result = state
        .booking
        .check_room_availability(query.hotel_id, query.room_type_id, query.start, query.end, query.rooms)
        .await;
    state.metrics.record("check_room_availability", &result);
    Ok(Json(result?))
}

async fn guide(
    State(state): State<AppState>,
    Path(guide_id): Path<Uuid>,
    Query(query): Query<GuideQuery>,
) -> Result<Json<Availability>, AppError> {
    let result = state
        .booking
        .check_guide_availability(guide_id, query.start, query.end, None)
        .await;
    state.metrics.record("check_guide_availability", &result);
    Ok(Json(result?))
}
