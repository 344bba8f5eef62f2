use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use wayfare_order::{BookingReceipt, CancellationReceipt, WalletStatement};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BookTripRequest {
    pub seats: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}/bookings", post(book_trip))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/wallet/statement", get(wallet_statement))
}

async fn book_trip(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(trip_id): Path<Uuid>,
    Json(req): Json<BookTripRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), AppError> {
    let result = state.booking.book_trip(user.user_id, trip_id, req.seats).await;
    state.metrics.record("book_trip", &result);
    Ok((StatusCode::CREATED, Json(result?)))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<CancellationReceipt>, AppError> {
    let result = state.booking.cancel_trip_booking(user.user_id, booking_id).await;
    state.metrics.record("cancel_trip_booking", &result);
    Ok(Json(result?))
}

async fn wallet_statement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<WalletStatement>, AppError> {
    let result = state.booking.wallet_statement(user.user_id).await;
    state.metrics.record("wallet_statement", &result);
    Ok(Json(result?))
}
