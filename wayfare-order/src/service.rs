use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;
use wayfare_catalog::{Availability, PriceQuote};
use wayfare_core::notify::{EventSink, Notifier};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, HoldTag, SeatPolicy, TripDraft, TripType};
use wayfare_shared::BookingEvent;

use crate::availability::{guide_availability, room_availability, seat_availability};
use crate::cancellation::{cancel_trip_booking, CancellationReceipt};
use crate::compiler::{self, quote_draft, CompiledTrip, CreateTripOptions};
use crate::models::WalletStatement;
use crate::orchestrator::{book_trip, BookingReceipt};
use crate::refund::RefundSchedule;
use crate::repository::{BookingStore, BookingTx, LedgerRepository};

/// Everything the booking engine exposes, one transaction per call.
#[async_trait]
pub trait BookingOperations: Send + Sync {
    async fn quote(&self, draft: &TripDraft) -> CoreResult<PriceQuote>;

    async fn check_seat_availability(&self, trip_id: Uuid, seats: i32) -> CoreResult<Availability>;

    async fn check_room_availability(
        &self,
        hotel_id: Uuid,
        room_type_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        rooms: i32,
    ) -> CoreResult<Availability>;

    async fn check_guide_availability(
        &self,
        guide_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<HoldTag>,
    ) -> CoreResult<Availability>;

    async fn book_trip(&self, user_id: Uuid, trip_id: Uuid, seats: i32) -> CoreResult<BookingReceipt>;

    async fn cancel_trip_booking(&self, user_id: Uuid, booking_id: Uuid) -> CoreResult<CancellationReceipt>;

    async fn create_trip_from_draft(
        &self,
        user_id: Uuid,
        draft: &TripDraft,
        trip_type: TripType,
        options: &CreateTripOptions,
    ) -> CoreResult<CompiledTrip>;

    async fn update_trip_from_draft(
        &self,
        user_id: Uuid,
        trip_id: Uuid,
        draft: &TripDraft,
        seat_policy: Option<SeatPolicy>,
    ) -> CoreResult<CompiledTrip>;

    async fn delete_trip(&self, user_id: Uuid, trip_id: Uuid) -> CoreResult<()>;

    async fn wallet_statement(&self, user_id: Uuid) -> CoreResult<WalletStatement>;
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub currency: String,
    /// Used when neither the order item nor the trip names a refund policy.
    pub default_refund_tiers: RefundSchedule,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            default_refund_tiers: RefundSchedule::standard(),
        }
    }
}

pub struct BookingService<S: BookingStore> {
    store: S,
    reference: Arc<dyn ReferenceData>,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    settings: BookingSettings,
}

impl<S: BookingStore> BookingService<S> {
    pub fn new(
        store: S,
        reference: Arc<dyn ReferenceData>,
        notifier: Arc<dyn Notifier>,
        events: Arc<dyn EventSink>,
        settings: BookingSettings,
    ) -> Self {
        Self { store, reference, notifier, events, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cancellation against an explicit clock.
    pub async fn cancel_trip_booking_at(
        &self,
        user_id: Uuid,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<CancellationReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt = cancel_trip_booking(
            &mut tx,
            self.reference.as_ref(),
            &self.settings.default_refund_tiers,
            user_id,
            booking_id,
            now,
        )
        .await
        .inspect_err(|e| tracing::warn!("Cancellation of booking {} rejected: {}", booking_id, e))?;
        tx.commit().await?;

        self.notify(
            user_id,
            "Booking cancelled",
            &format!("Refunded {} {} ({}%)", receipt.refunded_cents, self.settings.currency, receipt.refund_percent),
        )
        .await;
        self.emit(BookingEvent::BookingCancelled {
            booking_id: receipt.booking_id,
            order_id: receipt.order_id,
            trip_id: receipt.trip_id,
            user_id,
            refunded_cents: receipt.refunded_cents,
            timestamp: now.timestamp(),
        })
        .await;
        Ok(receipt)
    }

    async fn booking_confirmed(&self, user_id: Uuid, receipt: &BookingReceipt) {
        self.notify(
            user_id,
            "Booking confirmed",
            &format!("{} seats, {} {}", receipt.seats, receipt.total_cents, self.settings.currency),
        )
        .await;
        self.emit(BookingEvent::BookingConfirmed {
            booking_id: receipt.booking_id,
            order_id: receipt.order_id,
            trip_id: receipt.trip_id,
            user_id,
            seats: receipt.seats,
            total_cents: receipt.total_cents,
            timestamp: Utc::now().timestamp(),
        })
        .await;
    }

    async fn notify(&self, user_id: Uuid, title: &str, body: &str) {
        if let Err(e) = self.notifier.notify(user_id, title, body).await {
            tracing::error!("Failed to notify user {}: {}", user_id, e);
        }
    }

    async fn emit(&self, event: BookingEvent) {
        if let Err(e) = self.events.emit(&event).await {
            tracing::error!("Failed to publish event for trip {}: {}", event.trip_id(), e);
        }
    }
}

#[async_trait]
impl<S: BookingStore> BookingOperations for BookingService<S> {
    async fn quote(&self, draft: &TripDraft) -> CoreResult<PriceQuote> {
        let (_, quote) = quote_draft(self.reference.as_ref(), draft).await?;
        Ok(quote)
    }

    async fn check_seat_availability(&self, trip_id: Uuid, seats: i32) -> CoreResult<Availability> {
        let mut tx = self.store.begin().await?;
        seat_availability(&mut tx, trip_id, seats).await
    }

    async fn check_room_availability(
        &self,
        hotel_id: Uuid,
        room_type_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        rooms: i32,
    ) -> CoreResult<Availability> {
        if rooms < 1 {
            return Err(CoreError::validation("rooms must be at least 1"));
        }
        let room_type = self
            .reference
            .room_type(room_type_id)
            .await?
            .ok_or_else(|| CoreError::not_found("room type", room_type_id))?;
        if room_type.hotel_id != hotel_id {
            return Err(CoreError::validation(format!(
                "room type {} does not belong to hotel {}",
                room_type_id, hotel_id
            )));
        }
        let mut tx = self.store.begin().await?;
        room_availability(&mut tx, &room_type, start, end, rooms).await
    }

    async fn check_guide_availability(
        &self,
        guide_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<HoldTag>,
    ) -> CoreResult<Availability> {
        let guide = self
            .reference
            .guide(guide_id)
            .await?
            .ok_or_else(|| CoreError::not_found("guide", guide_id))?;
        if !guide.is_active {
            return Ok(Availability::unavailable(format!("guide {} is not active", guide.name)));
        }
        let mut tx = self.store.begin().await?;
        guide_availability(&mut tx, guide_id, start, end, exclude).await
    }

    async fn book_trip(&self, user_id: Uuid, trip_id: Uuid, seats: i32) -> CoreResult<BookingReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt = book_trip(
            &mut tx,
            self.reference.as_ref(),
            &self.settings.currency,
            user_id,
            trip_id,
            seats,
        )
        .await
        .inspect_err(|e| tracing::warn!("Booking on trip {} by {} rejected: {}", trip_id, user_id, e))?;
        tx.commit().await?;

        self.booking_confirmed(user_id, &receipt).await;
        Ok(receipt)
    }

    async fn cancel_trip_booking(&self, user_id: Uuid, booking_id: Uuid) -> CoreResult<CancellationReceipt> {
        self.cancel_trip_booking_at(user_id, booking_id, Utc::now()).await
    }

    async fn create_trip_from_draft(
        &self,
        user_id: Uuid,
        draft: &TripDraft,
        trip_type: TripType,
        options: &CreateTripOptions,
    ) -> CoreResult<CompiledTrip> {
        let mut tx = self.store.begin().await?;
        let compiled = compiler::create_trip_from_draft(
            &mut tx,
            self.reference.as_ref(),
            &self.settings.currency,
            user_id,
            draft,
            trip_type,
            options,
        )
        .await
        .inspect_err(|e| tracing::warn!("Trip creation by {} rejected: {}", user_id, e))?;
        tx.commit().await?;

        self.emit(BookingEvent::TripCreated {
            trip_id: compiled.trip.id,
            creator_id: user_id,
            trip_type: trip_type.as_str().to_string(),
            price_per_person_cents: compiled.trip.price_per_person_cents,
            timestamp: Utc::now().timestamp(),
        })
        .await;
        if let Some(receipt) = &compiled.booking {
            self.booking_confirmed(user_id, receipt).await;
        }
        Ok(compiled)
    }

    async fn update_trip_from_draft(
        &self,
        user_id: Uuid,
        trip_id: Uuid,
        draft: &TripDraft,
        seat_policy: Option<SeatPolicy>,
    ) -> CoreResult<CompiledTrip> {
        let mut tx = self.store.begin().await?;
        let compiled = compiler::update_trip_from_draft(
            &mut tx,
            self.reference.as_ref(),
            user_id,
            trip_id,
            draft,
            seat_policy,
        )
        .await
        .inspect_err(|e| tracing::warn!("Update of trip {} rejected: {}", trip_id, e))?;
        tx.commit().await?;
        Ok(compiled)
    }

    async fn delete_trip(&self, user_id: Uuid, trip_id: Uuid) -> CoreResult<()> {
        let mut tx = self.store.begin().await?;
        compiler::delete_trip(&mut tx, self.reference.as_ref(), user_id, trip_id)
            .await
            .inspect_err(|e| tracing::warn!("Deletion of trip {} rejected: {}", trip_id, e))?;
        tx.commit().await?;

        self.emit(BookingEvent::TripDeleted {
            trip_id,
            timestamp: Utc::now().timestamp(),
        })
        .await;
        Ok(())
    }

    async fn wallet_statement(&self, user_id: Uuid) -> CoreResult<WalletStatement> {
        let mut tx = self.store.begin().await?;
        let balance = tx
            .wallet_balance(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("wallet for user", user_id))?;
        let entries = tx.ledger(user_id).await?;
        let statement = WalletStatement::new(user_id, balance, entries);
        if !statement.consistent {
            tracing::error!("Wallet of user {} does not match its ledger", user_id);
        }
        Ok(statement)
    }
}
