use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;
use wayfare_core::reference::{City, Guide, Hotel, Poi, RoomType};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, DayPlan, GeoPoint, HotelRequest, PoiVisit, SeatPolicy, TripDraft, TripType};
use wayfare_order::chat::provision_room;
use wayfare_order::memory::{MemoryStore, RecordingNotifier};
use wayfare_order::models::{OrderStatus, RefundPolicy, RefundTier};
use wayfare_order::repository::ChatRepository;
use wayfare_order::{
    BookingOperations, BookingService, BookingSettings, BookingStore, BookingTx, CreateTripOptions,
};
use wayfare_shared::BookingEvent;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 5, 10).unwrap()
}

fn at(day: NaiveDate) -> DateTime<Utc> {
    day.and_hms_opt(9, 30, 0).unwrap().and_utc()
}

struct World {
    store: MemoryStore,
    service: BookingService<MemoryStore>,
    recorder: Arc<RecordingNotifier>,
    city: City,
    hotel: Hotel,
    room_type: RoomType,
    guide: Guide,
    citadel: Poi,
    museum: Poi,
    customer: Uuid,
    admin: Uuid,
}

async fn world_with(recorder: RecordingNotifier) -> World {
    let store = MemoryStore::new();
    let reference = store.reference();

    let city = City { id: Uuid::new_v4(), name: "Cairo".to_string(), avg_meal_price_cents: 2_000 };
    let hotel = Hotel { id: Uuid::new_v4(), city_id: city.id, name: "Nile View".to_string(), is_active: true };
    let room_type = RoomType {
        id: Uuid::new_v4(),
        hotel_id: hotel.id,
        name: "Double".to_string(),
        capacity: 2,
        total_rooms: 5,
        base_nightly_rate_cents: 10_000,
        is_active: true,
    };
    let guide_user = Uuid::new_v4();
    let guide = Guide {
        id: Uuid::new_v4(),
        user_id: guide_user,
        name: "Amr".to_string(),
        price_per_day_cents: 5_000,
        is_active: true,
    };
    let citadel = Poi {
        id: Uuid::new_v4(),
        city_id: city.id,
        name: "Citadel".to_string(),
        price_cents: 3_000,
        discount_price_cents: None,
        location: Some(GeoPoint::new(31.26, 30.03)),
    };
    let museum = Poi {
        id: Uuid::new_v4(),
        city_id: city.id,
        name: "Egyptian Museum".to_string(),
        price_cents: 2_000,
        discount_price_cents: Some(1_500),
        location: Some(GeoPoint::new(31.23, 30.05)),
    };

    reference.insert_city(city.clone()).await;
    reference.insert_hotel(hotel.clone()).await;
    reference.insert_room_type(room_type.clone()).await;
    reference.insert_guide(guide.clone()).await;
    reference.insert_poi(citadel.clone()).await;
    reference.insert_poi(museum.clone()).await;

    let customer = Uuid::new_v4();
    let admin = Uuid::new_v4();
    store.add_user(customer, false).await;
    store.add_user(admin, true).await;
    store.add_user(guide_user, false).await;
    store.open_wallet(customer, 1_000_000).await;

    let recorder = Arc::new(recorder);
    let reference: Arc<dyn ReferenceData> = reference;
    let service = BookingService::new(
        store.clone(),
        reference,
        recorder.clone(),
        recorder.clone(),
        BookingSettings::default(),
    );

    World { store, service, recorder, city, hotel, room_type, guide, citadel, museum, customer, admin }
}

async fn world() -> World {
    world_with(RecordingNotifier::default()).await
}

impl World {
    /// Four nights, two people, meals, one double room and the guide.
    /// Quote: POIs 9 000 + lodging 40 000 + meals 16 000 + guide 20 000.
    fn custom_draft(&self) -> TripDraft {
        TripDraft {
            city_id: self.city.id,
            name: "Cairo long weekend".to_string(),
            start_date: start(),
            end_date: start() + Duration::days(4),
            people: 2,
            with_meals: true,
            with_transport: false,
            hotel_included: true,
            days: vec![DayPlan {
                day_number: 1,
                pois: vec![
                    PoiVisit { poi_id: self.citadel.id, visit_order: 1 },
                    PoiVisit { poi_id: self.museum.id, visit_order: 2 },
                ],
            }],
            hotels: vec![HotelRequest {
                hotel_id: self.hotel.id,
                room_type_id: Some(self.room_type.id),
                rooms_requested: 1,
            }],
            guide_id: Some(self.guide.id),
            meet_point: None,
            drop_point: None,
            tag_ids: vec![],
            refund_policy_id: None,
            attachments: vec![],
        }
    }

    /// Ten riders, POIs only: 4 500 per person.
    fn predefined_draft(&self) -> TripDraft {
        TripDraft {
            name: "Weekly city tour".to_string(),
            people: 10,
            with_meals: false,
            hotel_included: false,
            hotels: vec![],
            guide_id: None,
            ..self.custom_draft()
        }
    }

    async fn create_predefined(&self, policy: SeatPolicy) -> Uuid {
        let options = CreateTripOptions { book_now: false, seat_policy: Some(policy) };
        self.service
            .create_trip_from_draft(self.admin, &self.predefined_draft(), TripType::Predefined, &options)
            .await
            .unwrap()
            .trip
            .id
    }
}

fn two_per_rider() -> SeatPolicy {
    SeatPolicy { min_people: 1, max_people: 10, min_seats_per_user: 1, max_seats_per_user: 2 }
}

#[tokio::test]
async fn test_create_and_book_custom_trip() {
    let w = world().await;
    let options = CreateTripOptions { book_now: true, seat_policy: None };

    let compiled = w
        .service
        .create_trip_from_draft(w.customer, &w.custom_draft(), TripType::Custom, &options)
        .await
        .unwrap();

    assert_eq!(compiled.quote.total_cents, 85_000);
    assert_eq!(compiled.trip.price_per_person_cents, 42_500);
    assert_eq!(compiled.trip.seats, SeatPolicy::exact(2));
    let receipt = compiled.booking.unwrap();
    assert_eq!(receipt.total_cents, 85_000);

    let state = w.store.snapshot().await;
    assert_eq!(state.wallets[&w.customer], 915_000);
    assert_eq!(state.orders[&receipt.order_id].status, OrderStatus::Confirmed);

    for offset in 0..4 {
        let night = state.room_night(w.room_type.id, start() + Duration::days(offset)).unwrap();
        assert_eq!(night.booked_rooms, 1);
        assert_eq!(night.available_rooms, 4);
        assert!(night.is_consistent());
    }
    assert!(state.room_night(w.room_type.id, start() + Duration::days(4)).is_none());

    assert_eq!(state.guide_holds.len(), 1);
    assert_eq!(state.guide_holds[0].end_date, start() + Duration::days(4));

    let members = &state.chat_members[&receipt.chat_room_id];
    assert_eq!(members.len(), 3);
    assert!(members.contains_key(&w.customer));
    assert!(members.contains_key(&w.guide.user_id));
    assert!(members.contains_key(&w.admin));

    let events = w.recorder.events().await;
    assert!(matches!(events[0], BookingEvent::TripCreated { .. }));
    assert!(matches!(events[1], BookingEvent::BookingConfirmed { total_cents: 85_000, .. }));

    let statement = w.service.wallet_statement(w.customer).await.unwrap();
    assert!(statement.consistent);
    assert_eq!(statement.entries.len(), 2);
}

#[tokio::test]
async fn test_seats_outside_per_user_bounds_are_rejected() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;

    let err = w.service.book_trip(w.customer, trip_id, 3).await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let state = w.store.snapshot().await;
    assert!(state.orders.is_empty());
    assert!(state.bookings.is_empty());
    assert_eq!(state.ledger_for(w.customer).len(), 1);
    assert_eq!(state.wallets[&w.customer], 1_000_000);
}

#[tokio::test]
async fn test_insufficient_funds_leaves_no_trace() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;

    let poor = Uuid::new_v4();
    w.store.add_user(poor, false).await;
    w.store.open_wallet(poor, 5_000).await;

    let err = w.service.book_trip(poor, trip_id, 2).await.unwrap_err();
    assert_eq!(err, CoreError::InsufficientFunds { required_cents: 9_000, available_cents: 5_000 });

    let state = w.store.snapshot().await;
    assert!(state.orders.is_empty());
    assert!(state.bookings.is_empty());
    assert!(state.payments.is_empty());
    assert_eq!(state.ledger_for(poor).len(), 1);
    assert_eq!(state.wallets[&poor], 5_000);
    assert!(state.chat_room_for(trip_id).is_none());
}

#[tokio::test]
async fn test_cancel_ten_days_out_refunds_everything_and_releases_holds() {
    let w = world().await;
    let before = w.store.snapshot().await;
    let options = CreateTripOptions { book_now: true, seat_policy: None };
    let compiled = w
        .service
        .create_trip_from_draft(w.customer, &w.custom_draft(), TripType::Custom, &options)
        .await
        .unwrap();
    let receipt = compiled.booking.unwrap();

    let cancelled = w
        .service
        .cancel_trip_booking_at(w.customer, receipt.booking_id, at(start() - Duration::days(10)))
        .await
        .unwrap();
    assert_eq!(cancelled.refund_percent, 100);
    assert_eq!(cancelled.refunded_cents, 85_000);

    let state = w.store.snapshot().await;
    assert_eq!(state.wallets[&w.customer], before.wallets[&w.customer]);
    assert_eq!(state.orders[&receipt.order_id].status, OrderStatus::Cancelled);
    let booking = &state.bookings[&receipt.booking_id];
    assert_eq!(booking.cancelled_at, Some(at(start() - Duration::days(10))));
    let item = state.order_items.values().find(|i| i.order_id == receipt.order_id).unwrap();
    assert_eq!(item.refunded_cents, Some(85_000));

    for offset in 0..4 {
        let night = state.room_night(w.room_type.id, start() + Duration::days(offset)).unwrap();
        assert_eq!(night.booked_rooms, 0);
        assert_eq!(night.available_rooms, w.room_type.total_rooms);
    }
    assert!(state.reservations.is_empty());
    assert!(state.guide_holds.is_empty());
    assert!(state.chat_room_for(compiled.trip.id).is_none());

    assert!(w.service.wallet_statement(w.customer).await.unwrap().consistent);
}

#[tokio::test]
async fn test_cancel_after_start_changes_nothing() {
    let w = world().await;
    let options = CreateTripOptions { book_now: true, seat_policy: None };
    let compiled = w
        .service
        .create_trip_from_draft(w.customer, &w.custom_draft(), TripType::Custom, &options)
        .await
        .unwrap();
    let receipt = compiled.booking.unwrap();
    let before = w.store.snapshot().await;

    let err = w
        .service
        .cancel_trip_booking_at(w.customer, receipt.booking_id, at(start() + Duration::days(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let state = w.store.snapshot().await;
    assert!(state.bookings[&receipt.booking_id].is_active());
    assert_eq!(state.wallets[&w.customer], before.wallets[&w.customer]);
    assert_eq!(state.ledger.len(), before.ledger.len());
    assert_eq!(state.guide_holds.len(), 1);
    assert_eq!(state.reservations.len(), 1);
}

#[tokio::test]
async fn test_cancellation_guards() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;
    let receipt = w.service.book_trip(w.customer, trip_id, 2).await.unwrap();
    let early = start() - Duration::days(20);

    let err = w.service.cancel_trip_booking_at(w.admin, receipt.booking_id, at(early)).await.unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = w.service.cancel_trip_booking_at(w.customer, Uuid::new_v4(), at(early)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    w.service.cancel_trip_booking_at(w.customer, receipt.booking_id, at(early)).await.unwrap();
    let err = w.service.cancel_trip_booking_at(w.customer, receipt.booking_id, at(early)).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_predefined_cancellation_uses_tiers_and_keeps_room() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;

    let other = Uuid::new_v4();
    w.store.add_user(other, false).await;
    w.store.open_wallet(other, 100_000).await;

    let mine = w.service.book_trip(w.customer, trip_id, 2).await.unwrap();
    let theirs = w.service.book_trip(other, trip_id, 1).await.unwrap();
    assert_eq!(mine.chat_room_id, theirs.chat_room_id);

    let cancelled = w
        .service
        .cancel_trip_booking_at(w.customer, mine.booking_id, at(start() - Duration::days(4)))
        .await
        .unwrap();
    assert_eq!(cancelled.refund_percent, 40);
    assert_eq!(cancelled.refunded_cents, 3_600);

    let state = w.store.snapshot().await;
    let members = &state.chat_members[&mine.chat_room_id];
    assert!(!members.contains_key(&w.customer));
    assert!(members.contains_key(&other));
    assert_eq!(state.wallets[&w.customer], 1_000_000 - 9_000 + 3_600);

    let seats = w.service.check_seat_availability(trip_id, 2).await.unwrap();
    assert!(seats.available);
}

#[tokio::test]
async fn test_cancel_on_start_day_refunds_nothing() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;
    let receipt = w.service.book_trip(w.customer, trip_id, 1).await.unwrap();
    let ledger_rows = w.store.snapshot().await.ledger.len();

    let cancelled = w
        .service
        .cancel_trip_booking_at(w.customer, receipt.booking_id, at(start()))
        .await
        .unwrap();
    assert_eq!(cancelled.refunded_cents, 0);

    let state = w.store.snapshot().await;
    assert_eq!(state.ledger.len(), ledger_rows);
    assert_eq!(state.orders[&receipt.order_id].status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_stored_refund_policy_wins_over_defaults() {
    let w = world().await;
    let policy = RefundPolicy {
        id: Uuid::new_v4(),
        name: "Flexible".to_string(),
        tiers: vec![
            RefundTier { min_days: 7, percent: 100 },
            RefundTier { min_days: 5, percent: 70 },
            RefundTier { min_days: 2, percent: 30 },
            RefundTier { min_days: 0, percent: 0 },
        ],
    };
    w.store.add_refund_policy(policy.clone()).await;

    let draft = TripDraft { refund_policy_id: Some(policy.id), ..w.predefined_draft() };
    let options = CreateTripOptions { book_now: false, seat_policy: Some(two_per_rider()) };
    let trip = w
        .service
        .create_trip_from_draft(w.admin, &draft, TripType::Predefined, &options)
        .await
        .unwrap()
        .trip;

    // Two seats at 4 500 each; defaults would give 80% at five days and nothing at two.
    for (days_out, percent, refunded) in [(6, 70, 6_300), (5, 70, 6_300), (2, 30, 2_700), (1, 0, 0)] {
        let receipt = w.service.book_trip(w.customer, trip.id, 2).await.unwrap();
        let cancelled = w
            .service
            .cancel_trip_booking_at(w.customer, receipt.booking_id, at(start() - Duration::days(days_out)))
            .await
            .unwrap();
        assert_eq!(cancelled.refund_percent, percent, "{} days out", days_out);
        assert_eq!(cancelled.refunded_cents, refunded, "{} days out", days_out);
    }
    assert!(w.service.wallet_statement(w.customer).await.unwrap().consistent);
}

#[tokio::test]
async fn test_room_contention_rolls_back_the_loser() {
    let w = world().await;
    let mut draft = w.custom_draft();
    draft.people = 6;
    draft.guide_id = None;
    let options = CreateTripOptions { book_now: true, seat_policy: None };

    w.service
        .create_trip_from_draft(w.customer, &draft, TripType::Custom, &options)
        .await
        .unwrap();
    let after_first = w.store.snapshot().await;

    let err = w
        .service
        .create_trip_from_draft(w.customer, &draft, TripType::Custom, &options)
        .await
        .unwrap_err();
    match err {
        CoreError::ValidationError(msg) => assert!(msg.contains("2030-05-10")),
        other => panic!("unexpected error: {:?}", other),
    }

    let state = w.store.snapshot().await;
    assert_eq!(state.trips.len(), after_first.trips.len());
    assert_eq!(state.wallets[&w.customer], after_first.wallets[&w.customer]);
    let night = state.room_night(w.room_type.id, start()).unwrap();
    assert_eq!(night.booked_rooms, 3);
    assert_eq!(night.available_rooms, 2);
}

#[tokio::test]
async fn test_guide_cannot_be_double_booked() {
    let w = world().await;
    let options = CreateTripOptions::default();
    let draft = TripDraft { hotel_included: false, hotels: vec![], ..w.custom_draft() };

    w.service
        .create_trip_from_draft(w.customer, &draft, TripType::Custom, &options)
        .await
        .unwrap();

    let overlapping = TripDraft {
        start_date: start() + Duration::days(2),
        end_date: start() + Duration::days(6),
        ..draft.clone()
    };
    let err = w
        .service
        .create_trip_from_draft(w.customer, &overlapping, TripType::Custom, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));

    let back_to_back = TripDraft {
        start_date: start() + Duration::days(4),
        end_date: start() + Duration::days(6),
        ..draft
    };
    w.service
        .create_trip_from_draft(w.customer, &back_to_back, TripType::Custom, &options)
        .await
        .unwrap();

    let busy = w
        .service
        .check_guide_availability(w.guide.id, start() + Duration::days(1), start() + Duration::days(2), None)
        .await
        .unwrap();
    assert!(!busy.available);
}

#[tokio::test]
async fn test_update_moves_holds_without_drift() {
    let w = world().await;
    let options = CreateTripOptions::default();
    let trip = w
        .service
        .create_trip_from_draft(w.customer, &w.custom_draft(), TripType::Custom, &options)
        .await
        .unwrap()
        .trip;

    let moved = TripDraft {
        start_date: start() + Duration::days(2),
        end_date: start() + Duration::days(5),
        people: 4,
        ..w.custom_draft()
    };
    let updated = w
        .service
        .update_trip_from_draft(w.customer, trip.id, &moved, None)
        .await
        .unwrap();
    assert_eq!(updated.quote.rooms_used, Some(2));
    assert_eq!(updated.trip.seats, SeatPolicy::exact(4));

    // Saving the same draft again must not accumulate holds
    w.service
        .update_trip_from_draft(w.customer, trip.id, &moved, None)
        .await
        .unwrap();

    let state = w.store.snapshot().await;
    for offset in 0..2 {
        let night = state.room_night(w.room_type.id, start() + Duration::days(offset)).unwrap();
        assert_eq!(night.booked_rooms, 0);
    }
    for offset in 2..5 {
        let night = state.room_night(w.room_type.id, start() + Duration::days(offset)).unwrap();
        assert_eq!(night.booked_rooms, 2);
        assert!(night.is_consistent());
    }
    assert_eq!(state.reservations.len(), 1);
    assert_eq!(state.guide_holds.len(), 1);
    assert_eq!(state.guide_holds[0].start_date, start() + Duration::days(2));

    let err = w
        .service
        .update_trip_from_draft(w.admin, trip.id, &moved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));
}

#[tokio::test]
async fn test_update_cannot_shrink_below_booked_seats() {
    let w = world().await;
    let trip_id = w.create_predefined(two_per_rider()).await;
    w.service.book_trip(w.customer, trip_id, 2).await.unwrap();

    let smaller = SeatPolicy { min_people: 1, max_people: 1, min_seats_per_user: 1, max_seats_per_user: 1 };
    let err = w
        .service
        .update_trip_from_draft(w.admin, trip_id, &w.predefined_draft(), Some(smaller))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}

#[tokio::test]
async fn test_delete_trip_requires_no_active_bookings() {
    let w = world().await;
    let draft = TripDraft {
        hotel_included: true,
        hotels: w.custom_draft().hotels,
        people: 4,
        ..w.predefined_draft()
    };
    let policy = SeatPolicy { min_people: 1, max_people: 4, min_seats_per_user: 1, max_seats_per_user: 2 };
    let options = CreateTripOptions { book_now: false, seat_policy: Some(policy) };
    let trip = w
        .service
        .create_trip_from_draft(w.admin, &draft, TripType::Predefined, &options)
        .await
        .unwrap()
        .trip;

    let receipt = w.service.book_trip(w.customer, trip.id, 1).await.unwrap();
    let err = w.service.delete_trip(w.admin, trip.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    w.service
        .cancel_trip_booking_at(w.customer, receipt.booking_id, at(start() - Duration::days(30)))
        .await
        .unwrap();
    // Predefined holds survive rider cancellations
    assert_eq!(w.store.snapshot().await.reservations.len(), 1);

    w.service.delete_trip(w.admin, trip.id).await.unwrap();
    let state = w.store.snapshot().await;
    assert!(state.trips.is_empty());
    assert!(state.reservations.is_empty());
    assert!(state.chat_room_for(trip.id).is_none());
    assert_eq!(state.room_night(w.room_type.id, start()).unwrap().available_rooms, 5);
}

#[tokio::test]
async fn test_predefined_trips_cannot_book_on_creation() {
    let w = world().await;
    let options = CreateTripOptions { book_now: true, seat_policy: Some(two_per_rider()) };
    let err = w
        .service
        .create_trip_from_draft(w.admin, &w.predefined_draft(), TripType::Predefined, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
    assert!(w.store.snapshot().await.trips.is_empty());
}

#[tokio::test]
async fn test_chat_provisioning_is_idempotent() {
    let w = world().await;
    let trip_id = Uuid::new_v4();
    let ghost = Uuid::new_v4();

    let mut tx = w.store.begin().await.unwrap();
    let first = provision_room(&mut tx, trip_id, w.customer, Some(ghost)).await.unwrap();
    let second = provision_room(&mut tx, trip_id, w.customer, Some(ghost)).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(tx.chat_member_count(first).await.unwrap(), 2);
    tx.commit().await.unwrap();

    let state = w.store.snapshot().await;
    assert!(!state.chat_members[&first].contains_key(&ghost));
}

#[tokio::test]
async fn test_notification_failures_do_not_undo_bookings() {
    let w = world_with(RecordingNotifier::failing()).await;
    let trip_id = w.create_predefined(two_per_rider()).await;

    let receipt = w.service.book_trip(w.customer, trip_id, 2).await.unwrap();

    let state = w.store.snapshot().await;
    assert!(state.bookings[&receipt.booking_id].is_active());
    assert!(w.recorder.events().await.is_empty());
}

#[tokio::test]
async fn test_room_availability_names_the_short_night() {
    let w = world().await;
    let ok = w
        .service
        .check_room_availability(w.hotel.id, w.room_type.id, start(), start() + Duration::days(3), 5)
        .await
        .unwrap();
    assert!(ok.available);

    let too_many = w
        .service
        .check_room_availability(w.hotel.id, w.room_type.id, start(), start() + Duration::days(3), 6)
        .await
        .unwrap();
    assert!(!too_many.available);
    assert!(too_many.message.unwrap().contains("2030-05-10"));

    let err = w
        .service
        .check_room_availability(Uuid::new_v4(), w.room_type.id, start(), start() + Duration::days(3), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}
