//! In-memory implementation of the storage and reference-data contracts.
//!
//! A transaction takes the store lock for its whole lifetime and works on a
//! copy of the state; `commit` swaps the copy in, dropping discards it. Used
//! by tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;
use wayfare_catalog::availability::overlaps;
use wayfare_catalog::{GuideHold, RoomNight, RoomReservation};
use wayfare_core::notify::{EventSink, Notifier};
use wayfare_core::reference::{City, CityRates, Guide, Hotel, Poi, RoomType};
use wayfare_core::repository::ReferenceData;
use wayfare_core::{CoreError, CoreResult, HoldTag};
use wayfare_shared::BookingEvent;

use crate::models::{
    ChatRole, LedgerEntry, Order, OrderItem, OrderStatus, PaymentRecord, RefundPolicy,
    TransactionSource, Trip, TripBooking, TripDay, TripHotel, WalletMovement,
};
use crate::repository::{
    BookingStore, BookingTx, ChatRepository, InventoryRepository, LedgerRepository, TripRepository,
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub trips: HashMap<Uuid, Trip>,
    pub itineraries: HashMap<Uuid, Vec<TripDay>>,
    pub trip_hotels: HashMap<Uuid, TripHotel>,
    pub bookings: HashMap<Uuid, TripBooking>,
    pub orders: HashMap<Uuid, Order>,
    pub order_items: HashMap<Uuid, OrderItem>,
    pub wallets: HashMap<Uuid, i64>,
    pub ledger: Vec<LedgerEntry>,
    pub payments: Vec<PaymentRecord>,
    pub room_nights: HashMap<(Uuid, NaiveDate), RoomNight>,
    pub reservations: HashMap<HoldTag, RoomReservation>,
    pub guide_holds: Vec<GuideHold>,
    /// Room id to trip id.
    pub chat_rooms: HashMap<Uuid, Uuid>,
    pub chat_members: HashMap<Uuid, HashMap<Uuid, ChatRole>>,
    pub users: HashSet<Uuid>,
    pub admins: HashSet<Uuid>,
    pub refund_policies: HashMap<Uuid, RefundPolicy>,
}

impl MemoryState {
    pub fn room_night(&self, room_type_id: Uuid, date: NaiveDate) -> Option<&RoomNight> {
        self.room_nights.get(&(room_type_id, date))
    }

    pub fn chat_room_for(&self, trip_id: Uuid) -> Option<Uuid> {
        self.chat_rooms
            .iter()
            .find(|(_, t)| **t == trip_id)
            .map(|(room, _)| *room)
    }

    pub fn ledger_for(&self, user_id: Uuid) -> Vec<&LedgerEntry> {
        self.ledger.iter().filter(|e| e.user_id == user_id).collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    reference: Arc<MemoryReference>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reference(&self) -> Arc<MemoryReference> {
        self.reference.clone()
    }

    pub async fn add_user(&self, user_id: Uuid, admin: bool) {
        let mut state = self.state.lock().await;
        state.users.insert(user_id);
        if admin {
            state.admins.insert(user_id);
        }
    }

    /// Open a wallet, recording the opening balance as a top-up.
    pub async fn open_wallet(&self, user_id: Uuid, balance_cents: i64) {
        let mut state = self.state.lock().await;
        state.wallets.insert(user_id, balance_cents);
        if balance_cents != 0 {
            let movement = WalletMovement { balance_before_cents: 0, balance_after_cents: balance_cents };
            state
                .ledger
                .push(LedgerEntry::record(user_id, TransactionSource::Topup, movement, None));
        }
    }

    pub async fn add_refund_policy(&self, policy: RefundPolicy) {
        self.state.lock().await.refund_policies.insert(policy.id, policy);
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> CoreResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl BookingTx for MemoryTx {
    async fn commit(self) -> CoreResult<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl TripRepository for MemoryTx {
    async fn insert_trip(&mut self, trip: &Trip) -> CoreResult<()> {
        if self.work.trips.contains_key(&trip.id) {
            return Err(CoreError::Conflict(format!("trip {} already exists", trip.id)));
        }
        self.work.trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn update_trip(&mut self, trip: &Trip) -> CoreResult<()> {
        let slot = self
            .work
            .trips
            .get_mut(&trip.id)
            .ok_or_else(|| CoreError::not_found("trip", trip.id))?;
        *slot = trip.clone();
        Ok(())
    }

    async fn trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.work.trips.get(&id).cloned())
    }

    async fn lock_trip(&mut self, id: Uuid) -> CoreResult<Option<Trip>> {
        // The whole store is already held by this transaction
        Ok(self.work.trips.get(&id).cloned())
    }

    async fn delete_trip(&mut self, id: Uuid) -> CoreResult<()> {
        self.work.trips.remove(&id);
        self.work.itineraries.remove(&id);
        self.work.trip_hotels.remove(&id);
        Ok(())
    }

    async fn replace_itinerary(&mut self, trip_id: Uuid, days: &[TripDay]) -> CoreResult<()> {
        self.work.itineraries.insert(trip_id, days.to_vec());
        Ok(())
    }

    async fn itinerary(&mut self, trip_id: Uuid) -> CoreResult<Vec<TripDay>> {
        Ok(self.work.itineraries.get(&trip_id).cloned().unwrap_or_default())
    }

    async fn replace_trip_hotel(&mut self, trip_id: Uuid, hotel: Option<&TripHotel>) -> CoreResult<()> {
        match hotel {
            Some(h) => self.work.trip_hotels.insert(trip_id, h.clone()),
            None => self.work.trip_hotels.remove(&trip_id),
        };
        Ok(())
    }

    async fn trip_hotel(&mut self, trip_id: Uuid) -> CoreResult<Option<TripHotel>> {
        Ok(self.work.trip_hotels.get(&trip_id).cloned())
    }

    async fn insert_booking(&mut self, booking: &TripBooking) -> CoreResult<()> {
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn booking(&mut self, id: Uuid) -> CoreResult<Option<TripBooking>> {
        Ok(self.work.bookings.get(&id).cloned())
    }

    async fn active_seats(&mut self, trip_id: Uuid) -> CoreResult<i64> {
        Ok(self
            .work
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id && b.is_active())
            .map(|b| b.seats as i64)
            .sum())
    }

    async fn cancel_booking(&mut self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        let booking = self
            .work
            .bookings
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("booking", id))?;
        booking.cancelled_at = Some(at);
        Ok(())
    }

    async fn refund_policy(&mut self, id: Uuid) -> CoreResult<Option<RefundPolicy>> {
        Ok(self.work.refund_policies.get(&id).cloned())
    }
}

#[async_trait]
impl InventoryRepository for MemoryTx {
    async fn room_nights(&mut self, room_type_id: Uuid, dates: &[NaiveDate]) -> CoreResult<Vec<RoomNight>> {
        Ok(dates
            .iter()
            .filter_map(|d| self.work.room_nights.get(&(room_type_id, *d)).cloned())
            .collect())
    }

    async fn allocate_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight> {
        let mut row = self
            .work
            .room_nights
            .get(&(room_type_id, date))
            .cloned()
            .unwrap_or_else(|| RoomNight::fresh(room_type_id, date, total_rooms));
        row.allocate(rooms)?;
        self.work.room_nights.insert((room_type_id, date), row.clone());
        Ok(row)
    }

    async fn release_room_night(
        &mut self,
        room_type_id: Uuid,
        total_rooms: i32,
        date: NaiveDate,
        rooms: i32,
    ) -> CoreResult<RoomNight> {
        let row = self
            .work
            .room_nights
            .entry((room_type_id, date))
            .or_insert_with(|| RoomNight::fresh(room_type_id, date, total_rooms));
        row.release(rooms);
        Ok(row.clone())
    }

    async fn room_reservation(&mut self, tag: HoldTag) -> CoreResult<Option<RoomReservation>> {
        Ok(self.work.reservations.get(&tag).cloned())
    }

    async fn insert_room_reservation(&mut self, reservation: &RoomReservation) -> CoreResult<()> {
        if self.work.reservations.contains_key(&reservation.tag) {
            return Err(CoreError::Conflict(format!(
                "{} already holds a room reservation",
                reservation.tag
            )));
        }
        self.work.reservations.insert(reservation.tag, reservation.clone());
        Ok(())
    }

    async fn delete_room_reservation(&mut self, tag: HoldTag) -> CoreResult<()> {
        self.work.reservations.remove(&tag);
        Ok(())
    }

    async fn lock_guide(&mut self, _guide_id: Uuid) -> CoreResult<()> {
        Ok(())
    }

    async fn guide_holds(&mut self, guide_id: Uuid, start: NaiveDate, end: NaiveDate) -> CoreResult<Vec<GuideHold>> {
        Ok(self
            .work
            .guide_holds
            .iter()
            .filter(|h| h.guide_id == guide_id && overlaps(h.start_date, h.end_date, start, end))
            .cloned()
            .collect())
    }

    async fn insert_guide_hold(&mut self, hold: &GuideHold) -> CoreResult<()> {
        let clash = self.work.guide_holds.iter().any(|h| {
            h.guide_id == hold.guide_id
                && h.tag != hold.tag
                && overlaps(h.start_date, h.end_date, hold.start_date, hold.end_date)
        });
        if clash {
            return Err(CoreError::Conflict(format!(
                "guide {} already held between {} and {}",
                hold.guide_id, hold.start_date, hold.end_date
            )));
        }
        self.work.guide_holds.push(hold.clone());
        Ok(())
    }

    async fn delete_guide_holds(&mut self, tag: HoldTag) -> CoreResult<u64> {
        let before = self.work.guide_holds.len();
        self.work.guide_holds.retain(|h| h.tag != tag);
        Ok((before - self.work.guide_holds.len()) as u64)
    }
}

#[async_trait]
impl LedgerRepository for MemoryTx {
    async fn debit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement> {
        let balance = self
            .work
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| CoreError::not_found("wallet for user", user_id))?;
        if *balance < amount_cents {
            return Err(CoreError::InsufficientFunds {
                required_cents: amount_cents,
                available_cents: *balance,
            });
        }
        let before = *balance;
        *balance -= amount_cents;
        Ok(WalletMovement { balance_before_cents: before, balance_after_cents: *balance })
    }

    async fn credit_wallet(&mut self, user_id: Uuid, amount_cents: i64) -> CoreResult<WalletMovement> {
        let balance = self
            .work
            .wallets
            .get_mut(&user_id)
            .ok_or_else(|| CoreError::not_found("wallet for user", user_id))?;
        let before = *balance;
        *balance += amount_cents;
        Ok(WalletMovement { balance_before_cents: before, balance_after_cents: *balance })
    }

    async fn wallet_balance(&mut self, user_id: Uuid) -> CoreResult<Option<i64>> {
        Ok(self.work.wallets.get(&user_id).copied())
    }

    async fn insert_order(&mut self, order: &Order) -> CoreResult<()> {
        self.work.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&mut self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn update_order_status(&mut self, id: Uuid, status: OrderStatus) -> CoreResult<()> {
        let order = self
            .work
            .orders
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("order", id))?;
        order.update_status(status);
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> CoreResult<()> {
        self.work.order_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn order_items(&mut self, order_id: Uuid) -> CoreResult<Vec<OrderItem>> {
        Ok(self
            .work
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn record_item_refund(&mut self, item_id: Uuid, refunded_cents: i64) -> CoreResult<()> {
        let item = self
            .work
            .order_items
            .get_mut(&item_id)
            .ok_or_else(|| CoreError::not_found("order item", item_id))?;
        item.refunded_cents = Some(refunded_cents);
        Ok(())
    }

    async fn append_ledger(&mut self, entry: &LedgerEntry) -> CoreResult<()> {
        self.work.ledger.push(entry.clone());
        Ok(())
    }

    async fn ledger(&mut self, user_id: Uuid) -> CoreResult<Vec<LedgerEntry>> {
        Ok(self.work.ledger_for(user_id).into_iter().cloned().collect())
    }

    async fn insert_payment(&mut self, payment: &PaymentRecord) -> CoreResult<()> {
        self.work.payments.push(payment.clone());
        Ok(())
    }
}

#[async_trait]
impl ChatRepository for MemoryTx {
    async fn chat_room_for_trip(&mut self, trip_id: Uuid) -> CoreResult<Option<Uuid>> {
        Ok(self.work.chat_room_for(trip_id))
    }

    async fn create_chat_room(&mut self, trip_id: Uuid) -> CoreResult<Uuid> {
        if let Some(existing) = self.work.chat_room_for(trip_id) {
            return Ok(existing);
        }
        let room_id = Uuid::new_v4();
        self.work.chat_rooms.insert(room_id, trip_id);
        self.work.chat_members.insert(room_id, HashMap::new());
        Ok(room_id)
    }

    async fn add_chat_member(&mut self, room_id: Uuid, user_id: Uuid, role: ChatRole) -> CoreResult<bool> {
        let members = self
            .work
            .chat_members
            .get_mut(&room_id)
            .ok_or_else(|| CoreError::not_found("chat room", room_id))?;
        if members.contains_key(&user_id) {
            return Ok(false);
        }
        members.insert(user_id, role);
        Ok(true)
    }

    async fn remove_chat_member(&mut self, room_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        if let Some(members) = self.work.chat_members.get_mut(&room_id) {
            members.remove(&user_id);
        }
        Ok(())
    }

    async fn chat_member_count(&mut self, room_id: Uuid) -> CoreResult<i64> {
        Ok(self.work.chat_members.get(&room_id).map(|m| m.len() as i64).unwrap_or(0))
    }

    async fn delete_chat_room(&mut self, room_id: Uuid) -> CoreResult<()> {
        self.work.chat_rooms.remove(&room_id);
        self.work.chat_members.remove(&room_id);
        Ok(())
    }

    async fn existing_users(&mut self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        Ok(ids.iter().filter(|id| self.work.users.contains(*id)).copied().collect())
    }

    async fn admin_user_ids(&mut self) -> CoreResult<Vec<Uuid>> {
        let mut admins: Vec<Uuid> = self.work.admins.iter().copied().collect();
        admins.sort();
        Ok(admins)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceState {
    pub cities: HashMap<Uuid, City>,
    pub rates: HashMap<Uuid, CityRates>,
    pub hotels: HashMap<Uuid, Hotel>,
    pub room_types: HashMap<Uuid, RoomType>,
    pub pois: HashMap<Uuid, Poi>,
    pub guides: HashMap<Uuid, Guide>,
    pub tags: HashSet<Uuid>,
}

/// Reference data held in memory.
#[derive(Default)]
pub struct MemoryReference {
    state: RwLock<ReferenceState>,
}

impl MemoryReference {
    pub async fn insert_city(&self, city: City) {
        self.state.write().await.cities.insert(city.id, city);
    }

    pub async fn set_city_rates(&self, city_id: Uuid, rates: CityRates) {
        self.state.write().await.rates.insert(city_id, rates);
    }

    pub async fn insert_hotel(&self, hotel: Hotel) {
        self.state.write().await.hotels.insert(hotel.id, hotel);
    }

    pub async fn insert_room_type(&self, room_type: RoomType) {
        self.state.write().await.room_types.insert(room_type.id, room_type);
    }

    pub async fn insert_poi(&self, poi: Poi) {
        self.state.write().await.pois.insert(poi.id, poi);
    }

    pub async fn insert_guide(&self, guide: Guide) {
        self.state.write().await.guides.insert(guide.id, guide);
    }

    pub async fn insert_tag(&self, tag_id: Uuid) {
        self.state.write().await.tags.insert(tag_id);
    }
}

#[async_trait]
impl ReferenceData for MemoryReference {
    async fn city(&self, id: Uuid) -> CoreResult<Option<City>> {
        Ok(self.state.read().await.cities.get(&id).cloned())
    }

    async fn city_rates(&self, city_id: Uuid) -> CoreResult<CityRates> {
        Ok(self.state.read().await.rates.get(&city_id).cloned().unwrap_or_default())
    }

    async fn hotel(&self, id: Uuid) -> CoreResult<Option<Hotel>> {
        Ok(self.state.read().await.hotels.get(&id).cloned())
    }

    async fn room_type(&self, id: Uuid) -> CoreResult<Option<RoomType>> {
        Ok(self.state.read().await.room_types.get(&id).cloned())
    }

    async fn pois(&self, ids: &[Uuid]) -> CoreResult<Vec<Poi>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.pois.get(id).cloned()).collect())
    }

    async fn guide(&self, id: Uuid) -> CoreResult<Option<Guide>> {
        Ok(self.state.read().await.guides.get(&id).cloned())
    }

    async fn missing_tags(&self, ids: &[Uuid]) -> CoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter(|id| !state.tags.contains(*id)).copied().collect())
    }
}

/// Notifier and event sink that keep what they receive. `failing()` builds one
/// that rejects every call.
#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    notifications: Mutex<Vec<(Uuid, String)>>,
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub async fn notifications(&self) -> Vec<(Uuid, String)> {
        self.notifications.lock().await.clone()
    }

    pub async fn events(&self) -> Vec<BookingEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        _body: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err("notification channel unavailable".into());
        }
        self.notifications.lock().await.push((user_id, title.to_string()));
        Ok(())
    }
}

#[async_trait]
impl EventSink for RecordingNotifier {
    async fn emit(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail {
            return Err("event broker unavailable".into());
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
