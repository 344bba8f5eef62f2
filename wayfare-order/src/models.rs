use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wayfare_catalog::PriceQuote;
use wayfare_core::{DayPlan, GeoPoint, HoldTag, PoiVisit, SeatPolicy, SourceType, TripDraft, TripType};

/// A persisted, bookable itinerary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub city_id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub trip_type: TripType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub price_per_person_cents: i64,
    pub seats: SeatPolicy,
    pub with_meals: bool,
    pub with_transport: bool,
    pub hotel_included: bool,
    pub poi_price_per_person_cents: i64,
    pub meal_price_per_person_cents: i64,
    pub transport_price_per_person_cents: i64,
    pub guide_id: Option<Uuid>,
    pub meet_point: Option<GeoPoint>,
    pub drop_point: Option<GeoPoint>,
    pub refund_policy_id: Option<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn from_draft(
        creator_id: Uuid,
        draft: &TripDraft,
        trip_type: TripType,
        seats: SeatPolicy,
        quote: &PriceQuote,
    ) -> Self {
        let now = Utc::now();
        let mut trip = Self {
            id: Uuid::new_v4(),
            city_id: draft.city_id,
            creator_id,
            name: String::new(),
            trip_type,
            start_date: draft.start_date,
            end_date: draft.end_date,
            price_per_person_cents: 0,
            seats,
            with_meals: false,
            with_transport: false,
            hotel_included: false,
            poi_price_per_person_cents: 0,
            meal_price_per_person_cents: 0,
            transport_price_per_person_cents: 0,
            guide_id: None,
            meet_point: None,
            drop_point: None,
            refund_policy_id: None,
            tag_ids: Vec::new(),
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        trip.apply_draft(draft, seats, quote);
        trip
    }

    /// Overwrite every draft-derived field and the price snapshot.
    pub fn apply_draft(&mut self, draft: &TripDraft, seats: SeatPolicy, quote: &PriceQuote) {
        self.city_id = draft.city_id;
        self.name = draft.name.clone();
        self.start_date = draft.start_date;
        self.end_date = draft.end_date;
        self.price_per_person_cents = quote.per_person_cents;
        self.seats = seats;
        self.with_meals = draft.with_meals;
        self.with_transport = draft.with_transport;
        self.hotel_included = draft.hotel_included;
        self.poi_price_per_person_cents = quote.per_person.poi_cents;
        self.meal_price_per_person_cents = quote.per_person.meals_cents;
        self.transport_price_per_person_cents = quote.per_person.transport_cents;
        self.guide_id = draft.guide_id;
        self.meet_point = draft.meet_point;
        self.drop_point = draft.drop_point;
        self.refund_policy_id = draft.refund_policy_id;
        self.tag_ids = draft.tag_ids.clone();
        self.attachments = draft.attachments.clone();
        self.updated_at = Utc::now();
    }

    pub fn source_type(&self) -> SourceType {
        match self.trip_type {
            TripType::Custom => SourceType::CustomTrip,
            TripType::Predefined => SourceType::PredefinedTrip,
        }
    }

    /// The tag every room and guide hold created for this trip carries.
    pub fn hold_tag(&self) -> HoldTag {
        HoldTag::new(self.source_type(), self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripDay {
    pub trip_id: Uuid,
    pub day_number: i32,
    pub pois: Vec<PoiVisit>,
}

impl TripDay {
    pub fn from_plan(trip_id: Uuid, plan: &DayPlan) -> Self {
        Self {
            trip_id,
            day_number: plan.day_number,
            pois: plan.ordered_visits(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TripHotel {
    pub trip_id: Uuid,
    pub hotel_id: Uuid,
    pub room_type_id: Uuid,
    pub rooms_needed: i32,
}

/// A user's seats on a trip, tied to the order that paid for them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripBooking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub seats: i32,
    pub total_cents: i64,
    pub source: SourceType,
    pub order_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TripBooking {
    pub fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }
}

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(OrderStatus::Pending),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// One order per booking transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user_id: Uuid, total_cents: i64, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            total_cents,
            currency: currency.to_string(),
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

pub const TRIP_ITEM: &str = "TRIP";

/// Snapshot of what was sold; never deleted, only marked refunded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_type: String,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub refund_policy_id: Option<Uuid>,
    pub refunded_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn trip(order_id: Uuid, trip: &Trip, seats: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_type: TRIP_ITEM.to_string(),
            product_id: trip.id,
            quantity: seats,
            unit_price_cents: trip.price_per_person_cents,
            total_price_cents: trip.price_per_person_cents * seats as i64,
            refund_policy_id: trip.refund_policy_id,
            refunded_cents: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSource {
    Topup,
    Booking,
    Refund,
    AdminAdjust,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Topup => "TOPUP",
            TransactionSource::Booking => "BOOKING",
            TransactionSource::Refund => "REFUND",
            TransactionSource::AdminAdjust => "ADMIN_ADJUST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "TOPUP" => Some(TransactionSource::Topup),
            "BOOKING" => Some(TransactionSource::Booking),
            "REFUND" => Some(TransactionSource::Refund),
            "ADMIN_ADJUST" => Some(TransactionSource::AdminAdjust),
            _ => None,
        }
    }
}

/// Balance before and after a single wallet mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletMovement {
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
}

/// One append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Signed: debits are negative.
    pub amount_cents: i64,
    pub source: TransactionSource,
    pub balance_before_cents: i64,
    pub balance_after_cents: i64,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn record(
        user_id: Uuid,
        source: TransactionSource,
        movement: WalletMovement,
        order_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount_cents: movement.balance_after_cents - movement.balance_before_cents,
            source,
            balance_before_cents: movement.balance_before_cents,
            balance_after_cents: movement.balance_after_cents,
            order_id,
            created_at: Utc::now(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.balance_after_cents == self.balance_before_cents + self.amount_cents
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Posted,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Posted => "POSTED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

pub const WALLET_METHOD: &str = "WALLET";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn wallet(user_id: Uuid, order_id: Uuid, amount_cents: i64, status: PaymentStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            order_id,
            amount_cents,
            status,
            method: WALLET_METHOD.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundTier {
    /// Inclusive lower bound on whole days before the trip starts.
    pub min_days: i64,
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundPolicy {
    pub id: Uuid,
    pub name: String,
    pub tiers: Vec<RefundTier>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRole {
    Customer,
    Guide,
    Admin,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Customer => "CUSTOMER",
            ChatRole::Guide => "GUIDE",
            ChatRole::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletStatement {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub entries: Vec<LedgerEntry>,
    /// Every row balances and the last row matches the stored balance.
    pub consistent: bool,
}

impl WalletStatement {
    /// `entries` must be in append order.
    pub fn new(user_id: Uuid, balance_cents: i64, entries: Vec<LedgerEntry>) -> Self {
        let rows_balance = entries.iter().all(LedgerEntry::is_balanced);
        let chained = entries
            .windows(2)
            .all(|pair| pair[0].balance_after_cents == pair[1].balance_before_cents);
        let tail_matches = match entries.last() {
            Some(last) => last.balance_after_cents == balance_cents,
            None => balance_cents == 0,
        };
        Self {
            user_id,
            balance_cents,
            consistent: rows_balance && chained && tail_matches,
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(before: i64, after: i64) -> WalletMovement {
        WalletMovement { balance_before_cents: before, balance_after_cents: after }
    }

    #[test]
    fn test_ledger_entry_is_signed() {
        let user = Uuid::new_v4();
        let debit = LedgerEntry::record(user, TransactionSource::Booking, movement(10_000, 2_000), None);
        assert_eq!(debit.amount_cents, -8_000);
        assert!(debit.is_balanced());
    }

    #[test]
    fn test_statement_detects_drift() {
        let user = Uuid::new_v4();
        let entries = vec![
            LedgerEntry::record(user, TransactionSource::Topup, movement(0, 10_000), None),
            LedgerEntry::record(user, TransactionSource::Booking, movement(10_000, 4_000), None),
        ];
        assert!(WalletStatement::new(user, 4_000, entries.clone()).consistent);
        assert!(!WalletStatement::new(user, 5_000, entries.clone()).consistent);

        let mut broken = entries;
        broken[1].balance_before_cents = 9_000;
        assert!(!WalletStatement::new(user, 4_000, broken).consistent);
    }

    #[test]
    fn test_order_status_strings() {
        for status in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Cancelled] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionSource::parse("REFUND"), Some(TransactionSource::Refund));
    }
}
