use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// One installment "month" is a fixed 30-day window, matching the storefront's
/// payment terms (1 bulan = 30 hari).
pub const DAYS_PER_DURATION_MONTH: i64 = 30;

/* ================== Users & catalog ================== */

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct User {
    pub id: String,
    pub nim: Option<String>,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    pub image: Option<String>,
    pub category: String,
    pub stock: i64,
}

/* ================== Statuses ================== */

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(Self::Unpaid),
            "paid" => Some(Self::Paid),
            "overdue" => Some(Self::Overdue),
            _ => None,
        }
    }
}

/* ================== Orders ================== */

/// Immediate ("buy now") order. Customer and book fields are snapshotted at
/// order time so later catalog edits do not alter the historical record.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: String,
    pub user_room: String,
    pub book_id: String,
    pub book_title: String,
    pub book_author: String,
    pub book_description: String,
    pub book_price: f64,
    pub book_image: Option<String>,
    pub book_category: String,
    pub quantity: i64,
    pub total_price: f64,
    pub order_status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Deferred ("buy later") order: the aggregate root of the installment
/// ledger. `total_price` and `due_date` are fixed at creation and never
/// recomputed from the catalog afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BuyLaterOrder {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: String,
    pub user_room: String,
    pub book_id: String,
    pub book_title: String,
    pub book_author: String,
    pub book_description: String,
    pub book_price: f64,
    pub book_image: Option<String>,
    pub book_category: String,
    pub quantity: i64,
    pub total_price: f64,
    /// Months the customer has to settle the balance: 1 or 2.
    pub payment_duration: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl BuyLaterOrder {
    pub fn create(
        user: &User,
        phone: &str,
        room: &str,
        book: &Book,
        quantity: i64,
        payment_duration: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            user_phone: phone.to_string(),
            user_room: room.to_string(),
            book_id: book.id.clone(),
            book_title: book.title.clone(),
            book_author: book.author.clone(),
            book_description: book.description.clone(),
            book_price: book.price,
            book_image: book.image.clone(),
            book_category: book.category.clone(),
            quantity,
            total_price: book.price * quantity as f64,
            payment_duration,
            due_date: due_date_for(now, payment_duration),
            order_status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Order {
    pub fn create(
        user: &User,
        phone: &str,
        room: &str,
        book: &Book,
        quantity: i64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            user_phone: phone.to_string(),
            user_room: room.to_string(),
            book_id: book.id.clone(),
            book_title: book.title.clone(),
            book_author: book.author.clone(),
            book_description: book.description.clone(),
            book_price: book.price,
            book_image: book.image.clone(),
            book_category: book.category.clone(),
            quantity,
            total_price: book.price * quantity as f64,
            order_status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/* ================== Payments ================== */

/// One installment against a buy-later order. Append-only: corrections are
/// made with a new offsetting record, never by editing an existing one.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Payment {
    pub id: String,
    pub buy_later_order_id: String,
    pub amount: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub payment_date: OffsetDateTime,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Payment {
    pub fn new(order_id: &str, amount: f64, notes: Option<String>, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            buy_later_order_id: order_id.to_string(),
            amount,
            payment_date: now,
            notes,
            created_at: now,
            updated_at: now,
        }
    }
}

/* ================== Balance calculator ================== */

pub fn total_paid(payments: &[Payment]) -> f64 {
    payments.iter().map(|p| p.amount).sum()
}

/// Remaining balance, floored at zero. Overpayment is prevented at
/// record time, not here.
pub fn remaining_balance(total_price: f64, payments: &[Payment]) -> f64 {
    (total_price - total_paid(payments)).max(0.0)
}

/* ================== Status policy ================== */

pub fn due_date_for(created_at: OffsetDateTime, payment_duration: i64) -> OffsetDateTime {
    created_at + Duration::days(DAYS_PER_DURATION_MONTH * payment_duration)
}

pub fn is_fully_paid(remaining: f64) -> bool {
    remaining <= 0.0
}

/// Overdue is a derived view, not persisted truth: evaluated against an
/// explicit `now` whenever an order is read.
pub fn is_overdue(due_date: OffsetDateTime, remaining: f64, now: OffsetDateTime) -> bool {
    now > due_date && remaining > 0.0
}

/// Payment status as the policy would report it right now, regardless of
/// what is stored on the order.
pub fn effective_payment_status(
    due_date: OffsetDateTime,
    remaining: f64,
    now: OffsetDateTime,
) -> PaymentStatus {
    if is_fully_paid(remaining) {
        PaymentStatus::Paid
    } else if is_overdue(due_date, remaining, now) {
        PaymentStatus::Overdue
    } else {
        PaymentStatus::Unpaid
    }
}

/* ================== Tests ================== */
