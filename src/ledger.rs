use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::error::LedgerError;
use crate::model::{
    self, BuyLaterOrder, Order, OrderStatus, Payment, PaymentStatus,
};
use crate::store::LedgerStore;

/* ================== Requests & views ================== */

#[derive(Deserialize, Clone, Debug)]
pub struct NewBuyLaterOrder {
    pub user_id: String,
    pub user_phone: String,
    pub user_room: String,
    pub book_id: String,
    pub quantity: i64,
    pub payment_duration: i64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewOrder {
    pub user_id: String,
    pub user_phone: String,
    pub user_room: String,
    pub book_id: String,
    pub quantity: i64,
}

/// A buy-later order decorated with the balance calculator's output and the
/// status the policy would report right now.
#[derive(Serialize, Clone, Debug)]
pub struct BuyLaterOrderView {
    #[serde(flatten)]
    pub order: BuyLaterOrder,
    pub total_paid: f64,
    pub remaining_balance: f64,
    pub effective_payment_status: PaymentStatus,
}

#[derive(Serialize, Clone, Debug)]
pub struct AnalyticsSummary {
    pub total_revenue: f64,
    pub total_orders: u64,
    pub total_customers: u64,
    pub total_kitab_sold: i64,
    pub pending_buy_later: u64,
    pub overdue_payments: u64,
    pub average_order_value: f64,
}

/* ================== Ledger service ================== */

/// The deferred-payment ledger: owns order creation, the append-only payment
/// record and status transitions, on top of a [`LedgerStore`].
///
/// Payment recording is serialized per order id so two concurrent payments
/// cannot both pass the remaining-balance check.
pub struct Ledger<S> {
    store: S,
    payment_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            payment_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock_for(&self, order_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.payment_locks.lock().unwrap_or_else(|e| e.into_inner());
        // A strong count of 1 means only the map still holds the entry: no
        // recording is in flight for that order, so the lock can go instead
        // of accumulating one per order ever paid against.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /* ---- order ledger ---- */

    /// Identity check, validation and snapshot for both order kinds.
    /// Fails closed when the acting customer has no stored profile.
    async fn verify_customer(
        &self,
        user_id: &str,
        phone: &str,
        room: &str,
    ) -> Result<model::User, LedgerError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::validation("profile not found"))?;
        if phone.trim().is_empty() {
            return Err(LedgerError::validation("phone number is required"));
        }
        if room.trim().is_empty() {
            return Err(LedgerError::validation("room number is required"));
        }
        Ok(user)
    }

    async fn checked_book(
        &self,
        book_id: &str,
        quantity: i64,
    ) -> Result<model::Book, LedgerError> {
        if quantity < 1 {
            return Err(LedgerError::validation("quantity must be at least 1"));
        }
        let book = self
            .store
            .find_book(book_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("book {book_id} not found")))?;
        if quantity > book.stock {
            return Err(LedgerError::validation(format!(
                "only {} of \"{}\" in stock",
                book.stock, book.title
            )));
        }
        Ok(book)
    }

    /// Decrement stock first, insert the order second, and compensate the
    /// decrement if the insert fails, so order existence and stock accuracy
    /// cannot drift apart.
    async fn reserve_stock(&self, book: &model::Book, quantity: i64) -> Result<(), LedgerError> {
        let reserved = self.store.try_decrement_stock(&book.id, quantity).await?;
        if !reserved {
            return Err(LedgerError::validation(format!(
                "insufficient stock for \"{}\"",
                book.title
            )));
        }
        Ok(())
    }

    async fn release_stock(&self, book_id: &str, quantity: i64) {
        if let Err(e) = self.store.restore_stock(book_id, quantity).await {
            warn!(book_id, quantity, error = %e, "stock compensation failed");
        }
    }

    pub async fn create_buy_later_order(
        &self,
        req: &NewBuyLaterOrder,
    ) -> Result<BuyLaterOrder, LedgerError> {
        let user = self
            .verify_customer(&req.user_id, &req.user_phone, &req.user_room)
            .await?;
        if !(1..=2).contains(&req.payment_duration) {
            return Err(LedgerError::validation(
                "payment duration must be 1 or 2 months",
            ));
        }
        let book = self.checked_book(&req.book_id, req.quantity).await?;
        self.reserve_stock(&book, req.quantity).await?;

        let order = BuyLaterOrder::create(
            &user,
            req.user_phone.trim(),
            req.user_room.trim(),
            &book,
            req.quantity,
            req.payment_duration,
            OffsetDateTime::now_utc(),
        );
        if let Err(e) = self.store.insert_buy_later_order(&order).await {
            self.release_stock(&book.id, req.quantity).await;
            return Err(e);
        }
        Ok(order)
    }

    pub async fn create_order(&self, req: &NewOrder) -> Result<Order, LedgerError> {
        let user = self
            .verify_customer(&req.user_id, &req.user_phone, &req.user_room)
            .await?;
        let book = self.checked_book(&req.book_id, req.quantity).await?;
        self.reserve_stock(&book, req.quantity).await?;

        let order = Order::create(
            &user,
            req.user_phone.trim(),
            req.user_room.trim(),
            &book,
            req.quantity,
            OffsetDateTime::now_utc(),
        );
        if let Err(e) = self.store.insert_order(&order).await {
            self.release_stock(&book.id, req.quantity).await;
            return Err(e);
        }
        Ok(order)
    }

    /// Admin transition of `order_status`. No source-state check: any status
    /// may move to any other.
    pub async fn set_buy_later_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), LedgerError> {
        let updated = self
            .store
            .update_buy_later_order_status(order_id, status, OffsetDateTime::now_utc())
            .await?;
        if !updated {
            return Err(LedgerError::not_found(format!("order {order_id} not found")));
        }
        Ok(())
    }

    pub async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), LedgerError> {
        let updated = self
            .store
            .update_order_status(order_id, status, OffsetDateTime::now_utc())
            .await?;
        if !updated {
            return Err(LedgerError::not_found(format!("order {order_id} not found")));
        }
        Ok(())
    }

    /// Manual admin override of `payment_status`, independent of what the
    /// balance calculator says.
    pub async fn set_payment_status(
        &self,
        order_id: &str,
        status: PaymentStatus,
    ) -> Result<(), LedgerError> {
        let updated = self
            .store
            .update_buy_later_payment_status(order_id, status, OffsetDateTime::now_utc())
            .await?;
        if !updated {
            return Err(LedgerError::not_found(format!("order {order_id} not found")));
        }
        Ok(())
    }

    /* ---- payment ledger ---- */

    /// Append one installment against an order. Serialized per order id:
    /// the balance check and the insert happen under the order's lock.
    pub async fn record_payment(
        &self,
        order_id: &str,
        amount: f64,
        notes: Option<String>,
    ) -> Result<Payment, LedgerError> {
        let lock = self.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self
            .store
            .find_buy_later_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id} not found")))?;

        if !(amount > 0.0) {
            return Err(LedgerError::validation("payment amount must be positive"));
        }
        let payments = self.store.payments_for_order(order_id).await?;
        let remaining = model::remaining_balance(order.total_price, &payments);
        if amount > remaining {
            return Err(LedgerError::validation(format!(
                "payment of {amount} exceeds remaining balance of {remaining}"
            )));
        }

        let payment = Payment::new(order_id, amount, notes, OffsetDateTime::now_utc());
        self.store.insert_payment(&payment).await?;

        // Automatic promotion on full payment. The payment record is already
        // durable, so a failed status write is logged for the read-side
        // reconciliation to repair rather than surfaced as an error.
        if model::is_fully_paid(remaining - amount) {
            if let Err(e) = self
                .store
                .update_buy_later_payment_status(
                    order_id,
                    PaymentStatus::Paid,
                    OffsetDateTime::now_utc(),
                )
                .await
            {
                warn!(order_id, error = %e, "paid-status promotion failed");
            }
        }
        Ok(payment)
    }

    pub async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>, LedgerError> {
        self.store
            .find_buy_later_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id} not found")))?;
        self.store.payments_for_order(order_id).await
    }

    /* ---- status policy ---- */

    /// Align the stored `payment_status` with the balance calculator and the
    /// due date. Runs under the order's payment lock so it cannot interleave
    /// with a recording in flight. Returns the reconciled status.
    pub async fn reconcile_payment_status(
        &self,
        order_id: &str,
    ) -> Result<PaymentStatus, LedgerError> {
        let lock = self.lock_for(order_id);
        let _guard = lock.lock().await;

        let order = self
            .store
            .find_buy_later_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id} not found")))?;
        let payments = self.store.payments_for_order(order_id).await?;
        let remaining = model::remaining_balance(order.total_price, &payments);
        let effective = model::effective_payment_status(
            order.due_date,
            remaining,
            OffsetDateTime::now_utc(),
        );
        if effective != order.payment_status {
            self.store
                .update_buy_later_payment_status(order_id, effective, OffsetDateTime::now_utc())
                .await?;
        }
        Ok(effective)
    }

    /* ---- read side ---- */

    fn decorate(&self, order: BuyLaterOrder, payments: &[Payment]) -> BuyLaterOrderView {
        let total_paid = model::total_paid(payments);
        let remaining_balance = model::remaining_balance(order.total_price, payments);
        let effective_payment_status = model::effective_payment_status(
            order.due_date,
            remaining_balance,
            OffsetDateTime::now_utc(),
        );
        BuyLaterOrderView {
            order,
            total_paid,
            remaining_balance,
            effective_payment_status,
        }
    }

    pub async fn buy_later_order_view(
        &self,
        order_id: &str,
    ) -> Result<BuyLaterOrderView, LedgerError> {
        let order = self
            .store
            .find_buy_later_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("order {order_id} not found")))?;
        let payments = self.store.payments_for_order(order_id).await?;
        Ok(self.decorate(order, &payments))
    }

    pub async fn list_buy_later_views(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<BuyLaterOrderView>, LedgerError> {
        let orders = self.store.list_buy_later_orders(user_id).await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            let payments = self.store.payments_for_order(&order.id).await?;
            out.push(self.decorate(order, &payments));
        }
        Ok(out)
    }

    /* ---- analytics ---- */

    pub async fn analytics_summary(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<AnalyticsSummary, LedgerError> {
        let now = OffsetDateTime::now_utc();
        let orders = self.store.list_orders(None).await?;
        let buy_later = self.store.list_buy_later_orders(None).await?;

        let in_range = |t: OffsetDateTime| t >= start && t <= end;

        let mut total_revenue = 0.0;
        let mut total_orders = 0u64;
        let mut total_kitab_sold = 0i64;
        let mut customers = std::collections::HashSet::new();
        let mut pending_buy_later = 0u64;
        let mut overdue_payments = 0u64;

        for o in orders.iter().filter(|o| in_range(o.created_at)) {
            total_orders += 1;
            customers.insert(o.user_id.clone());
            if o.order_status != OrderStatus::Cancelled {
                total_revenue += o.total_price;
                total_kitab_sold += o.quantity;
            }
        }

        for o in buy_later.iter().filter(|o| in_range(o.created_at)) {
            total_orders += 1;
            customers.insert(o.user_id.clone());
            if o.order_status != OrderStatus::Cancelled {
                total_revenue += o.total_price;
                total_kitab_sold += o.quantity;
            }
            let payments = self.store.payments_for_order(&o.id).await?;
            let remaining = model::remaining_balance(o.total_price, &payments);
            // Both counts follow the derived payment status: an installment
            // plan still owing money is pending regardless of order status.
            match model::effective_payment_status(o.due_date, remaining, now) {
                PaymentStatus::Unpaid => pending_buy_later += 1,
                PaymentStatus::Overdue => overdue_payments += 1,
                PaymentStatus::Paid => {}
            }
        }

        let average_order_value = if total_orders > 0 {
            total_revenue / total_orders as f64
        } else {
            0.0
        };

        Ok(AnalyticsSummary {
            total_revenue,
            total_orders,
            total_customers: customers.len() as u64,
            total_kitab_sold,
            pending_buy_later,
            overdue_payments,
            average_order_value,
        })
    }
}

/* ================== Tests ================== */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Book, User};
    use crate::store::testing::MemStore;
    use time::Duration;

    fn user() -> User {
        User {
            id: "u-1".into(),
            nim: Some("210001".into()),
            name: "Santri".into(),
            email: "santri@example.com".into(),
            role: "user".into(),
        }
    }

    fn book() -> Book {
        Book {
            id: "b-1".into(),
            title: "Fathul Qarib".into(),
            author: "Ibn Qasim".into(),
            description: "Fiqh".into(),
            price: 75_000.0,
            image: None,
            category: "Fiqh".into(),
            stock: 10,
        }
    }

    fn ledger() -> Ledger<MemStore> {
        Ledger::new(MemStore::with_user_and_book(user(), book()))
    }

    fn buy_later_req() -> NewBuyLaterOrder {
        NewBuyLaterOrder {
            user_id: "u-1".into(),
            user_phone: "0812".into(),
            user_room: "A-12".into(),
            book_id: "b-1".into(),
            quantity: 2,
            payment_duration: 1,
        }
    }

    async fn order_of_150k(ledger: &Ledger<MemStore>) -> BuyLaterOrder {
        ledger.create_buy_later_order(&buy_later_req()).await.unwrap()
    }

    fn assert_validation(err: LedgerError, needle: &str) {
        match err {
            LedgerError::Validation(msg) => {
                assert!(msg.contains(needle), "message {msg:?} missing {needle:?}")
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_snapshots_price_and_decrements_stock() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;
        assert_eq!(order.total_price, 150_000.0);
        assert_eq!(order.due_date, order.created_at + Duration::days(30));
        assert_eq!(order.order_status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);

        let book = ledger.store().find_book("b-1").await.unwrap().unwrap();
        assert_eq!(book.stock, 8);
    }

    #[tokio::test]
    async fn create_fails_closed_without_profile() {
        let ledger = ledger();
        let mut req = buy_later_req();
        req.user_id = "ghost".into();
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "profile not found",
        );
    }

    #[tokio::test]
    async fn create_requires_phone_and_room() {
        let ledger = ledger();
        let mut req = buy_later_req();
        req.user_phone = "   ".into();
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "phone",
        );

        let mut req = buy_later_req();
        req.user_room = String::new();
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "room",
        );
    }

    #[tokio::test]
    async fn create_rejects_bad_duration_and_quantity() {
        let ledger = ledger();
        let mut req = buy_later_req();
        req.payment_duration = 3;
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "duration",
        );

        let mut req = buy_later_req();
        req.quantity = 0;
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "quantity",
        );

        let mut req = buy_later_req();
        req.quantity = 11;
        assert_validation(
            ledger.create_buy_later_order(&req).await.unwrap_err(),
            "in stock",
        );
    }

    #[tokio::test]
    async fn create_rejects_unknown_book() {
        let ledger = ledger();
        let mut req = buy_later_req();
        req.book_id = "b-404".into();
        match ledger.create_buy_later_order(&req).await.unwrap_err() {
            LedgerError::NotFound(msg) => assert!(msg.contains("b-404")),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn partial_payment_updates_balance_but_not_status() {
        // Scenario A: 150000 order, one 50000 installment.
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;

        ledger.record_payment(&order.id, 50_000.0, None).await.unwrap();

        let view = ledger.buy_later_order_view(&order.id).await.unwrap();
        assert_eq!(view.total_paid, 50_000.0);
        assert_eq!(view.remaining_balance, 100_000.0);
        assert_eq!(view.order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(view.effective_payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn settling_payment_promotes_and_further_payments_fail() {
        // Scenario B: 50000 then 100000 settles the order.
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;

        ledger.record_payment(&order.id, 50_000.0, None).await.unwrap();
        ledger
            .record_payment(&order.id, 100_000.0, Some("lunas".into()))
            .await
            .unwrap();

        let view = ledger.buy_later_order_view(&order.id).await.unwrap();
        assert_eq!(view.remaining_balance, 0.0);
        assert_eq!(view.order.payment_status, PaymentStatus::Paid);

        let err = ledger.record_payment(&order.id, 1.0, None).await.unwrap_err();
        assert_validation(err, "exceeds remaining balance of 0");

        // The failed attempt must not have touched the payment ledger.
        assert_eq!(ledger.payments_for_order(&order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rejects_non_positive_and_excessive_amounts() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;

        assert_validation(
            ledger.record_payment(&order.id, 0.0, None).await.unwrap_err(),
            "positive",
        );
        assert_validation(
            ledger.record_payment(&order.id, -5_000.0, None).await.unwrap_err(),
            "positive",
        );
        assert_validation(
            ledger
                .record_payment(&order.id, 150_001.0, None)
                .await
                .unwrap_err(),
            "exceeds remaining balance",
        );
        assert!(ledger.payments_for_order(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn payment_against_unknown_order_is_not_found() {
        let ledger = ledger();
        match ledger.record_payment("o-404", 1_000.0, None).await.unwrap_err() {
            LedgerError::NotFound(msg) => assert!(msg.contains("o-404")),
            other => panic!("expected not-found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overdue_is_derived_on_read_and_reconcilable() {
        // Scenario C: due date already in the past, balance open.
        let ledger = ledger();
        let mut order = order_of_150k(&ledger).await;
        order.due_date = order.created_at - Duration::days(1);
        ledger.store().insert_buy_later_order(&order).await.unwrap();

        let view = ledger.buy_later_order_view(&order.id).await.unwrap();
        // Stored status is stale; the policy reports overdue regardless.
        assert_eq!(view.order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(view.effective_payment_status, PaymentStatus::Overdue);

        let reconciled = ledger.reconcile_payment_status(&order.id).await.unwrap();
        assert_eq!(reconciled, PaymentStatus::Overdue);
        let stored = ledger
            .store()
            .find_buy_later_order(&order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Overdue);
    }

    #[tokio::test]
    async fn concurrent_payments_are_serialized() {
        // Scenario D: 50000 and 120000 against a 150000 balance. Without
        // serialization both could pass the check; with it exactly one fails.
        let ledger = Arc::new(ledger());
        let order = order_of_150k(&ledger).await;

        let a = {
            let ledger = ledger.clone();
            let id = order.id.clone();
            tokio::spawn(async move { ledger.record_payment(&id, 50_000.0, None).await })
        };
        let b = {
            let ledger = ledger.clone();
            let id = order.id.clone();
            tokio::spawn(async move { ledger.record_payment(&id, 120_000.0, None).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let failures = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(failures, 1);

        let view = ledger.buy_later_order_view(&order.id).await.unwrap();
        assert!(view.total_paid <= 150_000.0);
    }

    #[tokio::test]
    async fn repeated_reads_are_idempotent() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;
        ledger.record_payment(&order.id, 30_000.0, None).await.unwrap();

        let first = ledger.buy_later_order_view(&order.id).await.unwrap();
        for _ in 0..3 {
            let again = ledger.buy_later_order_view(&order.id).await.unwrap();
            assert_eq!(again.total_paid, first.total_paid);
            assert_eq!(again.remaining_balance, first.remaining_balance);
            assert_eq!(
                ledger.payments_for_order(&order.id).await.unwrap().len(),
                1
            );
        }
    }

    #[tokio::test]
    async fn payments_listed_newest_first() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;
        ledger.record_payment(&order.id, 10_000.0, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        ledger.record_payment(&order.id, 20_000.0, None).await.unwrap();

        let payments = ledger.payments_for_order(&order.id).await.unwrap();
        assert_eq!(payments[0].amount, 20_000.0);
        assert_eq!(payments[1].amount, 10_000.0);
    }

    #[tokio::test]
    async fn admin_overrides_ignore_balance_math() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;

        // Nothing paid, yet an admin may force "paid" (and back).
        ledger
            .set_payment_status(&order.id, PaymentStatus::Paid)
            .await
            .unwrap();
        let stored = ledger
            .store()
            .find_buy_later_order(&order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Paid);

        // Order status transitions have no enforced edges.
        ledger
            .set_buy_later_order_status(&order.id, OrderStatus::Completed)
            .await
            .unwrap();
        ledger
            .set_buy_later_order_status(&order.id, OrderStatus::Pending)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn immediate_order_shares_stock_and_snapshot_rules() {
        let ledger = ledger();
        let order = ledger
            .create_order(&NewOrder {
                user_id: "u-1".into(),
                user_phone: "0812".into(),
                user_room: "A-12".into(),
                book_id: "b-1".into(),
                quantity: 3,
            })
            .await
            .unwrap();
        assert_eq!(order.total_price, 225_000.0);

        let book = ledger.store().find_book("b-1").await.unwrap().unwrap();
        assert_eq!(book.stock, 7);
    }

    #[tokio::test]
    async fn analytics_counts_orders_and_overdue() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;
        // Push it past due with an open balance.
        let mut stale = order.clone();
        stale.due_date = order.created_at - Duration::days(1);
        ledger.store().insert_buy_later_order(&stale).await.unwrap();

        // A confirmed order with nothing paid still counts as pending
        // payment; order status does not settle an installment plan.
        let confirmed = order_of_150k(&ledger).await;
        ledger
            .set_buy_later_order_status(&confirmed.id, OrderStatus::Confirmed)
            .await
            .unwrap();

        let summary = ledger
            .analytics_summary(
                order.created_at - Duration::days(1),
                order.created_at + Duration::days(1),
            )
            .await
            .unwrap();
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.total_revenue, 300_000.0);
        assert_eq!(summary.total_customers, 1);
        assert_eq!(summary.total_kitab_sold, 4);
        assert_eq!(summary.pending_buy_later, 1);
        assert_eq!(summary.overdue_payments, 1);
        assert_eq!(summary.average_order_value, 150_000.0);
    }

    #[tokio::test]
    async fn idle_payment_locks_are_reclaimed() {
        let ledger = ledger();
        let order = order_of_150k(&ledger).await;
        ledger.record_payment(&order.id, 10_000.0, None).await.unwrap();
        assert_eq!(ledger.payment_locks.lock().unwrap().len(), 1);

        // Taking a lock for another order sweeps the idle entry; the one
        // still handed out survives.
        let held = ledger.lock_for("other-order");
        let locks = ledger.payment_locks.lock().unwrap();
        assert!(!locks.contains_key(&order.id));
        assert_eq!(locks.len(), 1);
        drop(locks);
        drop(held);
    }
}
