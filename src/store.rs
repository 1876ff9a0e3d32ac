use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::FindOptions,
    Collection, Database,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::LedgerError;
use crate::model::{Book, BuyLaterOrder, Order, OrderStatus, Payment, PaymentStatus, User};

/* ================== Store trait ================== */

/// Partial catalog update; `None` fields are left untouched.
#[derive(Default, Clone, Debug)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub stock: Option<i64>,
}

/// Typed view of the backing row store. The ledger core talks only to this
/// trait; the binary wires in [`MongoStore`], tests wire in an in-memory
/// implementation.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /* ---- identity ---- */
    async fn find_user(&self, id: &str) -> Result<Option<User>, LedgerError>;
    async fn find_credentials(&self, email: &str)
        -> Result<Option<(User, String)>, LedgerError>;
    async fn list_users(&self) -> Result<Vec<User>, LedgerError>;
    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), LedgerError>;

    /* ---- catalog ---- */
    async fn list_books(&self) -> Result<Vec<Book>, LedgerError>;
    async fn find_book(&self, id: &str) -> Result<Option<Book>, LedgerError>;
    async fn insert_book(&self, book: &Book) -> Result<(), LedgerError>;
    async fn update_book(&self, id: &str, patch: &BookUpdate) -> Result<bool, LedgerError>;
    async fn delete_book(&self, id: &str) -> Result<bool, LedgerError>;
    /// Conditional decrement: succeeds only when `stock >= quantity`.
    async fn try_decrement_stock(&self, book_id: &str, quantity: i64)
        -> Result<bool, LedgerError>;
    /// Compensating action when order insertion fails after a decrement.
    async fn restore_stock(&self, book_id: &str, quantity: i64) -> Result<(), LedgerError>;

    /* ---- immediate orders ---- */
    async fn insert_order(&self, order: &Order) -> Result<(), LedgerError>;
    async fn list_orders(&self, user_id: Option<&str>) -> Result<Vec<Order>, LedgerError>;
    async fn update_order_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError>;

    /* ---- buy-later orders ---- */
    async fn insert_buy_later_order(&self, order: &BuyLaterOrder) -> Result<(), LedgerError>;
    async fn find_buy_later_order(&self, id: &str)
        -> Result<Option<BuyLaterOrder>, LedgerError>;
    async fn list_buy_later_orders(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<BuyLaterOrder>, LedgerError>;
    async fn update_buy_later_order_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError>;
    async fn update_buy_later_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError>;

    /* ---- payments (append-only) ---- */
    async fn insert_payment(&self, payment: &Payment) -> Result<(), LedgerError>;
    /// Payments for one order, newest-first by payment date.
    async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>, LedgerError>;
}

/* ================== Bson helpers ================== */

fn f64_from(d: &Document, k: &str) -> f64 {
    d.get_f64(k)
        .ok()
        .or_else(|| d.get_i64(k).ok().map(|v| v as f64))
        .or_else(|| d.get_i32(k).ok().map(|v| f64::from(v)))
        .unwrap_or(0.0)
}

fn i64_from(d: &Document, k: &str) -> i64 {
    d.get_i64(k)
        .ok()
        .or_else(|| d.get_i32(k).ok().map(i64::from))
        .or_else(|| d.get_f64(k).ok().map(|v| v as i64))
        .unwrap_or(0)
}

fn str_from(d: &Document, k: &str) -> String {
    d.get_str(k).unwrap_or_default().to_string()
}

fn opt_string(d: &Document, k: &str) -> Option<String> {
    d.get_str(k).ok().map(|s| s.to_string())
}

fn id_from(d: &Document) -> String {
    d.get_str("id")
        .or_else(|_| d.get_str("_id"))
        .unwrap_or_default()
        .to_string()
}

fn fmt_ts(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn ts_from(d: &Document, k: &str) -> OffsetDateTime {
    d.get_str(k)
        .ok()
        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn opt_bson(v: Option<String>) -> Bson {
    v.map(Bson::String).unwrap_or(Bson::Null)
}

fn id_filter(id: &str) -> Document {
    doc! { "$or": [ { "id": id }, { "_id": id } ] }
}

/// Id match plus the availability guard, so the stock check and the
/// decrement are one atomic document update.
fn stock_decrement_filter(book_id: &str, quantity: i64) -> Document {
    let mut filter = id_filter(book_id);
    filter.insert("stock", doc! { "$gte": quantity });
    filter
}

fn sort_desc(field: &str) -> FindOptions {
    let mut sort = Document::new();
    sort.insert(field, -1);
    sort.insert("_id", -1);
    FindOptions::builder().sort(sort).build()
}

/* ================== Document conversions ================== */

fn doc_to_user(d: &Document) -> User {
    User {
        id: id_from(d),
        nim: opt_string(d, "nim"),
        name: str_from(d, "name"),
        email: str_from(d, "email"),
        role: d.get_str("role").unwrap_or("user").to_string(),
    }
}

fn doc_to_book(d: &Document) -> Book {
    Book {
        id: id_from(d),
        title: str_from(d, "title"),
        author: str_from(d, "author"),
        description: str_from(d, "description"),
        price: f64_from(d, "price"),
        image: opt_string(d, "image"),
        category: str_from(d, "category"),
        stock: i64_from(d, "stock"),
    }
}

fn book_to_doc(b: &Book) -> Document {
    doc! {
        "_id": &b.id,
        "id": &b.id,
        "title": &b.title,
        "author": &b.author,
        "description": &b.description,
        "price": b.price,
        "image": opt_bson(b.image.clone()),
        "category": &b.category,
        "stock": b.stock,
    }
}

fn doc_to_order(d: &Document) -> Order {
    Order {
        id: id_from(d),
        user_id: str_from(d, "user_id"),
        user_name: str_from(d, "user_name"),
        user_phone: str_from(d, "user_phone"),
        user_room: str_from(d, "user_room"),
        book_id: str_from(d, "book_id"),
        book_title: str_from(d, "book_title"),
        book_author: str_from(d, "book_author"),
        book_description: str_from(d, "book_description"),
        book_price: f64_from(d, "book_price"),
        book_image: opt_string(d, "book_image"),
        book_category: str_from(d, "book_category"),
        quantity: i64_from(d, "quantity"),
        total_price: f64_from(d, "total_price"),
        order_status: OrderStatus::parse(d.get_str("order_status").unwrap_or("pending"))
            .unwrap_or(OrderStatus::Pending),
        created_at: ts_from(d, "created_at"),
        updated_at: ts_from(d, "updated_at"),
    }
}

fn order_to_doc(o: &Order) -> Document {
    doc! {
        "_id": &o.id,
        "id": &o.id,
        "user_id": &o.user_id,
        "user_name": &o.user_name,
        "user_phone": &o.user_phone,
        "user_room": &o.user_room,
        "book_id": &o.book_id,
        "book_title": &o.book_title,
        "book_author": &o.book_author,
        "book_description": &o.book_description,
        "book_price": o.book_price,
        "book_image": opt_bson(o.book_image.clone()),
        "book_category": &o.book_category,
        "quantity": o.quantity,
        "total_price": o.total_price,
        "order_status": o.order_status.as_str(),
        "created_at": fmt_ts(o.created_at),
        "updated_at": fmt_ts(o.updated_at),
    }
}

fn doc_to_buy_later(d: &Document) -> BuyLaterOrder {
    BuyLaterOrder {
        id: id_from(d),
        user_id: str_from(d, "user_id"),
        user_name: str_from(d, "user_name"),
        user_phone: str_from(d, "user_phone"),
        user_room: str_from(d, "user_room"),
        book_id: str_from(d, "book_id"),
        book_title: str_from(d, "book_title"),
        book_author: str_from(d, "book_author"),
        book_description: str_from(d, "book_description"),
        book_price: f64_from(d, "book_price"),
        book_image: opt_string(d, "book_image"),
        book_category: str_from(d, "book_category"),
        quantity: i64_from(d, "quantity"),
        total_price: f64_from(d, "total_price"),
        payment_duration: i64_from(d, "payment_duration"),
        due_date: ts_from(d, "due_date"),
        order_status: OrderStatus::parse(d.get_str("order_status").unwrap_or("pending"))
            .unwrap_or(OrderStatus::Pending),
        payment_status: PaymentStatus::parse(d.get_str("payment_status").unwrap_or("unpaid"))
            .unwrap_or(PaymentStatus::Unpaid),
        created_at: ts_from(d, "created_at"),
        updated_at: ts_from(d, "updated_at"),
    }
}

fn buy_later_to_doc(o: &BuyLaterOrder) -> Document {
    doc! {
        "_id": &o.id,
        "id": &o.id,
        "user_id": &o.user_id,
        "user_name": &o.user_name,
        "user_phone": &o.user_phone,
        "user_room": &o.user_room,
        "book_id": &o.book_id,
        "book_title": &o.book_title,
        "book_author": &o.book_author,
        "book_description": &o.book_description,
        "book_price": o.book_price,
        "book_image": opt_bson(o.book_image.clone()),
        "book_category": &o.book_category,
        "quantity": o.quantity,
        "total_price": o.total_price,
        "payment_duration": o.payment_duration,
        "due_date": fmt_ts(o.due_date),
        "order_status": o.order_status.as_str(),
        "payment_status": o.payment_status.as_str(),
        "created_at": fmt_ts(o.created_at),
        "updated_at": fmt_ts(o.updated_at),
    }
}

fn doc_to_payment(d: &Document) -> Payment {
    Payment {
        id: id_from(d),
        buy_later_order_id: str_from(d, "buy_later_order_id"),
        amount: f64_from(d, "amount"),
        payment_date: ts_from(d, "payment_date"),
        notes: opt_string(d, "notes"),
        created_at: ts_from(d, "created_at"),
        updated_at: ts_from(d, "updated_at"),
    }
}

fn payment_to_doc(p: &Payment) -> Document {
    doc! {
        "_id": &p.id,
        "id": &p.id,
        "buy_later_order_id": &p.buy_later_order_id,
        "amount": p.amount,
        "payment_date": fmt_ts(p.payment_date),
        "notes": opt_bson(p.notes.clone()),
        "created_at": fmt_ts(p.created_at),
        "updated_at": fmt_ts(p.updated_at),
    }
}

/* ================== Mongo implementation ================== */

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn coll(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    async fn collect<T>(
        &self,
        coll: &str,
        filter: Document,
        options: FindOptions,
        map: fn(&Document) -> T,
    ) -> Result<Vec<T>, LedgerError> {
        let mut cur = self.coll(coll).find(filter, options).await?;
        let mut out = vec![];
        while let Some(d) = cur.try_next().await? {
            out.push(map(&d));
        }
        Ok(out)
    }
}

#[async_trait]
impl LedgerStore for MongoStore {
    async fn find_user(&self, id: &str) -> Result<Option<User>, LedgerError> {
        let d = self.coll("users").find_one(id_filter(id), None).await?;
        Ok(d.as_ref().map(doc_to_user))
    }

    async fn find_credentials(
        &self,
        email: &str,
    ) -> Result<Option<(User, String)>, LedgerError> {
        let d = self
            .coll("users")
            .find_one(doc! { "email": email }, None)
            .await?;
        Ok(d.as_ref()
            .map(|d| (doc_to_user(d), str_from(d, "password_hash"))))
    }

    async fn list_users(&self) -> Result<Vec<User>, LedgerError> {
        self.collect("users", doc! {}, sort_desc("created_at"), doc_to_user)
            .await
    }

    async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), LedgerError> {
        let now = fmt_ts(OffsetDateTime::now_utc());
        let docu = doc! {
            "_id": &user.id,
            "id": &user.id,
            "nim": opt_bson(user.nim.clone()),
            "name": &user.name,
            "email": &user.email,
            "role": &user.role,
            "password_hash": password_hash,
            "created_at": &now,
        };
        self.coll("users").insert_one(docu, None).await?;
        Ok(())
    }

    async fn list_books(&self) -> Result<Vec<Book>, LedgerError> {
        self.collect("books", doc! {}, sort_desc("title"), doc_to_book)
            .await
    }

    async fn find_book(&self, id: &str) -> Result<Option<Book>, LedgerError> {
        let d = self.coll("books").find_one(id_filter(id), None).await?;
        Ok(d.as_ref().map(doc_to_book))
    }

    async fn insert_book(&self, book: &Book) -> Result<(), LedgerError> {
        self.coll("books").insert_one(book_to_doc(book), None).await?;
        Ok(())
    }

    async fn update_book(&self, id: &str, patch: &BookUpdate) -> Result<bool, LedgerError> {
        let mut set_doc = Document::new();
        if let Some(v) = &patch.title {
            set_doc.insert("title", v);
        }
        if let Some(v) = &patch.author {
            set_doc.insert("author", v);
        }
        if let Some(v) = &patch.description {
            set_doc.insert("description", v);
        }
        if let Some(v) = patch.price {
            set_doc.insert("price", v);
        }
        if let Some(v) = &patch.image {
            set_doc.insert("image", v);
        }
        if let Some(v) = &patch.category {
            set_doc.insert("category", v);
        }
        if let Some(v) = patch.stock {
            set_doc.insert("stock", v);
        }
        if set_doc.is_empty() {
            return Ok(true);
        }
        let res = self
            .coll("books")
            .update_one(id_filter(id), doc! { "$set": set_doc }, None)
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn delete_book(&self, id: &str) -> Result<bool, LedgerError> {
        let res = self.coll("books").delete_one(id_filter(id), None).await?;
        Ok(res.deleted_count > 0)
    }

    async fn try_decrement_stock(
        &self,
        book_id: &str,
        quantity: i64,
    ) -> Result<bool, LedgerError> {
        // Matched only when enough stock remains.
        let res = self
            .coll("books")
            .update_one(
                stock_decrement_filter(book_id, quantity),
                doc! { "$inc": { "stock": -quantity } },
                None,
            )
            .await?;
        Ok(res.modified_count > 0)
    }

    async fn restore_stock(&self, book_id: &str, quantity: i64) -> Result<(), LedgerError> {
        self.coll("books")
            .update_one(
                id_filter(book_id),
                doc! { "$inc": { "stock": quantity } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), LedgerError> {
        self.coll("orders")
            .insert_one(order_to_doc(order), None)
            .await?;
        Ok(())
    }

    async fn list_orders(&self, user_id: Option<&str>) -> Result<Vec<Order>, LedgerError> {
        let filter = match user_id {
            Some(uid) => doc! { "user_id": uid },
            None => doc! {},
        };
        self.collect("orders", filter, sort_desc("created_at"), doc_to_order)
            .await
    }

    async fn update_order_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let res = self
            .coll("orders")
            .update_one(
                id_filter(id),
                doc! { "$set": {
                    "order_status": status.as_str(),
                    "updated_at": fmt_ts(updated_at),
                }},
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn insert_buy_later_order(&self, order: &BuyLaterOrder) -> Result<(), LedgerError> {
        self.coll("buy_later_orders")
            .insert_one(buy_later_to_doc(order), None)
            .await?;
        Ok(())
    }

    async fn find_buy_later_order(
        &self,
        id: &str,
    ) -> Result<Option<BuyLaterOrder>, LedgerError> {
        let d = self
            .coll("buy_later_orders")
            .find_one(id_filter(id), None)
            .await?;
        Ok(d.as_ref().map(doc_to_buy_later))
    }

    async fn list_buy_later_orders(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<BuyLaterOrder>, LedgerError> {
        let filter = match user_id {
            Some(uid) => doc! { "user_id": uid },
            None => doc! {},
        };
        self.collect(
            "buy_later_orders",
            filter,
            sort_desc("created_at"),
            doc_to_buy_later,
        )
        .await
    }

    async fn update_buy_later_order_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let res = self
            .coll("buy_later_orders")
            .update_one(
                id_filter(id),
                doc! { "$set": {
                    "order_status": status.as_str(),
                    "updated_at": fmt_ts(updated_at),
                }},
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn update_buy_later_payment_status(
        &self,
        id: &str,
        status: PaymentStatus,
        updated_at: OffsetDateTime,
    ) -> Result<bool, LedgerError> {
        let res = self
            .coll("buy_later_orders")
            .update_one(
                id_filter(id),
                doc! { "$set": {
                    "payment_status": status.as_str(),
                    "updated_at": fmt_ts(updated_at),
                }},
                None,
            )
            .await?;
        Ok(res.matched_count > 0)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), LedgerError> {
        self.coll("buy_later_payments")
            .insert_one(payment_to_doc(payment), None)
            .await?;
        Ok(())
    }

    async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>, LedgerError> {
        self.collect(
            "buy_later_payments",
            doc! { "buy_later_order_id": order_id },
            sort_desc("payment_date"),
            doc_to_payment,
        )
        .await
    }
}

/* ================== Tests ================== */


/* ================== In-memory store (tests) ================== */

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// HashMap-backed [`LedgerStore`] so ledger behavior can be exercised
    /// without a running Mongo instance.
    #[derive(Default)]
    pub struct MemStore {
        pub users: Mutex<HashMap<String, (User, String)>>,
        pub books: Mutex<HashMap<String, Book>>,
        pub orders: Mutex<HashMap<String, Order>>,
        pub buy_later: Mutex<HashMap<String, BuyLaterOrder>>,
        pub payments: Mutex<Vec<Payment>>,
    }

    impl MemStore {
        pub fn with_user_and_book(user: User, book: Book) -> Self {
            let store = Self::default();
            store
                .users
                .lock()
                .unwrap()
                .insert(user.id.clone(), (user, String::new()));
            store.books.lock().unwrap().insert(book.id.clone(), book);
            store
        }
    }

    #[async_trait]
    impl LedgerStore for MemStore {
        async fn find_user(&self, id: &str) -> Result<Option<User>, LedgerError> {
            Ok(self.users.lock().unwrap().get(id).map(|(u, _)| u.clone()))
        }

        async fn find_credentials(
            &self,
            email: &str,
        ) -> Result<Option<(User, String)>, LedgerError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|(u, _)| u.email == email)
                .cloned())
        }

        async fn list_users(&self) -> Result<Vec<User>, LedgerError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .map(|(u, _)| u.clone())
                .collect())
        }

        async fn insert_user(&self, user: &User, password_hash: &str) -> Result<(), LedgerError> {
            self.users
                .lock()
                .unwrap()
                .insert(user.id.clone(), (user.clone(), password_hash.to_string()));
            Ok(())
        }

        async fn list_books(&self) -> Result<Vec<Book>, LedgerError> {
            Ok(self.books.lock().unwrap().values().cloned().collect())
        }

        async fn find_book(&self, id: &str) -> Result<Option<Book>, LedgerError> {
            Ok(self.books.lock().unwrap().get(id).cloned())
        }

        async fn insert_book(&self, book: &Book) -> Result<(), LedgerError> {
            self.books
                .lock()
                .unwrap()
                .insert(book.id.clone(), book.clone());
            Ok(())
        }

        async fn update_book(&self, id: &str, patch: &BookUpdate) -> Result<bool, LedgerError> {
            let mut books = self.books.lock().unwrap();
            let Some(book) = books.get_mut(id) else {
                return Ok(false);
            };
            if let Some(v) = &patch.title {
                book.title = v.clone();
            }
            if let Some(v) = &patch.author {
                book.author = v.clone();
            }
            if let Some(v) = &patch.description {
                book.description = v.clone();
            }
            if let Some(v) = patch.price {
                book.price = v;
            }
            if let Some(v) = &patch.image {
                book.image = Some(v.clone());
            }
            if let Some(v) = &patch.category {
                book.category = v.clone();
            }
            if let Some(v) = patch.stock {
                book.stock = v;
            }
            Ok(true)
        }

        async fn delete_book(&self, id: &str) -> Result<bool, LedgerError> {
            Ok(self.books.lock().unwrap().remove(id).is_some())
        }

        async fn try_decrement_stock(
            &self,
            book_id: &str,
            quantity: i64,
        ) -> Result<bool, LedgerError> {
            let mut books = self.books.lock().unwrap();
            match books.get_mut(book_id) {
                Some(b) if b.stock >= quantity => {
                    b.stock -= quantity;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn restore_stock(&self, book_id: &str, quantity: i64) -> Result<(), LedgerError> {
            if let Some(b) = self.books.lock().unwrap().get_mut(book_id) {
                b.stock += quantity;
            }
            Ok(())
        }

        async fn insert_order(&self, order: &Order) -> Result<(), LedgerError> {
            self.orders
                .lock()
                .unwrap()
                .insert(order.id.clone(), order.clone());
            Ok(())
        }

        async fn list_orders(&self, user_id: Option<&str>) -> Result<Vec<Order>, LedgerError> {
            let mut out: Vec<Order> = self
                .orders
                .lock()
                .unwrap()
                .values()
                .filter(|o| user_id.map_or(true, |uid| o.user_id == uid))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }

        async fn update_order_status(
            &self,
            id: &str,
            status: OrderStatus,
            updated_at: OffsetDateTime,
        ) -> Result<bool, LedgerError> {
            let mut orders = self.orders.lock().unwrap();
            match orders.get_mut(id) {
                Some(o) => {
                    o.order_status = status;
                    o.updated_at = updated_at;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn insert_buy_later_order(
            &self,
            order: &BuyLaterOrder,
        ) -> Result<(), LedgerError> {
            self.buy_later
                .lock()
                .unwrap()
                .insert(order.id.clone(), order.clone());
            Ok(())
        }

        async fn find_buy_later_order(
            &self,
            id: &str,
        ) -> Result<Option<BuyLaterOrder>, LedgerError> {
            Ok(self.buy_later.lock().unwrap().get(id).cloned())
        }

        async fn list_buy_later_orders(
            &self,
            user_id: Option<&str>,
        ) -> Result<Vec<BuyLaterOrder>, LedgerError> {
            let mut out: Vec<BuyLaterOrder> = self
                .buy_later
                .lock()
                .unwrap()
                .values()
                .filter(|o| user_id.map_or(true, |uid| o.user_id == uid))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }

        async fn update_buy_later_order_status(
            &self,
            id: &str,
            status: OrderStatus,
            updated_at: OffsetDateTime,
        ) -> Result<bool, LedgerError> {
            let mut orders = self.buy_later.lock().unwrap();
            match orders.get_mut(id) {
                Some(o) => {
                    o.order_status = status;
                    o.updated_at = updated_at;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn update_buy_later_payment_status(
            &self,
            id: &str,
            status: PaymentStatus,
            updated_at: OffsetDateTime,
        ) -> Result<bool, LedgerError> {
            let mut orders = self.buy_later.lock().unwrap();
            match orders.get_mut(id) {
                Some(o) => {
                    o.payment_status = status;
                    o.updated_at = updated_at;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn insert_payment(&self, payment: &Payment) -> Result<(), LedgerError> {
            self.payments.lock().unwrap().push(payment.clone());
            Ok(())
        }

        async fn payments_for_order(
            &self,
            order_id: &str,
        ) -> Result<Vec<Payment>, LedgerError> {
            let mut out: Vec<Payment> = self
                .payments
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.buy_later_order_id == order_id)
                .cloned()
                .collect();
            out.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
            Ok(out)
        }
    }
}
