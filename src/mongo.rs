use anyhow::{anyhow, Result};
use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client, Database, IndexModel,
};
use once_cell::sync::OnceCell;

static MONGO_DB: OnceCell<Database> = OnceCell::new();

pub fn db() -> Result<&'static Database, String> {
    MONGO_DB
        .get()
        .ok_or_else(|| "MongoDB not initialized".to_string())
}

/// Connect from the environment:
/// - MONGO_URI (required)
/// - MONGO_DB  (optional, default "tokokitab")
pub async fn init_mongo_from_env() -> Result<()> {
    let _ = dotenvy::dotenv();

    let uri = std::env::var("MONGO_URI").map_err(|_| anyhow!("MONGO_URI missing in environment"))?;

    let client = Client::with_uri_str(&uri)
        .await
        .map_err(|e| anyhow!("Mongo connect error: {}", e))?;

    let dbname = std::env::var("MONGO_DB").unwrap_or_else(|_| "tokokitab".into());
    let database = client.database(&dbname);

    ensure_indexes(&database).await.map_err(|e| anyhow!(e))?;

    MONGO_DB
        .set(database)
        .map_err(|_| anyhow!("MongoDB already initialized"))?;

    Ok(())
}

async fn ensure_indexes(db: &Database) -> Result<(), String> {
    // users: unique email backs both login and the identity lookup.
    let users = db.collection::<Document>("users");
    let uniq_email = IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(
            IndexOptions::builder()
                .unique(true)
                .name(Some("uniq_users_email".into()))
                .build(),
        )
        .build();
    let _ = users.create_index(uniq_email, None).await;

    // buy_later_orders: user listing and due-date sorting.
    let buy_later = db.collection::<Document>("buy_later_orders");
    let idx_user = IndexModel::builder()
        .keys(doc! { "user_id": 1 })
        .options(IndexOptions::builder().name(Some("idx_bl_user".into())).build())
        .build();
    let _ = buy_later.create_index(idx_user, None).await;
    let idx_due = IndexModel::builder()
        .keys(doc! { "due_date": 1 })
        .options(IndexOptions::builder().name(Some("idx_bl_due".into())).build())
        .build();
    let _ = buy_later.create_index(idx_due, None).await;

    // buy_later_payments: every balance computation filters on the order id.
    let payments = db.collection::<Document>("buy_later_payments");
    let idx_order = IndexModel::builder()
        .keys(doc! { "buy_later_order_id": 1 })
        .options(
            IndexOptions::builder()
                .name(Some("idx_payments_order".into()))
                .build(),
        )
        .build();
    let _ = payments.create_index(idx_order, None).await;

    // orders: per-user purchase history.
    let orders = db.collection::<Document>("orders");
    let idx_orders_user = IndexModel::builder()
        .keys(doc! { "user_id": 1 })
        .options(
            IndexOptions::builder()
                .name(Some("idx_orders_user".into()))
                .build(),
        )
        .build();
    let _ = orders.create_index(idx_orders_user, None).await;

    Ok(())
}
