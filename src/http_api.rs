use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, State},
    http::{Method, Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::{AnalyticsSummary, BuyLaterOrderView, Ledger, NewBuyLaterOrder, NewOrder};
use crate::model::{Book, BuyLaterOrder, Order, OrderStatus, Payment, PaymentStatus, User};
use crate::mongo::db;
use crate::store::{BookUpdate, LedgerStore, MongoStore};

/* ================== Context ================== */

pub struct AppCtx {
    pub api_key: String,
    pub hmac_secret: String,
    pub ledger: Ledger<MongoStore>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: msg.into() })).into_response()
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = match &self {
            LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.to_string())
    }
}

#[derive(Serialize)]
struct OkMsg {
    ok: bool,
}

/* ================== Auth middleware ================== */

async fn auth_mw(
    State(ctx): State<Arc<AppCtx>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    info!("HTTP {} {}", req.method(), req.uri().path());

    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let api_key = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if api_key != ctx.api_key {
        warn!("unauthorized request (bad API key)");
        return Err(error_response(StatusCode::UNAUTHORIZED, "Unauthorized (API key)"));
    }

    let sig_opt = req
        .headers()
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    if let Some(sig) = sig_opt {
        let owned: Body = std::mem::take(req.body_mut());
        let bytes = to_bytes(owned, 1_048_576)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;

        let mut mac = Hmac::<Sha256>::new_from_slice(ctx.hmac_secret.as_bytes())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;

        mac.update(&bytes);
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected != sig {
            warn!("invalid request signature");
            return Err(error_response(StatusCode::UNAUTHORIZED, "Invalid signature"));
        }

        let (parts, _) = req.into_parts();
        req = Request::from_parts(parts, Body::from(bytes));
    }

    Ok(next.run(req).await)
}

/* ================== Health & login ================== */

async fn health() -> Json<serde_json::Value> {
    let ts = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
    Json(serde_json::json!({
        "ok": true,
        "service": "kitab-api",
        "ts": ts
    }))
}

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use argon2::password_hash::rand_core::OsRng;

#[derive(Deserialize)]
struct LoginReq {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResp {
    ok: bool,
    id: String,
    name: String,
    role: String,
    token: String,
}

async fn login(
    State(ctx): State<Arc<AppCtx>>,
    Json(req): Json<LoginReq>,
) -> Result<Json<LoginResp>, LedgerError> {
    let (user, stored_hash) = ctx
        .ledger
        .store()
        .find_credentials(&req.email)
        .await?
        .ok_or_else(|| LedgerError::validation("invalid credentials"))?;

    let parsed = PasswordHash::new(&stored_hash)
        .map_err(|_| LedgerError::validation("invalid credentials"))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed)
        .map_err(|_| LedgerError::validation("invalid credentials"))?;

    Ok(Json(LoginResp {
        ok: true,
        id: user.id,
        name: user.name,
        role: user.role,
        token: Uuid::new_v4().to_string(),
    }))
}

/* ================== Users ================== */

#[derive(Deserialize)]
struct UserCreateReq {
    pub nim: Option<String>,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

async fn users_list(State(ctx): State<Arc<AppCtx>>) -> Result<Json<Vec<User>>, LedgerError> {
    Ok(Json(ctx.ledger.store().list_users().await?))
}

async fn user_add(
    State(ctx): State<Arc<AppCtx>>,
    Json(req): Json<UserCreateReq>,
) -> Result<Json<User>, LedgerError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(LedgerError::validation("name and email are required"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| LedgerError::collaborator("failed to hash password"))?
        .to_string();

    let user = User {
        id: Uuid::new_v4().to_string(),
        nim: req.nim,
        name: req.name,
        email: req.email,
        role: req.role.unwrap_or_else(|| "user".into()),
    };
    ctx.ledger.store().insert_user(&user, &hash).await?;
    Ok(Json(user))
}

/* ================== Books ================== */

#[derive(Deserialize)]
struct BookCreateReq {
    pub title: String,
    pub author: String,
    pub description: String,
    pub price: f64,
    pub image: Option<String>,
    pub category: String,
    pub stock: i64,
}

#[derive(Deserialize)]
struct BookUpdateReq {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub category: Option<String>,
    pub stock: Option<i64>,
}

async fn books_list(State(ctx): State<Arc<AppCtx>>) -> Result<Json<Vec<Book>>, LedgerError> {
    Ok(Json(ctx.ledger.store().list_books().await?))
}

async fn book_add(
    State(ctx): State<Arc<AppCtx>>,
    Json(req): Json<BookCreateReq>,
) -> Result<Json<Book>, LedgerError> {
    if req.price < 0.0 || req.stock < 0 {
        return Err(LedgerError::validation("price and stock must be non-negative"));
    }
    let book = Book {
        id: Uuid::new_v4().to_string(),
        title: req.title,
        author: req.author,
        description: req.description,
        price: req.price,
        image: req.image,
        category: req.category,
        stock: req.stock,
    };
    ctx.ledger.store().insert_book(&book).await?;
    Ok(Json(book))
}

async fn book_update(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
    Json(req): Json<BookUpdateReq>,
) -> Result<Json<OkMsg>, LedgerError> {
    let patch = BookUpdate {
        title: req.title,
        author: req.author,
        description: req.description,
        price: req.price,
        image: req.image,
        category: req.category,
        stock: req.stock,
    };
    let updated = ctx.ledger.store().update_book(&id, &patch).await?;
    if !updated {
        return Err(LedgerError::not_found(format!("book {id} not found")));
    }
    Ok(Json(OkMsg { ok: true }))
}

async fn book_delete(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
) -> Result<Json<OkMsg>, LedgerError> {
    let deleted = ctx.ledger.store().delete_book(&id).await?;
    if !deleted {
        return Err(LedgerError::not_found(format!("book {id} not found")));
    }
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Immediate orders ================== */

#[derive(Deserialize)]
struct OrdersQuery {
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct OrderStatusReq {
    status: OrderStatus,
}

async fn orders_list(
    State(ctx): State<Arc<AppCtx>>,
    Query(q): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>, LedgerError> {
    Ok(Json(
        ctx.ledger.store().list_orders(q.user_id.as_deref()).await?,
    ))
}

async fn order_add(
    State(ctx): State<Arc<AppCtx>>,
    Json(req): Json<NewOrder>,
) -> Result<Json<Order>, LedgerError> {
    Ok(Json(ctx.ledger.create_order(&req).await?))
}

async fn order_set_status(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
    Json(req): Json<OrderStatusReq>,
) -> Result<Json<OkMsg>, LedgerError> {
    ctx.ledger.set_order_status(&id, req.status).await?;
    Ok(Json(OkMsg { ok: true }))
}

/* ================== Buy-later orders ================== */

#[derive(Deserialize)]
struct PaymentStatusReq {
    status: PaymentStatus,
}

#[derive(Serialize)]
struct ReconcileResp {
    payment_status: PaymentStatus,
}

async fn buy_later_list(
    State(ctx): State<Arc<AppCtx>>,
    Query(q): Query<OrdersQuery>,
) -> Result<Json<Vec<BuyLaterOrderView>>, LedgerError> {
    Ok(Json(
        ctx.ledger.list_buy_later_views(q.user_id.as_deref()).await?,
    ))
}

async fn buy_later_add(
    State(ctx): State<Arc<AppCtx>>,
    Json(req): Json<NewBuyLaterOrder>,
) -> Result<Json<BuyLaterOrder>, LedgerError> {
    Ok(Json(ctx.ledger.create_buy_later_order(&req).await?))
}

async fn buy_later_get(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
) -> Result<Json<BuyLaterOrderView>, LedgerError> {
    Ok(Json(ctx.ledger.buy_later_order_view(&id).await?))
}

async fn buy_later_set_status(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
    Json(req): Json<OrderStatusReq>,
) -> Result<Json<OkMsg>, LedgerError> {
    ctx.ledger.set_buy_later_order_status(&id, req.status).await?;
    Ok(Json(OkMsg { ok: true }))
}

async fn buy_later_set_payment_status(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentStatusReq>,
) -> Result<Json<OkMsg>, LedgerError> {
    ctx.ledger.set_payment_status(&id, req.status).await?;
    Ok(Json(OkMsg { ok: true }))
}

async fn buy_later_reconcile(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
) -> Result<Json<ReconcileResp>, LedgerError> {
    let payment_status = ctx.ledger.reconcile_payment_status(&id).await?;
    Ok(Json(ReconcileResp { payment_status }))
}

/* ================== Payments ================== */

#[derive(Deserialize)]
struct RecordPaymentReq {
    amount: f64,
    notes: Option<String>,
}

async fn payments_list(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Payment>>, LedgerError> {
    Ok(Json(ctx.ledger.payments_for_order(&id).await?))
}

async fn payment_add(
    State(ctx): State<Arc<AppCtx>>,
    Path(id): Path<String>,
    Json(req): Json<RecordPaymentReq>,
) -> Result<Json<Payment>, LedgerError> {
    info!(order_id = %id, amount = req.amount, "recording payment");
    Ok(Json(
        ctx.ledger.record_payment(&id, req.amount, req.notes).await?,
    ))
}

/* ================== Analytics ================== */

#[derive(Deserialize)]
struct AnalyticsQuery {
    start: Option<String>,
    end: Option<String>,
}

async fn analytics_summary(
    State(ctx): State<Arc<AppCtx>>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsSummary>, LedgerError> {
    let now = OffsetDateTime::now_utc();
    let parse = |s: &str| {
        OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|_| LedgerError::validation(format!("invalid timestamp: {s}")))
    };
    let end = match q.end.as_deref() {
        Some(s) => parse(s)?,
        None => now,
    };
    let start = match q.start.as_deref() {
        Some(s) => parse(s)?,
        None => end - Duration::days(30),
    };
    if start > end {
        return Err(LedgerError::validation("start must not be after end"));
    }
    Ok(Json(ctx.ledger.analytics_summary(start, end).await?))
}

/* ================== Runner ================== */

pub async fn run_http_server() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let api_key =
        std::env::var("KITAB_API_KEY").unwrap_or_else(|_| "SUPER_SECRET_API_KEY_123".into());
    let hmac_secret = std::env::var("KITAB_HMAC_SECRET").unwrap_or_else(|_| "dev-secret-xyz".into());

    let database = db().map_err(anyhow::Error::msg)?;
    let ctx = Arc::new(AppCtx {
        api_key,
        hmac_secret,
        ledger: Ledger::new(MongoStore::new(database.clone())),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(login));

    let protected = Router::new()
        // users
        .route("/api/users", get(users_list).post(user_add))
        // books
        .route("/api/books", get(books_list).post(book_add))
        .route("/api/books/:id", put(book_update).delete(book_delete))
        // immediate orders
        .route("/api/orders", get(orders_list).post(order_add))
        .route("/api/orders/:id/status", put(order_set_status))
        // buy-later ledger
        .route("/api/buy_later", get(buy_later_list).post(buy_later_add))
        .route("/api/buy_later/:id", get(buy_later_get))
        .route("/api/buy_later/:id/status", put(buy_later_set_status))
        .route(
            "/api/buy_later/:id/payment_status",
            put(buy_later_set_payment_status),
        )
        .route("/api/buy_later/:id/reconcile", post(buy_later_reconcile))
        .route(
            "/api/buy_later/:id/payments",
            get(payments_list).post(payment_add),
        )
        // analytics
        .route("/api/analytics", get(analytics_summary))
        .layer(from_fn_with_state(ctx.clone(), auth_mw));

    let app = public
        .merge(protected)
        .with_state(ctx.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "http", "[http] listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
