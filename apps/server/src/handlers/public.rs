use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate};
use std::sync::Arc;

use crate::availability::{self, AvailabilityError, DEFAULT_STEP_MINUTES};
use crate::{models::*, AppState};

/// Largest accepted slot grid step (minutes).
const MAX_STEP_MINUTES: i64 = 240;

/// Fallback deposit percentage when the shop default is unset or zero.
const DEFAULT_DEPOSIT_PERCENTAGE: i64 = 15;

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

// ── Endpoints ──

/// GET /api/barbershops — public shop directory.
pub async fn list_shops(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ShopCard>>>, StatusCode> {
    let shops = sqlx::query_as::<_, ShopCard>(
        "SELECT id, name, city, address, phone, slug
         FROM barbershops ORDER BY created_at DESC",
    )
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("list_shops: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ApiResponse::success(shops)))
}

/// GET /api/barbershops/slug/{slug} — shop card by slug.
pub async fn shop_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ShopBookingInfo>>, HandlerError> {
    let shop = fetch_shop_by_slug(&state.db, &slug).await?;
    Ok(Json(ApiResponse::success(shop)))
}

/// GET /api/public/{slug}/barbershop — booking-page shop info.
pub async fn booking_shop(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ShopBookingInfo>>, HandlerError> {
    let shop = fetch_shop_by_slug(&state.db, &slug).await?;
    Ok(Json(ApiResponse::success(shop)))
}

/// GET /api/public/{slug}/services — services of the shop behind a slug.
pub async fn booking_services(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ServicesResponse>>, HandlerError> {
    let shop = fetch_shop_by_slug(&state.db, &slug).await?;

    let items = sqlx::query_as::<_, ServicePublic>(
        "SELECT id, name, description, price, duration_minutes, deposit_percentage
         FROM services WHERE barbershop_id = ? ORDER BY id ASC",
    )
    .bind(shop.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("booking_services: {}", e);
        internal_error()
    })?;

    Ok(Json(ApiResponse::success(ServicesResponse {
        items,
        barbershop_id: shop.id,
    })))
}

/// GET /api/public/{slug}/availability?serviceId&date&step — open slots for a date.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, HandlerError> {
    let date = parse_date(&query.date)?;
    let step = query.step.unwrap_or(DEFAULT_STEP_MINUTES);
    if !(1..=MAX_STEP_MINUTES).contains(&step) {
        return Err(bad_request("Invalid step"));
    }

    // Past dates are answered, not erred: an empty list with a reason.
    if date < Local::now().date_naive() {
        return Ok(Json(ApiResponse::success(AvailabilityResponse {
            date: query.date,
            service: None,
            slots: vec![],
            reason: Some("past_date"),
        })));
    }

    let shop = fetch_shop_by_slug(&state.db, &slug).await?;

    let out = availability::compute_slots(&state.db, shop.id, query.service_id, date, step)
        .await
        .map_err(availability_error)?;

    Ok(Json(ApiResponse::success(AvailabilityResponse {
        date: date.format("%Y-%m-%d").to_string(),
        service: Some(out.service),
        slots: out.slots,
        reason: None,
    })))
}

/// POST /api/public/{slug}/book — create an appointment.
///
/// Recomputes availability for the requested date and only inserts when the
/// requested time is still in the fresh slot list; the partial unique index on
/// `(barbershop_id, date, time)` turns the remaining race window into the same
/// conflict answer.
pub async fn book(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(body): Json<BookRequest>,
) -> Result<Json<ApiResponse<BookResponse>>, HandlerError> {
    let date = parse_date(&body.date)?;
    if availability::time_to_minutes(&body.time).is_none() {
        return Err(bad_request("Invalid time (HH:MM)"));
    }
    let customer_name = body.customer_name.trim();
    if customer_name.len() < 2 {
        return Err(bad_request("Missing customer name"));
    }
    let customer_phone = body.customer_phone.trim();
    if customer_phone.len() < 6 {
        return Err(bad_request("Missing customer phone"));
    }
    if date < Local::now().date_naive() {
        return Err(bad_request("Cannot book past dates"));
    }

    let shop = fetch_shop_by_slug(&state.db, &slug).await?;

    let out = availability::compute_slots(
        &state.db,
        shop.id,
        body.service_id,
        date,
        DEFAULT_STEP_MINUTES,
    )
    .await
    .map_err(availability_error)?;

    if !out.slots.iter().any(|s| s == &body.time) {
        return Err(slot_taken());
    }

    let snapshot = price_snapshot(
        out.service.price,
        out.service.deposit_percentage,
        shop.default_deposit_percentage,
        shop.platform_fee,
    );

    let result = sqlx::query(
        "INSERT INTO appointments
            (barbershop_id, service_id, date, time,
             customer_name, customer_phone, customer_email, notes,
             status, payment_status,
             deposit_percentage_at_booking, deposit_amount, platform_fee, total_to_pay)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 'unpaid', ?, ?, ?, ?)",
    )
    .bind(shop.id)
    .bind(out.service.id)
    .bind(date.format("%Y-%m-%d").to_string())
    .bind(&body.time)
    .bind(customer_name)
    .bind(customer_phone)
    .bind(body.customer_email.as_deref().map(str::trim))
    .bind(body.notes.as_deref().map(str::trim))
    .bind(snapshot.deposit_percentage)
    .bind(snapshot.deposit_amount)
    .bind(snapshot.platform_fee)
    .bind(snapshot.total_to_pay)
    .execute(&state.db)
    .await;

    let id = match result {
        Ok(done) => done.last_insert_rowid(),
        // The slot was taken between the availability check and the INSERT.
        Err(e) if is_unique_violation(&e) => return Err(slot_taken()),
        Err(e) => {
            tracing::error!("book INSERT failed: {}", e);
            return Err(internal_error());
        }
    };

    Ok(Json(ApiResponse::success(BookResponse { id })))
}

// ── Shared helpers (pub(crate) for other handler modules) ──

/// Resolve a shop by slug, answering 404 when absent.
pub(crate) async fn fetch_shop_by_slug(
    db: &sqlx::SqlitePool,
    slug: &str,
) -> Result<ShopBookingInfo, HandlerError> {
    sqlx::query_as::<_, ShopBookingInfo>(
        "SELECT id, name, city, address, phone, slug, default_deposit_percentage, platform_fee
         FROM barbershops WHERE slug = ?",
    )
    .bind(slug)
    .fetch_optional(db)
    .await
    .map_err(|e| {
        tracing::error!("fetch_shop_by_slug: {}", e);
        internal_error()
    })?
    .ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Barbershop not found")),
        )
    })
}

pub(crate) fn bad_request(msg: &str) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg)))
}

pub(crate) fn internal_error() -> HandlerError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error("DB error")),
    )
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, HandlerError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| bad_request("Invalid date (YYYY-MM-DD)"))
}

fn slot_taken() -> HandlerError {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::error("That time is no longer available")),
    )
}

fn availability_error(err: AvailabilityError) -> HandlerError {
    match err {
        AvailabilityError::ServiceNotFound => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Service not found for this barbershop")),
        ),
        AvailabilityError::Db(e) => {
            tracing::error!("compute_slots: {}", e);
            internal_error()
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// ── Pricing snapshot ──

/// Deposit math frozen onto the appointment at booking time.
#[derive(Debug, PartialEq, Eq)]
struct PriceSnapshot {
    deposit_percentage: i64,
    deposit_amount: i64,
    platform_fee: i64,
    total_to_pay: i64,
}

/// A service-level deposit percentage wins over the shop default; a missing
/// or zero shop default falls back to 15%. The amount rounds half-up.
fn price_snapshot(
    price: i64,
    service_pct: Option<i64>,
    shop_default_pct: i64,
    platform_fee: i64,
) -> PriceSnapshot {
    let pct = service_pct.unwrap_or(if shop_default_pct > 0 {
        shop_default_pct
    } else {
        DEFAULT_DEPOSIT_PERCENTAGE
    });
    let deposit_amount = (price * pct + 50) / 100;
    PriceSnapshot {
        deposit_percentage: pct,
        deposit_amount,
        platform_fee,
        total_to_pay: deposit_amount + platform_fee,
    }
}

// ── Tests ──
