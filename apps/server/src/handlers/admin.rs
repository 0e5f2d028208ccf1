use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    Json,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use super::public::{bad_request, internal_error, parse_date};
use crate::availability::time_to_minutes;
use crate::{auth, models::*, AppState};

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

/// Helper: extract owner claims (validates both the token and the role).
fn extract_owner(
    auth_header: Option<&str>,
    state: &AppState,
) -> Result<auth::AuthClaims, HandlerError> {
    let header = auth_header.ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Missing Authorization header")),
        )
    })?;
    let claims = auth::extract_claims_from_header(header, &state.auth_secret).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid or expired token")),
        )
    })?;

    if !auth::is_owner(&claims) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Only the owner can perform this action")),
        ));
    }

    Ok(claims)
}

fn auth_header(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}

// ── Shop profile ──

/// GET /api/barbershops/mine — the authenticated owner's shop.
pub async fn my_shop(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<ShopBookingInfo>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let shop = sqlx::query_as::<_, ShopBookingInfo>(
        "SELECT id, name, city, address, phone, slug, default_deposit_percentage, platform_fee
         FROM barbershops WHERE id = ?",
    )
    .bind(claims.barbershop_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|_| internal_error())?
    .ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Barbershop not found")),
        )
    })?;

    Ok(Json(ApiResponse::success(shop)))
}

/// PUT /api/barbershops/mine — edit general shop data (never the platform fee).
pub async fn update_my_shop(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<UpdateShopRequest>,
) -> Result<Json<ApiResponse<ShopBookingInfo>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;
    let shop_id = claims.barbershop_id;

    if let Some(name) = &body.name {
        sqlx::query("UPDATE barbershops SET name = ? WHERE id = ?")
            .bind(name).bind(shop_id).execute(&state.db).await.ok();
    }
    if let Some(city) = &body.city {
        sqlx::query("UPDATE barbershops SET city = ? WHERE id = ?")
            .bind(city).bind(shop_id).execute(&state.db).await.ok();
    }
    if let Some(address) = &body.address {
        sqlx::query("UPDATE barbershops SET address = ? WHERE id = ?")
            .bind(address).bind(shop_id).execute(&state.db).await.ok();
    }
    if let Some(phone) = &body.phone {
        sqlx::query("UPDATE barbershops SET phone = ? WHERE id = ?")
            .bind(phone).bind(shop_id).execute(&state.db).await.ok();
    }
    if let Some(raw) = &body.slug {
        // An empty slug after normalization clears it.
        let slug = slugify(raw);
        let new_slug = if slug.is_empty() { None } else { Some(slug) };
        if let Some(s) = &new_slug {
            ensure_slug_free(&state.db, s, Some(shop_id)).await?;
        }
        sqlx::query("UPDATE barbershops SET slug = ? WHERE id = ?")
            .bind(&new_slug).bind(shop_id).execute(&state.db).await.ok();
    }

    let shop = sqlx::query_as::<_, ShopBookingInfo>(
        "SELECT id, name, city, address, phone, slug, default_deposit_percentage, platform_fee
         FROM barbershops WHERE id = ?",
    )
    .bind(shop_id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(shop)))
}

/// PUT /api/barbershops/mine/settings — deposit percentage only.
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<ShopSettings>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let pct = body.default_deposit_percentage;
    if !(0..=100).contains(&pct) {
        return Err(bad_request("Invalid defaultDepositPercentage (0-100)"));
    }

    sqlx::query("UPDATE barbershops SET default_deposit_percentage = ? WHERE id = ?")
        .bind(pct)
        .bind(claims.barbershop_id)
        .execute(&state.db)
        .await
        .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(ShopSettings {
        id: claims.barbershop_id,
        default_deposit_percentage: pct,
    })))
}

// ── Working hours template ──

/// GET /api/working-hours/mine — the shop's weekly template.
pub async fn working_hours(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<WorkingHourItem>>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;
    let items = fetch_working_hours(&state.db, claims.barbershop_id).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// PUT /api/working-hours/mine — replace the whole weekly template.
pub async fn put_working_hours(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<WorkingHoursPayload>,
) -> Result<Json<ApiResponse<Vec<WorkingHourItem>>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let items = normalize_working_hours(&body)
        .ok_or_else(|| bad_request("Invalid payload. Send {items:[...]}"))?;
    if let Err(msg) = validate_working_hours(&items) {
        return Err((StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg))));
    }

    let mut tx = state.db.begin().await.map_err(|e| {
        tracing::error!("put_working_hours begin: {}", e);
        internal_error()
    })?;

    sqlx::query("DELETE FROM working_hours WHERE barbershop_id = ?")
        .bind(claims.barbershop_id)
        .execute(&mut *tx)
        .await
        .map_err(|_| internal_error())?;

    for it in &items {
        sqlx::query(
            "INSERT INTO working_hours (barbershop_id, weekday, start_time, end_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(claims.barbershop_id)
        .bind(it.weekday)
        .bind(&it.start_time)
        .bind(&it.end_time)
        .execute(&mut *tx)
        .await
        .map_err(|_| internal_error())?;
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("put_working_hours commit: {}", e);
        internal_error()
    })?;

    let saved = fetch_working_hours(&state.db, claims.barbershop_id).await?;
    Ok(Json(ApiResponse::success(saved)))
}

// ── Blocked times ──

/// GET /api/blocked-times/mine — the shop's blocks.
pub async fn list_blocked_times(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<BlockedTime>>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let items = sqlx::query_as::<_, BlockedTime>(
        "SELECT id, barbershop_id, date_from, date_to, start_time, end_time, reason, created_at
         FROM blocked_times WHERE barbershop_id = ?
         ORDER BY date_from ASC, start_time ASC, created_at ASC",
    )
    .bind(claims.barbershop_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("list_blocked_times: {}", e);
        internal_error()
    })?;

    Ok(Json(ApiResponse::success(items)))
}

/// POST /api/blocked-times/mine — create a block (full days or a time window).
pub async fn create_blocked_time(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<BlockedTimeRequest>,
) -> Result<Json<ApiResponse<BlockedTime>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    if let Err(msg) = validate_blocked_time(&body) {
        return Err(bad_request(msg));
    }

    let id = sqlx::query(
        "INSERT INTO blocked_times (barbershop_id, date_from, date_to, start_time, end_time, reason)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(claims.barbershop_id)
    .bind(&body.date_from)
    .bind(&body.date_to)
    .bind(&body.start_time)
    .bind(&body.end_time)
    .bind(body.reason.as_deref().map(str::trim))
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("create_blocked_time: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    let item = sqlx::query_as::<_, BlockedTime>(
        "SELECT id, barbershop_id, date_from, date_to, start_time, end_time, reason, created_at
         FROM blocked_times WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(item)))
}

/// DELETE /api/blocked-times/mine/{id} — remove a block belonging to the shop.
pub async fn delete_blocked_time(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let found: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM blocked_times WHERE id = ? AND barbershop_id = ?",
    )
    .bind(id)
    .bind(claims.barbershop_id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;
    if !found {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Block not found")),
        ));
    }

    sqlx::query("DELETE FROM blocked_times WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .ok();

    Ok(Json(ApiResponse::success("Block deleted")))
}

// ── Services ──

/// GET /api/services/mine — all of the shop's services.
pub async fn list_my_services(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<Json<ApiResponse<Vec<Service>>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let services = sqlx::query_as::<_, Service>(
        "SELECT id, barbershop_id, name, description, price, duration_minutes, deposit_percentage, created_at
         FROM services WHERE barbershop_id = ? ORDER BY id ASC",
    )
    .bind(claims.barbershop_id)
    .fetch_all(&state.db)
    .await
    .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(services)))
}

/// POST /api/services/mine — create a service.
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(bad_request("Missing name"));
    }
    if body.price < 0 {
        return Err(bad_request("Invalid price"));
    }
    let duration = body.duration_minutes.unwrap_or(30);
    if duration <= 0 {
        return Err(bad_request("Invalid durationMinutes"));
    }
    if let Some(pct) = body.deposit_percentage {
        if !(0..=100).contains(&pct) {
            return Err(bad_request("Invalid depositPercentage (0-100)"));
        }
    }

    let id = sqlx::query(
        "INSERT INTO services (barbershop_id, name, description, price, duration_minutes, deposit_percentage)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(claims.barbershop_id)
    .bind(name)
    .bind(body.description.as_deref().map(str::trim))
    .bind(body.price)
    .bind(duration)
    .bind(body.deposit_percentage)
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("create_service: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    let service = fetch_service(&state.db, id).await?;
    Ok(Json(ApiResponse::success(service)))
}

/// PUT /api/services/mine/{id} — update a service of the shop.
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> Result<Json<ApiResponse<Service>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;
    ensure_service_ownership(&state.db, id, claims.barbershop_id).await?;

    if let Some(name) = &body.name {
        sqlx::query("UPDATE services SET name = ? WHERE id = ?")
            .bind(name).bind(id).execute(&state.db).await.ok();
    }
    if let Some(desc) = &body.description {
        sqlx::query("UPDATE services SET description = ? WHERE id = ?")
            .bind(desc).bind(id).execute(&state.db).await.ok();
    }
    if let Some(price) = body.price {
        if price < 0 {
            return Err(bad_request("Invalid price"));
        }
        sqlx::query("UPDATE services SET price = ? WHERE id = ?")
            .bind(price).bind(id).execute(&state.db).await.ok();
    }
    if let Some(duration) = body.duration_minutes {
        if duration <= 0 {
            return Err(bad_request("Invalid durationMinutes"));
        }
        sqlx::query("UPDATE services SET duration_minutes = ? WHERE id = ?")
            .bind(duration).bind(id).execute(&state.db).await.ok();
    }
    if let Some(pct) = body.deposit_percentage {
        if !(0..=100).contains(&pct) {
            return Err(bad_request("Invalid depositPercentage (0-100)"));
        }
        sqlx::query("UPDATE services SET deposit_percentage = ? WHERE id = ?")
            .bind(pct).bind(id).execute(&state.db).await.ok();
    }

    let service = fetch_service(&state.db, id).await?;
    Ok(Json(ApiResponse::success(service)))
}

/// DELETE /api/services/mine/{id} — delete a service with no live appointments.
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<&'static str>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;
    ensure_service_ownership(&state.db, id, claims.barbershop_id).await?;

    let in_use: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM appointments WHERE service_id = ? AND status != 'canceled'",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;
    if in_use {
        return Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error(
                "Service has appointments. Cancel them first.",
            )),
        ));
    }

    sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .ok();

    Ok(Json(ApiResponse::success("Service deleted")))
}

// ── Appointments ──

const APPOINTMENT_DETAIL_SELECT: &str =
    "SELECT a.id, a.service_id, s.name as service_name, s.price as service_price,
            a.date, a.time, a.customer_name, a.customer_phone, a.customer_email,
            a.notes, a.status, a.payment_status,
            a.deposit_amount, a.platform_fee, a.total_to_pay, a.created_at
     FROM appointments a
     JOIN services s ON s.id = a.service_id";

/// GET /api/appointments/mine — the shop's bookings.
///
/// Three filters: a single `date`, a `from`/`to` range, or (default) every
/// appointment from today on.
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<ApiResponse<Vec<AppointmentDetail>>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;
    let shop_id = claims.barbershop_id;

    let appointments = if let Some(date) = &query.date {
        let date = parse_date(date)?;
        let sql = format!(
            "{} WHERE a.barbershop_id = ? AND a.date = ?
             ORDER BY a.time ASC",
            APPOINTMENT_DETAIL_SELECT
        );
        sqlx::query_as::<_, AppointmentDetail>(&sql)
            .bind(shop_id)
            .bind(date.format("%Y-%m-%d").to_string())
            .fetch_all(&state.db)
            .await
    } else if let (Some(from), Some(to)) = (&query.from, &query.to) {
        let from = parse_date(from)?;
        let to = parse_date(to)?;
        let sql = format!(
            "{} WHERE a.barbershop_id = ? AND a.date BETWEEN ? AND ?
             ORDER BY a.date ASC, a.time ASC",
            APPOINTMENT_DETAIL_SELECT
        );
        sqlx::query_as::<_, AppointmentDetail>(&sql)
            .bind(shop_id)
            .bind(from.format("%Y-%m-%d").to_string())
            .bind(to.format("%Y-%m-%d").to_string())
            .fetch_all(&state.db)
            .await
    } else {
        let sql = format!(
            "{} WHERE a.barbershop_id = ? AND a.date >= date('now', 'localtime')
             ORDER BY a.date ASC, a.time ASC",
            APPOINTMENT_DETAIL_SELECT
        );
        sqlx::query_as::<_, AppointmentDetail>(&sql)
            .bind(shop_id)
            .fetch_all(&state.db)
            .await
    }
    .map_err(|e| {
        tracing::error!("list_appointments: {}", e);
        internal_error()
    })?;

    Ok(Json(ApiResponse::success(appointments)))
}

/// PUT /api/appointments/mine/{id}/status — move an appointment through its
/// lifecycle (pending → confirmed/canceled/completed).
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<ApiResponse<AppointmentDetail>>, HandlerError> {
    let claims = extract_owner(auth_header(&headers), &state)?;

    if !is_valid_status(&body.status) {
        return Err(bad_request("Invalid status"));
    }

    let found: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM appointments WHERE id = ? AND barbershop_id = ?",
    )
    .bind(id)
    .bind(claims.barbershop_id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;
    if !found {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Appointment not found")),
        ));
    }

    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(&body.status)
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("update_appointment_status: {}", e);
            internal_error()
        })?;

    let sql = format!("{} WHERE a.id = ?", APPOINTMENT_DETAIL_SELECT);
    let detail = sqlx::query_as::<_, AppointmentDetail>(&sql)
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(detail)))
}

// ── Platform ──

/// POST /api/barbershops — create a shop.
///
/// Guarded by the `x-admin-key` header when PLATFORM_ADMIN_KEY is configured;
/// open otherwise (demo installs).
pub async fn create_shop(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CreateShopRequest>,
) -> Result<Json<ApiResponse<Barbershop>>, HandlerError> {
    if let Some(expected) = &state.platform_admin_key {
        let sent = headers.get("x-admin-key").and_then(|v| v.to_str().ok());
        if sent != Some(expected.as_str()) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error("Missing or wrong x-admin-key")),
            ));
        }
    }

    let name = body.name.trim();
    if name.is_empty() {
        return Err(bad_request("Missing name"));
    }

    let slug = body.slug.as_deref().map(slugify).filter(|s| !s.is_empty());
    if let Some(s) = &slug {
        ensure_slug_free(&state.db, s, None).await?;
    }

    let id = sqlx::query(
        "INSERT INTO barbershops (name, city, address, phone, slug, default_deposit_percentage, platform_fee)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(body.city.as_deref().map(str::trim))
    .bind(body.address.as_deref().map(str::trim))
    .bind(body.phone.as_deref().map(str::trim))
    .bind(&slug)
    .bind(body.default_deposit_percentage.unwrap_or(15))
    .bind(body.platform_fee.unwrap_or(200))
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("create_shop: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    let shop = sqlx::query_as::<_, Barbershop>(
        "SELECT id, name, city, address, phone, slug, default_deposit_percentage, platform_fee, created_at
         FROM barbershops WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|_| internal_error())?;

    Ok(Json(ApiResponse::success(shop)))
}

// ── DB helpers ──

async fn fetch_working_hours(
    db: &sqlx::SqlitePool,
    shop_id: i64,
) -> Result<Vec<WorkingHourItem>, HandlerError> {
    sqlx::query_as::<_, WorkingHourItem>(
        "SELECT id, weekday, start_time, end_time FROM working_hours
         WHERE barbershop_id = ?
         ORDER BY weekday ASC, start_time ASC",
    )
    .bind(shop_id)
    .fetch_all(db)
    .await
    .map_err(|e| {
        tracing::error!("fetch_working_hours: {}", e);
        internal_error()
    })
}

async fn fetch_service(db: &sqlx::SqlitePool, id: i64) -> Result<Service, HandlerError> {
    sqlx::query_as::<_, Service>(
        "SELECT id, barbershop_id, name, description, price, duration_minutes, deposit_percentage, created_at
         FROM services WHERE id = ?",
    )
    .bind(id)
    .fetch_one(db)
    .await
    .map_err(|_| internal_error())
}

async fn ensure_service_ownership(
    db: &sqlx::SqlitePool,
    service_id: i64,
    shop_id: i64,
) -> Result<(), HandlerError> {
    let found: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM services WHERE id = ? AND barbershop_id = ?")
            .bind(service_id)
            .bind(shop_id)
            .fetch_one(db)
            .await
            .map_err(|_| internal_error())?;
    if found {
        Ok(())
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Service not found")),
        ))
    }
}

async fn ensure_slug_free(
    db: &sqlx::SqlitePool,
    slug: &str,
    own_shop_id: Option<i64>,
) -> Result<(), HandlerError> {
    let holder: Option<i64> = sqlx::query_scalar("SELECT id FROM barbershops WHERE slug = ?")
        .bind(slug)
        .fetch_optional(db)
        .await
        .map_err(|_| internal_error())?;
    match holder {
        Some(id) if Some(id) != own_shop_id => Err((
            StatusCode::CONFLICT,
            Json(ApiResponse::error("That slug is already in use")),
        )),
        _ => Ok(()),
    }
}

// ── Validation helpers ──

/// Normalize a shop slug: lowercase, whitespace to dashes, strip everything
/// that is not `[a-z0-9-]`, collapse runs of dashes, trim dashes at the ends.
fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for c in input.trim().to_lowercase().chars() {
        if c.is_whitespace() || c == '-' {
            if !last_dash && !out.is_empty() {
                out.push('-');
                last_dash = true;
            }
        } else if c.is_ascii_alphanumeric() {
            out.push(c);
            last_dash = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Flatten the two accepted template payload shapes into one item list.
fn normalize_working_hours(payload: &WorkingHoursPayload) -> Option<Vec<WorkingHourInput>> {
    if let Some(items) = &payload.items {
        return Some(items.clone());
    }
    if let Some(days) = &payload.days {
        let mut out = Vec::new();
        for day in days {
            for r in &day.ranges {
                out.push(WorkingHourInput {
                    weekday: day.weekday,
                    start_time: r.start.clone(),
                    end_time: r.end.clone(),
                });
            }
        }
        return Some(out);
    }
    None
}

/// Validate a full weekly template: weekday 0-6, proper `HH:MM` times,
/// start < end, and no overlapping ranges within a weekday.
fn validate_working_hours(items: &[WorkingHourInput]) -> Result<(), String> {
    let mut by_day: HashMap<i64, Vec<(i64, i64)>> = HashMap::new();

    for it in items {
        if !(0..=6).contains(&it.weekday) {
            return Err("Invalid weekday (0-6)".into());
        }
        let (Some(start), Some(end)) = (
            time_to_minutes(&it.start_time),
            time_to_minutes(&it.end_time),
        ) else {
            return Err("Invalid time (HH:MM)".into());
        };
        if start >= end {
            return Err("A range has start >= end".into());
        }
        by_day.entry(it.weekday).or_default().push((start, end));
    }

    for (weekday, mut ranges) in by_day {
        ranges.sort_by_key(|r| r.0);
        for pair in ranges.windows(2) {
            if pair[1].0 < pair[0].1 {
                return Err(format!("Overlapping ranges on weekday={}", weekday));
            }
        }
    }

    Ok(())
}

/// Validate a block request: dates in order, time fields both-or-neither,
/// and a non-empty time window when present.
fn validate_blocked_time(req: &BlockedTimeRequest) -> Result<(), &'static str> {
    let Ok(from) = NaiveDate::parse_from_str(&req.date_from, "%Y-%m-%d") else {
        return Err("Invalid dateFrom (YYYY-MM-DD)");
    };
    if let Some(to_raw) = &req.date_to {
        let Ok(to) = NaiveDate::parse_from_str(to_raw, "%Y-%m-%d") else {
            return Err("Invalid dateTo (YYYY-MM-DD)");
        };
        if to < from {
            return Err("dateTo cannot be before dateFrom");
        }
    }
    match (&req.start_time, &req.end_time) {
        (None, None) => {}
        (Some(s), Some(e)) => {
            let (Some(start), Some(end)) = (time_to_minutes(s), time_to_minutes(e)) else {
                return Err("Invalid time (HH:MM)");
            };
            if end <= start {
                return Err("endTime must be after startTime");
            }
        }
        _ => return Err("A time-window block needs both startTime and endTime"),
    }
    Ok(())
}

fn is_valid_status(status: &str) -> bool {
    APPOINTMENT_STATUSES.contains(&status)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(weekday: i64, start: &str, end: &str) -> WorkingHourInput {
        WorkingHourInput {
            weekday,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    fn block(
        date_from: &str,
        date_to: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> BlockedTimeRequest {
        BlockedTimeRequest {
            date_from: date_from.to_string(),
            date_to: date_to.map(String::from),
            start_time: start.map(String::from),
            end_time: end.map(String::from),
            reason: None,
        }
    }

    // ── slugify ──

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Don Roque Barber"), "don-roque-barber");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("a  --  b"), "a-b");
    }

    #[test]
    fn test_slugify_strips_symbols() {
        assert_eq!(slugify("Fade & Co."), "fade-co");
    }

    #[test]
    fn test_slugify_trims_edge_dashes() {
        assert_eq!(slugify("--edge--"), "edge");
    }

    #[test]
    fn test_slugify_non_ascii_dropped() {
        assert_eq!(slugify("Peluquería"), "peluquera");
    }

    #[test]
    fn test_slugify_empty_when_nothing_survives() {
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify(""), "");
    }

    // ── normalize_working_hours ──

    #[test]
    fn test_normalize_items_shape() {
        let payload = WorkingHoursPayload {
            items: Some(vec![hour(1, "09:00", "13:00")]),
            days: None,
        };
        let items = normalize_working_hours(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].weekday, 1);
    }

    #[test]
    fn test_normalize_days_shape() {
        let payload = WorkingHoursPayload {
            items: None,
            days: Some(vec![DayRanges {
                weekday: 3,
                ranges: vec![
                    StartEnd {
                        start: "09:00".into(),
                        end: "13:00".into(),
                    },
                    StartEnd {
                        start: "15:00".into(),
                        end: "20:00".into(),
                    },
                ],
            }]),
        };
        let items = normalize_working_hours(&payload).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].start_time, "15:00");
    }

    #[test]
    fn test_normalize_neither_shape() {
        let payload = WorkingHoursPayload {
            items: None,
            days: None,
        };
        assert!(normalize_working_hours(&payload).is_none());
    }

    // ── validate_working_hours ──

    #[test]
    fn test_hours_valid_split_day() {
        let items = vec![hour(3, "09:00", "13:00"), hour(3, "15:00", "20:00")];
        assert!(validate_working_hours(&items).is_ok());
    }

    #[test]
    fn test_hours_empty_template_allowed() {
        assert!(validate_working_hours(&[]).is_ok());
    }

    #[test]
    fn test_hours_bad_weekday() {
        let items = vec![hour(7, "09:00", "13:00")];
        assert!(validate_working_hours(&items).is_err());
    }

    #[test]
    fn test_hours_negative_weekday() {
        let items = vec![hour(-1, "09:00", "13:00")];
        assert!(validate_working_hours(&items).is_err());
    }

    #[test]
    fn test_hours_bad_time() {
        let items = vec![hour(1, "9am", "13:00")];
        assert!(validate_working_hours(&items).is_err());
    }

    #[test]
    fn test_hours_start_not_before_end() {
        let items = vec![hour(1, "13:00", "13:00")];
        assert!(validate_working_hours(&items).is_err());
        let items = vec![hour(1, "14:00", "13:00")];
        assert!(validate_working_hours(&items).is_err());
    }

    #[test]
    fn test_hours_overlap_same_day_rejected() {
        let items = vec![hour(2, "09:00", "13:00"), hour(2, "12:00", "18:00")];
        let err = validate_working_hours(&items).unwrap_err();
        assert!(err.contains("weekday=2"));
    }

    #[test]
    fn test_hours_touching_ranges_allowed() {
        let items = vec![hour(2, "09:00", "13:00"), hour(2, "13:00", "18:00")];
        assert!(validate_working_hours(&items).is_ok());
    }

    #[test]
    fn test_hours_same_times_different_days_allowed() {
        let items = vec![hour(1, "09:00", "13:00"), hour(2, "09:00", "13:00")];
        assert!(validate_working_hours(&items).is_ok());
    }

    // ── validate_blocked_time ──

    #[test]
    fn test_block_full_single_day() {
        assert!(validate_blocked_time(&block("2026-08-20", None, None, None)).is_ok());
    }

    #[test]
    fn test_block_vacation_range() {
        assert!(validate_blocked_time(&block("2026-08-20", Some("2026-08-27"), None, None)).is_ok());
    }

    #[test]
    fn test_block_time_window() {
        assert!(
            validate_blocked_time(&block("2026-08-20", None, Some("11:00"), Some("11:30"))).is_ok()
        );
    }

    #[test]
    fn test_block_bad_date_from() {
        assert!(validate_blocked_time(&block("20-08-2026", None, None, None)).is_err());
    }

    #[test]
    fn test_block_date_to_before_date_from() {
        assert!(validate_blocked_time(&block("2026-08-20", Some("2026-08-19"), None, None)).is_err());
    }

    #[test]
    fn test_block_partial_time_pair_rejected() {
        assert!(validate_blocked_time(&block("2026-08-20", None, Some("11:00"), None)).is_err());
        assert!(validate_blocked_time(&block("2026-08-20", None, None, Some("11:30"))).is_err());
    }

    #[test]
    fn test_block_empty_time_window_rejected() {
        assert!(
            validate_blocked_time(&block("2026-08-20", None, Some("11:00"), Some("11:00"))).is_err()
        );
        assert!(
            validate_blocked_time(&block("2026-08-20", None, Some("12:00"), Some("11:00"))).is_err()
        );
    }

    #[test]
    fn test_block_bad_time_format() {
        assert!(
            validate_blocked_time(&block("2026-08-20", None, Some("11h00"), Some("12h00"))).is_err()
        );
    }

    // ── statuses ──

    #[test]
    fn test_known_statuses_accepted() {
        for s in APPOINTMENT_STATUSES {
            assert!(is_valid_status(s));
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!(!is_valid_status("cancelled"));
        assert!(!is_valid_status(""));
        assert!(!is_valid_status("archived"));
    }
}
