use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::public::{bad_request, internal_error};
use crate::{auth, models::*, AppState};

type HandlerError = (StatusCode, Json<ApiResponse<()>>);

/// POST /api/onboarding/signup — barbershop + owner in one step.
///
/// Creates the shop, its owner account and two starter services inside one
/// transaction, then hands back a long-lived token so the new owner lands in
/// the admin panel already signed in.
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Result<Json<ApiResponse<SignupResponse>>, HandlerError> {
    let shop_name = body.shop_name.trim();
    let city = body.city.trim();
    let owner_name = body.owner_name.trim();
    let email = body.email.trim().to_lowercase();
    let password = body.password.trim();

    if shop_name.is_empty()
        || city.is_empty()
        || owner_name.is_empty()
        || email.is_empty()
        || password.is_empty()
    {
        return Err(bad_request(
            "Missing fields: shopName, city, ownerName, email, password",
        ));
    }

    if email_taken(&state.db, &email).await? {
        return Err(email_conflict());
    }

    let address = body.address.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let phone = body.phone.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let mut tx = state.db.begin().await.map_err(|e| {
        tracing::error!("signup begin: {}", e);
        internal_error()
    })?;

    let shop_id = sqlx::query(
        "INSERT INTO barbershops (name, city, address, phone, default_deposit_percentage, platform_fee)
         VALUES (?, ?, ?, ?, 15, 200)",
    )
    .bind(shop_name)
    .bind(city)
    .bind(address)
    .bind(phone)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("signup shop INSERT: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    let password_hash = auth::hash_password(password, &state.auth_secret);
    let user_id = sqlx::query(
        "INSERT INTO barbershop_users (barbershop_id, name, email, password_hash, role)
         VALUES (?, ?, ?, ?, 'owner')",
    )
    .bind(shop_id)
    .bind(owner_name)
    .bind(&email)
    .bind(&password_hash)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("signup user INSERT: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    // Starter services so the booking page is never empty.
    for (name, price, duration) in [("Haircut", 4000_i64, 30_i64), ("Haircut + beard", 5500, 45)] {
        sqlx::query(
            "INSERT INTO services (barbershop_id, name, price, duration_minutes, deposit_percentage)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(shop_id)
        .bind(name)
        .bind(price)
        .bind(duration)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("signup service INSERT: {}", e);
            internal_error()
        })?;
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("signup commit: {}", e);
        internal_error()
    })?;

    let claims = auth::AuthClaims::new(
        user_id,
        shop_id,
        auth::ROLE_OWNER,
        auth::SIGNUP_TOKEN_TTL_SECS,
    );
    let token = auth::issue_token(&claims, &state.auth_secret);

    Ok(Json(ApiResponse::success(SignupResponse {
        token,
        barbershop: SignupShop {
            id: shop_id,
            name: shop_name.to_string(),
            city: Some(city.to_string()),
        },
        user: AuthUser {
            id: user_id,
            name: owner_name.to_string(),
            email,
            barbershop_id: shop_id,
            role: auth::ROLE_OWNER.to_string(),
        },
    })))
}

/// POST /api/auth/register — owner account for an existing shop.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<AuthUser>>, HandlerError> {
    let name = body.name.trim();
    let email = body.email.trim().to_lowercase();
    let password = body.password.trim();
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(bad_request("Missing fields: name, email, password"));
    }

    let shop_exists: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM barbershops WHERE id = ?")
            .bind(body.barbershop_id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| {
                tracing::error!("register shop lookup: {}", e);
                internal_error()
            })?;
    if !shop_exists {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error("Barbershop not found")),
        ));
    }

    if email_taken(&state.db, &email).await? {
        return Err(email_conflict());
    }

    let password_hash = auth::hash_password(password, &state.auth_secret);
    let user_id = sqlx::query(
        "INSERT INTO barbershop_users (barbershop_id, name, email, password_hash, role)
         VALUES (?, ?, ?, ?, 'owner')",
    )
    .bind(body.barbershop_id)
    .bind(name)
    .bind(&email)
    .bind(&password_hash)
    .execute(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("register INSERT: {}", e);
        internal_error()
    })?
    .last_insert_rowid();

    Ok(Json(ApiResponse::success(AuthUser {
        id: user_id,
        name: name.to_string(),
        email,
        barbershop_id: body.barbershop_id,
        role: auth::ROLE_OWNER.to_string(),
    })))
}

/// POST /api/auth/login — verify credentials and issue a token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, HandlerError> {
    let email = body.email.trim().to_lowercase();
    let password = body.password.trim();
    if email.is_empty() || password.is_empty() {
        return Err(bad_request("Missing fields: email, password"));
    }

    let user = sqlx::query_as::<_, BarbershopUser>(
        "SELECT id, barbershop_id, name, email, password_hash, role, created_at
         FROM barbershop_users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| {
        tracing::error!("login lookup: {}", e);
        internal_error()
    })?
    .ok_or_else(invalid_credentials)?;

    if !auth::verify_password(password, &user.password_hash, &state.auth_secret) {
        return Err(invalid_credentials());
    }

    let claims = auth::AuthClaims::new(
        user.id,
        user.barbershop_id,
        &user.role,
        auth::LOGIN_TOKEN_TTL_SECS,
    );
    let token = auth::issue_token(&claims, &state.auth_secret);

    Ok(Json(ApiResponse::success(AuthResponse {
        token,
        user: AuthUser {
            id: user.id,
            name: user.name,
            email: user.email,
            barbershop_id: user.barbershop_id,
            role: user.role,
        },
    })))
}

// ── Private helpers ──

async fn email_taken(db: &sqlx::SqlitePool, email: &str) -> Result<bool, HandlerError> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM barbershop_users WHERE email = ?")
        .bind(email)
        .fetch_one(db)
        .await
        .map_err(|e| {
            tracing::error!("email lookup: {}", e);
            internal_error()
        })
}

fn email_conflict() -> HandlerError {
    (
        StatusCode::CONFLICT,
        Json(ApiResponse::error("Email already registered")),
    )
}

fn invalid_credentials() -> HandlerError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::error("Invalid credentials")),
    )
}
