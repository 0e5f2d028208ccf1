mod auth;
mod availability;
mod db;
mod handlers;
mod models;
mod rate_limit;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use rate_limit::{
    rate_limit_admin, rate_limit_auth, rate_limit_booking, rate_limit_public, RateLimiter,
};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub auth_secret: String,
    pub platform_admin_key: Option<String>,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Required env vars ──
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:barbercloud.db?mode=rwc".into());
    let auth_secret = std::env::var("AUTH_SECRET").expect("AUTH_SECRET must be set");

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Optional env vars ──
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port = std::env::var("PORT").unwrap_or_else(|_| "4000".into());
    let cors_origin = std::env::var("CORS_ORIGIN").ok().filter(|v| !v.is_empty());
    let platform_admin_key = std::env::var("PLATFORM_ADMIN_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    if platform_admin_key.is_none() {
        tracing::warn!("PLATFORM_ADMIN_KEY not set — barbershop creation is open");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::run_migrations(&pool).await?;

    let state = Arc::new(AppState {
        db: pool,
        auth_secret,
        platform_admin_key,
        started_at: Instant::now(),
    });

    // ── Rate limiter ──
    let rate_limiter = RateLimiter::new();
    rate_limiter.add_tier("public", 60, Duration::from_secs(60));
    rate_limiter.add_tier("auth", 30, Duration::from_secs(60));
    rate_limiter.add_tier("booking", 5, Duration::from_secs(300));
    rate_limiter.add_tier("admin", 120, Duration::from_secs(60));

    // ── Background task: cleanup stale rate limit entries ──
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    // ── CORS: whitelist CORS_ORIGIN when configured, otherwise allow any ──
    let cors = if let Some(origin) = cors_origin {
        let origins: Vec<axum::http::HeaderValue> =
            vec![origin.parse().expect("CORS_ORIGIN must be a valid origin")];
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // ── Router (4 groups with per-group rate limits) ──

    // 1. No-limit: health check
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public: directory + booking-page reads (60 req/min); shop creation
    //    shares the path with the directory list and carries its own key guard.
    let public_routes = Router::new()
        .route(
            "/api/barbershops",
            get(handlers::public::list_shops).post(handlers::admin::create_shop),
        )
        .route(
            "/api/barbershops/slug/{slug}",
            get(handlers::public::shop_by_slug),
        )
        .route(
            "/api/public/{slug}/barbershop",
            get(handlers::public::booking_shop),
        )
        .route(
            "/api/public/{slug}/services",
            get(handlers::public::booking_services),
        )
        .route(
            "/api/public/{slug}/availability",
            get(handlers::public::availability),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_public));

    // 3. Booking creation: strictest limit (5 req/5min)
    let booking_routes = Router::new()
        .route("/api/public/{slug}/book", post(handlers::public::book))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_booking));

    // 4. Account: signup/register/login (30 req/min)
    let account_routes = Router::new()
        .route("/api/onboarding/signup", post(handlers::account::signup))
        .route("/api/auth/register", post(handlers::account::register))
        .route("/api/auth/login", post(handlers::account::login))
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_auth));

    // 5. Owner admin: all "/mine" endpoints (120 req/min)
    let admin_routes = Router::new()
        .route("/api/barbershops/mine", get(handlers::admin::my_shop))
        .route("/api/barbershops/mine", put(handlers::admin::update_my_shop))
        .route(
            "/api/barbershops/mine/settings",
            put(handlers::admin::update_settings),
        )
        .route(
            "/api/working-hours/mine",
            get(handlers::admin::working_hours),
        )
        .route(
            "/api/working-hours/mine",
            put(handlers::admin::put_working_hours),
        )
        .route(
            "/api/blocked-times/mine",
            get(handlers::admin::list_blocked_times),
        )
        .route(
            "/api/blocked-times/mine",
            post(handlers::admin::create_blocked_time),
        )
        .route(
            "/api/blocked-times/mine/{id}",
            delete(handlers::admin::delete_blocked_time),
        )
        .route("/api/services/mine", get(handlers::admin::list_my_services))
        .route("/api/services/mine", post(handlers::admin::create_service))
        .route(
            "/api/services/mine/{id}",
            put(handlers::admin::update_service),
        )
        .route(
            "/api/services/mine/{id}",
            delete(handlers::admin::delete_service),
        )
        .route(
            "/api/appointments/mine",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/appointments/mine/{id}/status",
            put(handlers::admin::update_appointment_status),
        )
        .layer(from_fn_with_state(rate_limiter.clone(), rate_limit_admin));

    let app = Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(booking_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!("BarberCloud server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
