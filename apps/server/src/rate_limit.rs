//! Per-IP sliding-window rate limiting for the API route groups.
//!
//! Each named tier (public, auth, booking, admin) keeps its own window
//! configuration and per-IP request history. Over-limit requests get a 429
//! with a `Retry-After` header; a background task periodically drops stale
//! IP entries.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// One named tier: window config plus per-IP hit history.
#[derive(Debug)]
struct Tier {
    max_requests: usize,
    window: Duration,
    hits: DashMap<IpAddr, VecDeque<Instant>>,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    tiers: Arc<DashMap<&'static str, Tier>>,
}

impl RateLimiter {
    /// Create an empty limiter. Call `add_tier()` to configure.
    pub fn new() -> Self {
        Self {
            tiers: Arc::new(DashMap::new()),
        }
    }

    /// Register a named tier.
    pub fn add_tier(&self, name: &'static str, max_requests: usize, window: Duration) {
        self.tiers.insert(
            name,
            Tier {
                max_requests,
                window,
                hits: DashMap::new(),
            },
        );
    }

    /// Check whether a request from `ip` is allowed under `tier`.
    ///
    /// Returns `Ok(())` when allowed, `Err(retry_after_secs)` when limited.
    pub fn check(&self, tier: &'static str, ip: IpAddr) -> Result<(), u64> {
        let entry = self.tiers.get(tier).expect("unknown rate limit tier");
        let tier = entry.value();
        let now = Instant::now();

        let mut hits = tier.hits.entry(ip).or_default();
        while hits
            .front()
            .is_some_and(|t| now.duration_since(*t) >= tier.window)
        {
            hits.pop_front();
        }

        if hits.len() >= tier.max_requests {
            // Seconds until the oldest hit leaves the window.
            let retry_after = (hits[0] + tier.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        hits.push_back(now);
        Ok(())
    }

    /// Drop IP entries whose newest hit is older than 2× the tier window.
    /// Call periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        for entry in self.tiers.iter() {
            let tier = entry.value();
            let cutoff = tier.window * 2;
            tier.hits.retain(|_ip, hits| {
                while hits
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= cutoff)
                {
                    hits.pop_front();
                }
                !hits.is_empty()
            });
        }
    }
}

// ── IP extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or the socket address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
        {
            return ip;
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| "127.0.0.1".parse().unwrap())
}

// ── Middleware ──

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Too many requests. Try again in {} seconds",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

async fn enforce(
    limiter: RateLimiter,
    tier: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(too_many_requests)?;
    Ok(next.run(req).await)
}

/// Public read-only endpoints (60 req/min).
pub async fn rate_limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(limiter, "public", req, next).await
}

/// Account endpoints: signup/register/login (30 req/min).
pub async fn rate_limit_auth(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(limiter, "auth", req, next).await
}

/// Booking creation (5 req/5min — strictest).
pub async fn rate_limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(limiter, "booking", req, next).await
}

/// Owner admin endpoints (120 req/min).
pub async fn rate_limit_admin(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    enforce(limiter, "admin", req, next).await
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread::sleep;

    fn test_ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn limiter_with(max: usize, window: Duration) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.add_tier("test", max, window);
        limiter
    }

    #[test]
    fn test_allows_requests_under_limit() {
        let limiter = limiter_with(3, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_rejects_over_limit() {
        let limiter = limiter_with(2, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_err());
    }

    #[test]
    fn test_retry_after_within_window() {
        let limiter = limiter_with(1, Duration::from_secs(60));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();
        let retry_after = limiter.check("test", ip).unwrap_err();
        assert!((1..=60).contains(&retry_after));
    }

    #[test]
    fn test_ips_tracked_independently() {
        let limiter = limiter_with(1, Duration::from_secs(60));
        assert!(limiter.check("test", test_ip(1)).is_ok());
        assert!(limiter.check("test", test_ip(1)).is_err());
        assert!(limiter.check("test", test_ip(2)).is_ok());
    }

    #[test]
    fn test_tiers_tracked_independently() {
        let limiter = RateLimiter::new();
        limiter.add_tier("tier_a", 1, Duration::from_secs(60));
        limiter.add_tier("tier_b", 1, Duration::from_secs(60));
        let ip = test_ip(1);
        assert!(limiter.check("tier_a", ip).is_ok());
        assert!(limiter.check("tier_a", ip).is_err());
        assert!(limiter.check("tier_b", ip).is_ok());
    }

    #[test]
    fn test_window_expiry_allows_again() {
        let limiter = limiter_with(1, Duration::from_millis(100));
        let ip = test_ip(1);
        assert!(limiter.check("test", ip).is_ok());
        assert!(limiter.check("test", ip).is_err());

        sleep(Duration::from_millis(150));

        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_cleanup_drops_stale_entries() {
        let limiter = limiter_with(10, Duration::from_millis(50));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();

        sleep(Duration::from_millis(120)); // past 2× window

        limiter.cleanup();
        assert!(limiter.check("test", ip).is_ok());
    }

    #[test]
    fn test_cleanup_keeps_active_entries() {
        let limiter = limiter_with(2, Duration::from_secs(60));
        let ip = test_ip(1);
        limiter.check("test", ip).unwrap();

        limiter.cleanup();

        limiter.check("test", ip).unwrap();
        assert!(limiter.check("test", ip).is_err());
    }
}
