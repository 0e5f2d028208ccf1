use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime for a normal login (7 days).
pub const LOGIN_TOKEN_TTL_SECS: i64 = 7 * 86400;
/// Token lifetime handed out right after signup (30 days).
pub const SIGNUP_TOKEN_TTL_SECS: i64 = 30 * 86400;

const SALT_LEN: usize = 16;

pub const ROLE_OWNER: &str = "owner";

/// Claims embedded in a signed bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub user_id: i64,
    pub barbershop_id: i64,
    pub role: String,
    /// Unix timestamp after which the token is rejected.
    pub exp: i64,
}

impl AuthClaims {
    pub fn new(user_id: i64, barbershop_id: i64, role: &str, ttl_secs: i64) -> Self {
        Self {
            user_id,
            barbershop_id,
            role: role.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        }
    }
}

fn keyed_mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

// ── Passwords ──

/// Hash a password with a fresh random salt.
/// Stored form: `<salt_hex>$<digest_hex>` where digest = HMAC-SHA256(secret, salt || password).
pub fn hash_password(password: &str, secret: &str) -> String {
    let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
    let mut mac = keyed_mac(secret);
    mac.update(&salt);
    mac.update(password.as_bytes());
    let digest = mac.finalize().into_bytes();
    format!("{}${}", hex::encode(salt), hex::encode(digest))
}

/// Verify a password against a stored `salt$digest` pair (constant-time on the digest).
pub fn verify_password(password: &str, stored: &str, secret: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    let mut mac = keyed_mac(secret);
    mac.update(&salt);
    mac.update(password.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

// ── Tokens ──

/// Sign claims into a bearer token: `<payload_hex>.<signature_hex>`.
pub fn issue_token(claims: &AuthClaims, secret: &str) -> String {
    let payload = serde_json::to_vec(claims).expect("claims serialize to JSON");
    let mut mac = keyed_mac(secret);
    mac.update(&payload);
    let signature = mac.finalize().into_bytes();
    format!("{}.{}", hex::encode(&payload), hex::encode(signature))
}

/// Verify a token's signature and expiry, returning its claims.
pub fn verify_token(token: &str, secret: &str) -> Option<AuthClaims> {
    let (payload_hex, signature_hex) = token.split_once('.')?;
    let payload = hex::decode(payload_hex).ok()?;
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = keyed_mac(secret);
    mac.update(&payload);
    if mac.verify_slice(&signature).is_err() {
        tracing::warn!("auth token signature mismatch");
        return None;
    }

    let claims: AuthClaims = serde_json::from_slice(&payload).ok()?;
    if claims.exp <= chrono::Utc::now().timestamp() {
        return None;
    }
    Some(claims)
}

/// Extract claims from an Authorization header.
/// Header format: `Bearer <token>`
pub fn extract_claims_from_header(auth_header: &str, secret: &str) -> Option<AuthClaims> {
    let token = auth_header.strip_prefix("Bearer ")?;
    verify_token(token.trim(), secret)
}

/// Check that the authenticated user is a shop owner.
pub fn is_owner(claims: &AuthClaims) -> bool {
    claims.role == ROLE_OWNER
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn claims() -> AuthClaims {
        AuthClaims::new(7, 3, ROLE_OWNER, 3600)
    }

    // ── passwords ──

    #[test]
    fn test_password_roundtrip() {
        let stored = hash_password("hunter22", SECRET);
        assert!(verify_password("hunter22", &stored, SECRET));
    }

    #[test]
    fn test_wrong_password_rejected() {
        let stored = hash_password("hunter22", SECRET);
        assert!(!verify_password("hunter23", &stored, SECRET));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let stored = hash_password("hunter22", SECRET);
        assert!(!verify_password("hunter22", &stored, "other-secret"));
    }

    #[test]
    fn test_salts_differ_between_hashes() {
        let a = hash_password("same", SECRET);
        let b = hash_password("same", SECRET);
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_stored_hash_rejected() {
        assert!(!verify_password("x", "no-dollar-sign", SECRET));
        assert!(!verify_password("x", "zz$not-hex", SECRET));
        assert!(!verify_password("x", "", SECRET));
    }

    // ── tokens ──

    #[test]
    fn test_token_roundtrip() {
        let token = issue_token(&claims(), SECRET);
        let parsed = verify_token(&token, SECRET).expect("valid token");
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.barbershop_id, 3);
        assert_eq!(parsed.role, ROLE_OWNER);
    }

    #[test]
    fn test_expired_token_rejected() {
        let expired = AuthClaims::new(7, 3, ROLE_OWNER, -10);
        let token = issue_token(&expired, SECRET);
        assert!(verify_token(&token, SECRET).is_none());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let token = issue_token(&claims(), SECRET);
        let (payload_hex, signature_hex) = token.split_once('.').unwrap();
        // Flip the shop id inside the payload.
        let mut payload = hex::decode(payload_hex).unwrap();
        let text = String::from_utf8(payload.clone()).unwrap();
        let pos = text.find("\"barbershop_id\":3").unwrap();
        payload[pos + "\"barbershop_id\":".len()] = b'9';
        let forged = format!("{}.{}", hex::encode(payload), signature_hex);
        assert!(verify_token(&forged, SECRET).is_none());
    }

    #[test]
    fn test_wrong_signing_secret_rejected() {
        let token = issue_token(&claims(), "other-secret");
        assert!(verify_token(&token, SECRET).is_none());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verify_token("", SECRET).is_none());
        assert!(verify_token("abc", SECRET).is_none());
        assert!(verify_token("zz.zz", SECRET).is_none());
    }

    // ── header extraction ──

    #[test]
    fn test_bearer_header_accepted() {
        let token = issue_token(&claims(), SECRET);
        let header = format!("Bearer {}", token);
        assert!(extract_claims_from_header(&header, SECRET).is_some());
    }

    #[test]
    fn test_non_bearer_header_rejected() {
        let token = issue_token(&claims(), SECRET);
        assert!(extract_claims_from_header(&token, SECRET).is_none());
        assert!(extract_claims_from_header(&format!("Basic {}", token), SECRET).is_none());
    }

    #[test]
    fn test_is_owner() {
        assert!(is_owner(&claims()));
        let staff = AuthClaims::new(1, 1, "staff", 3600);
        assert!(!is_owner(&staff));
    }
}
