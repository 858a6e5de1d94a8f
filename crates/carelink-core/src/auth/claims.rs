//! Minimal JWT payload inspection.
//!
//! Signatures are not verified; the server remains the authority. This only
//! reads the `exp` claim so the UI can show how long a session has left.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Expiry time encoded in a JWT, or `None` for opaque tokens.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp?, 0)
}

/// Minutes left before expiry (for display), clamped at zero.
pub fn minutes_until_expiry(token: &str, now: DateTime<Utc>) -> Option<i64> {
    expires_at(token).map(|exp| (exp - now).num_minutes().max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn jwt_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_expires_at() {
        let token = jwt_with_payload(r#"{"id":7,"role":"patient","exp":1717250000}"#);
        let exp = expires_at(&token).unwrap();
        assert_eq!(exp.timestamp(), 1717250000);
    }

    #[test]
    fn test_opaque_and_malformed_tokens() {
        assert!(expires_at("opaque-token").is_none());
        assert!(expires_at("a.!!!.c").is_none());
        assert!(expires_at(&jwt_with_payload(r#"{"id":7}"#)).is_none());
    }

    #[test]
    fn test_minutes_until_expiry_clamps() {
        let token = jwt_with_payload(r#"{"exp":1000}"#);
        let now = DateTime::from_timestamp(1000 + 600, 0).unwrap();
        assert_eq!(minutes_until_expiry(&token, now), Some(0));

        let earlier = DateTime::from_timestamp(1000 - 600, 0).unwrap();
        assert_eq!(minutes_until_expiry(&token, earlier), Some(10));
    }
}
