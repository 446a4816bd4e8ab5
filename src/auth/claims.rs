/// Token payload
///
/// Field names and order match the wire format of tokens already in
/// circulation: `{"iss":..,"iat":..,"exp":..,"user_id":..}`.

use serde::{Deserialize, Serialize};

/// Claims carried by every session token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Issuer (site URL)
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Subject
    pub user_id: i64,
}

impl Claims {
    /// Create claims valid from `issued_at` for `lifetime_seconds`
    pub fn new(user_id: i64, issuer: String, issued_at: i64, lifetime_seconds: i64) -> Self {
        Self {
            iss: issuer,
            iat: issued_at,
            exp: issued_at + lifetime_seconds,
            user_id,
        }
    }
}

/// Payloads that carry an expiry the codec must enforce
pub trait Expiring {
    fn expires_at(&self) -> i64;

    /// Expired once the expiry lies strictly in the past
    fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at() < now
    }
}

impl Expiring for Claims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Identity of the token bearer for the duration of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthenticatedSubject {
    pub user_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_creation() {
        let claims = Claims::new(7, "https://example.com".to_string(), 1_000, 3_600);

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.iss, "https://example.com");
        assert_eq!(claims.iat, 1_000);
        assert_eq!(claims.exp, 4_600);
    }

    #[test]
    fn test_expiry_is_strict() {
        let claims = Claims::new(1, "iss".to_string(), 0, 100);

        assert!(!claims.is_expired_at(99));
        assert!(!claims.is_expired_at(100));
        assert!(claims.is_expired_at(101));
    }

    #[test]
    fn test_wire_field_order() {
        let claims = Claims::new(5, "https://example.com".to_string(), 10, 20);
        let json = serde_json::to_string(&claims).unwrap();

        assert_eq!(
            json,
            r#"{"iss":"https://example.com","iat":10,"exp":30,"user_id":5}"#
        );
    }
}
