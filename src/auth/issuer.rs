/// Token Issuer
///
/// Mints session tokens for a subject.

use crate::auth::claims::Claims;
use crate::auth::codec::{default_header, TokenCodec};
use crate::error::AppError;

/// Every token lives for 30 days
pub const TOKEN_LIFETIME_SECONDS: i64 = 30 * 24 * 60 * 60;

#[derive(Clone)]
pub struct TokenIssuer {
    codec: TokenCodec,
    issuer: String,
}

/// A freshly minted token with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

impl TokenIssuer {
    /// # Arguments
    /// * `codec` - Codec holding the signing secret
    /// * `issuer` - Service identity written into `iss` (the site URL)
    pub fn new(codec: TokenCodec, issuer: String) -> Self {
        Self { codec, issuer }
    }

    /// Generate a new token for `user_id`, valid from now for 30 days
    ///
    /// # Errors
    /// Returns error if token generation fails
    pub fn issue(&self, user_id: i64) -> Result<IssuedToken, AppError> {
        let claims = Claims::new(
            user_id,
            self.issuer.clone(),
            self.codec.clock().now(),
            TOKEN_LIFETIME_SECONDS,
        );
        let token = self.codec.encode(&default_header(), &claims)?;

        Ok(IssuedToken { token, claims })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_issue_sets_thirty_day_window() {
        let codec = TokenCodec::new(b"secret", Arc::new(ManualClock::new(1_000)));
        let issuer = TokenIssuer::new(codec.clone(), "https://example.com".to_string());

        let issued = issuer.issue(12).expect("Failed to issue token");

        assert_eq!(issued.claims.iat, 1_000);
        assert_eq!(issued.claims.exp, 1_000 + 2_592_000);
        assert_eq!(issued.claims.iss, "https://example.com");

        let decoded: Claims = codec.decode(&issued.token).expect("Failed to decode token");
        assert_eq!(decoded.user_id, 12);
    }
}
