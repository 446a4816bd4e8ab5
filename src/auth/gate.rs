/// Auth Gate
///
/// Pulls a token out of an inbound request and decides whether the request
/// may proceed. The header wins over the `token` parameter.

use std::collections::HashMap;

use actix_web::{web, HttpRequest};
use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::claims::AuthenticatedSubject;
use crate::auth::verifier::TokenVerifier;
use crate::error::AuthError;

lazy_static! {
    static ref BEARER_REGEX: Regex = Regex::new(r"Bearer\s(\S+)").unwrap();
}

pub const TOKEN_PARAM: &str = "token";

/// First non-empty token from a `Bearer` authorization value, else from the
/// `token` parameter
pub fn extract_token(authorization: Option<&str>, token_param: Option<&str>) -> Option<String> {
    let from_header = authorization
        .and_then(|value| BEARER_REGEX.captures(value))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string());

    from_header.or_else(|| {
        token_param
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// Token from the `Authorization` header or the `token` query parameter
pub fn token_from_request(req: &HttpRequest) -> Option<String> {
    let authorization = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let query = web::Query::<HashMap<String, String>>::from_query(req.query_string()).ok();
    let token_param = query
        .as_ref()
        .and_then(|q| q.get(TOKEN_PARAM))
        .map(String::as_str);

    extract_token(authorization, token_param)
}

#[derive(Clone)]
pub struct AuthGate {
    verifier: TokenVerifier,
}

impl AuthGate {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Verify an already extracted token
    pub fn authenticate_token(
        &self,
        token: Option<&str>,
    ) -> Result<AuthenticatedSubject, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;

        match self.verifier.verify(token) {
            Ok(user_id) => Ok(AuthenticatedSubject { user_id }),
            Err(kind) => {
                tracing::warn!(reason = %kind, "Token rejected");
                Err(AuthError::InvalidToken(kind))
            }
        }
    }

    pub fn authenticate(&self, req: &HttpRequest) -> Result<AuthenticatedSubject, AuthError> {
        let token = token_from_request(req);
        self.authenticate_token(token.as_deref())
    }

    /// Gating predicate for protected endpoints
    pub fn is_authorized(&self, req: &HttpRequest) -> bool {
        self.authenticate(req).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::codec::{TokenCodec, TokenError};
    use crate::auth::issuer::TokenIssuer;
    use actix_web::test::TestRequest;
    use std::sync::Arc;

    fn gate_and_issuer() -> (AuthGate, TokenIssuer) {
        let codec = TokenCodec::new(b"gate-secret", Arc::new(ManualClock::new(10_000)));
        let issuer = TokenIssuer::new(codec.clone(), "https://example.com".to_string());
        (AuthGate::new(TokenVerifier::new(codec)), issuer)
    }

    #[test]
    fn test_extract_from_bearer_header() {
        assert_eq!(
            extract_token(Some("Bearer abc.def.ghi"), None),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn test_extract_falls_back_to_parameter() {
        assert_eq!(extract_token(None, Some("xyz")), Some("xyz".to_string()));
        assert_eq!(
            extract_token(Some("Basic dXNlcjpwYXNz"), Some("xyz")),
            Some("xyz".to_string())
        );
    }

    #[test]
    fn test_header_wins_over_parameter() {
        assert_eq!(
            extract_token(Some("Bearer from-header"), Some("from-param")),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn test_extract_none_when_absent_or_empty() {
        assert_eq!(extract_token(None, None), None);
        assert_eq!(extract_token(Some(""), Some("")), None);
        assert_eq!(extract_token(Some("Bearer "), None), None);
    }

    #[test]
    fn test_bearer_is_case_sensitive() {
        assert_eq!(extract_token(Some("bearer abc"), None), None);
    }

    #[test]
    fn test_token_from_request_header_and_query() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(token_from_request(&req), Some("abc.def.ghi".to_string()));

        let req = TestRequest::with_uri("/account/profile?token=xyz").to_http_request();
        assert_eq!(token_from_request(&req), Some("xyz".to_string()));

        let req = TestRequest::with_uri("/account/profile").to_http_request();
        assert_eq!(token_from_request(&req), None);
    }

    #[test]
    fn test_authenticate() {
        let (gate, issuer) = gate_and_issuer();
        let issued = issuer.issue(31).unwrap();

        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", issued.token)))
            .to_http_request();
        assert_eq!(
            gate.authenticate(&req),
            Ok(AuthenticatedSubject { user_id: 31 })
        );
        assert!(gate.is_authorized(&req));
    }

    #[test]
    fn test_authenticate_failures() {
        let (gate, _) = gate_and_issuer();

        let req = TestRequest::default().to_http_request();
        assert_eq!(gate.authenticate(&req), Err(AuthError::MissingToken));
        assert!(!gate.is_authorized(&req));

        let req = TestRequest::with_uri("/?token=not-a-token").to_http_request();
        assert_eq!(
            gate.authenticate(&req),
            Err(AuthError::InvalidToken(TokenError::Malformed))
        );
        assert!(!gate.is_authorized(&req));
    }
}
