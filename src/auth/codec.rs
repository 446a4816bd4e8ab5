/// Token Codec
///
/// Compact three-part signed tokens:
/// `base64url(json(header)) . base64url(json(payload)) . base64url(hmac_sha256)`
/// with URL-safe base64 and no padding. Encoding goes through `jsonwebtoken`;
/// decoding is done by hand so each failure keeps its own kind and expiry is
/// judged against the injected clock.

use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;

use crate::auth::claims::Expiring;
use crate::auth::clock::Clock;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Why a token was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not exactly three dot-separated segments, or an unreadable payload
    Malformed,
    /// Recomputed signature does not match the third segment
    InvalidSignature,
    /// Payload `exp` lies in the past
    Expired,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "malformed token"),
            TokenError::InvalidSignature => write!(f, "signature mismatch"),
            TokenError::Expired => write!(f, "token expired"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Header every issued token carries: `{"typ":"JWT","alg":"HS256"}`
pub fn default_header() -> Header {
    Header::new(Algorithm::HS256)
}

/// Signs and verifies tokens with one process-wide secret
#[derive(Clone)]
pub struct TokenCodec {
    secret: Arc<[u8]>,
    encoding_key: EncodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(secret: &[u8], clock: Arc<dyn Clock>) -> Self {
        Self {
            secret: Arc::from(secret),
            encoding_key: EncodingKey::from_secret(secret),
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Serialize and sign `claims` under `header`.
    ///
    /// Deterministic: the same header, claims and secret always give the
    /// same token.
    ///
    /// # Errors
    /// Returns error if the claims cannot be serialized
    pub fn encode<T: Serialize>(&self, header: &Header, claims: &T) -> Result<String, AppError> {
        encode(header, claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify `token` and return its payload.
    ///
    /// Checks, in order: segment count, signature, payload readability,
    /// expiry (`exp < now` is expired; `exp == now` is still valid).
    pub fn decode<T>(&self, token: &str) -> Result<T, TokenError>
    where
        T: DeserializeOwned + Expiring,
    {
        let parts: Vec<&str> = token.split('.').collect();
        let (header_b64, payload_b64, signature_b64) = match parts.as_slice() {
            [header, payload, signature] => (*header, *payload, *signature),
            _ => return Err(TokenError::Malformed),
        };

        self.verify_signature(header_b64, payload_b64, signature_b64)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: T =
            serde_json::from_slice(&payload_json).map_err(|_| TokenError::Malformed)?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    fn verify_signature(
        &self,
        header_b64: &str,
        payload_b64: &str,
        signature_b64: &str,
    ) -> Result<(), TokenError> {
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TokenError::InvalidSignature)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());

        // constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::Claims;
    use crate::auth::clock::ManualClock;

    const SECRET: &[u8] = b"test-secret-key-at-least-32-characters-long";
    const NOW: i64 = 1_700_000_000;

    fn codec_at(now: i64) -> TokenCodec {
        TokenCodec::new(SECRET, Arc::new(ManualClock::new(now)))
    }

    fn claims(exp: i64) -> Claims {
        Claims {
            iss: "https://example.com".to_string(),
            iat: NOW,
            exp,
            user_id: 42,
        }
    }

    /// Independent rendition of the wire format for cross-checking
    fn sign_by_hand(header_json: &str, payload_json: &str, secret: &[u8]) -> String {
        let header = URL_SAFE_NO_PAD.encode(header_json);
        let payload = URL_SAFE_NO_PAD.encode(payload_json);
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(format!("{}.{}", header, payload).as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{}.{}.{}", header, payload, signature)
    }

    #[test]
    fn test_round_trip() {
        let codec = codec_at(NOW);
        let original = claims(NOW + 3_600);

        let token = codec.encode(&default_header(), &original).unwrap();
        let decoded: Claims = codec.decode(&token).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encoding_is_deterministic_and_matches_wire_format() {
        let codec = codec_at(NOW);
        let payload = claims(NOW + 60);

        let first = codec.encode(&default_header(), &payload).unwrap();
        let second = codec.encode(&default_header(), &payload).unwrap();
        assert_eq!(first, second);

        let expected = sign_by_hand(
            r#"{"typ":"JWT","alg":"HS256"}"#,
            &serde_json::to_string(&payload).unwrap(),
            SECRET,
        );
        assert_eq!(first, expected);
    }

    #[test]
    fn test_accepts_legacy_tokens_with_escaped_slashes() {
        let token = sign_by_hand(
            r#"{"typ":"JWT","alg":"HS256"}"#,
            &format!(
                r#"{{"iss":"https:\/\/example.com","iat":{},"exp":{},"user_id":9}}"#,
                NOW,
                NOW + 100
            ),
            SECRET,
        );

        let decoded: Claims = codec_at(NOW).decode(&token).unwrap();
        assert_eq!(decoded.iss, "https://example.com");
        assert_eq!(decoded.user_id, 9);
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec_at(NOW);
        let token = codec.encode(&default_header(), &claims(NOW + 60)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let mut forged = claims(NOW + 60);
        forged.user_id = 1;
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert_eq!(
            codec.decode::<Claims>(&tampered),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_every_altered_character_is_rejected() {
        let codec = codec_at(NOW);
        let token = codec.encode(&default_header(), &claims(NOW + 60)).unwrap();
        let signed_len = token.rfind('.').unwrap();

        for (i, c) in token.char_indices().take(signed_len) {
            if c == '.' {
                continue;
            }
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());

            assert_eq!(
                codec.decode::<Claims>(&tampered),
                Err(TokenError::InvalidSignature),
                "altering byte {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let codec = codec_at(NOW);
        let token = codec.encode(&default_header(), &claims(NOW + 60)).unwrap();

        let tampered = format!("{}X", token);
        assert_eq!(
            codec.decode::<Claims>(&tampered),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec_at(NOW);

        let expired = codec.encode(&default_header(), &claims(NOW - 1)).unwrap();
        assert_eq!(codec.decode::<Claims>(&expired), Err(TokenError::Expired));

        let alive = codec.encode(&default_header(), &claims(NOW + 1)).unwrap();
        assert!(codec.decode::<Claims>(&alive).is_ok());

        let edge = codec.encode(&default_header(), &claims(NOW)).unwrap();
        assert!(codec.decode::<Claims>(&edge).is_ok());
    }

    #[test]
    fn test_malformed_segment_counts() {
        let codec = codec_at(NOW);

        for input in ["", "abc", "abc.def", "a.b.c.d", "a.b.c.d.e", "...."] {
            assert_eq!(
                codec.decode::<Claims>(input),
                Err(TokenError::Malformed),
                "input {:?}",
                input
            );
        }
    }

    #[test]
    fn test_signed_garbage_payload_is_malformed() {
        let token = sign_by_hand(r#"{"typ":"JWT","alg":"HS256"}"#, "not json", SECRET);

        assert_eq!(
            codec_at(NOW).decode::<Claims>(&token),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = codec_at(NOW)
            .encode(&default_header(), &claims(NOW + 60))
            .unwrap();
        let other = TokenCodec::new(b"another-secret", Arc::new(ManualClock::new(NOW)));

        assert_eq!(
            other.decode::<Claims>(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_tokens_validate_with_standard_jwt_tooling() {
        use jsonwebtoken::{decode, DecodingKey, Validation};

        let now = chrono::Utc::now().timestamp();
        let codec = codec_at(now);
        let mut payload = claims(now + 3_600);
        payload.iat = now;
        let token = codec.encode(&default_header(), &payload).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["https://example.com"]);
        let data = decode::<Claims>(&token, &DecodingKey::from_secret(SECRET), &validation)
            .expect("standard decoder rejected token");

        assert_eq!(data.claims, payload);
    }
}
