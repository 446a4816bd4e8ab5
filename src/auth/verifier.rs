/// Token Verifier
///
/// Validates a token and resolves the subject it names.

use std::sync::Arc;

use crate::auth::claims::Claims;
use crate::auth::codec::{TokenCodec, TokenError};
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, UserRecord};

#[derive(Clone)]
pub struct TokenVerifier {
    codec: TokenCodec,
}

impl TokenVerifier {
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    /// Decode `token` and return its claims
    pub fn verify_claims(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.decode::<Claims>(token)
    }

    /// Subject id of a valid token
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        self.verify_claims(token).map(|claims| claims.user_id)
    }

    /// Look the subject up in the credential store
    ///
    /// # Errors
    /// `UserNotFound` if the account no longer exists; store failures pass
    /// through unchanged
    pub async fn resolve_subject(
        &self,
        store: &Arc<dyn CredentialStore>,
        user_id: i64,
    ) -> Result<UserRecord, AppError> {
        store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))
    }
}
