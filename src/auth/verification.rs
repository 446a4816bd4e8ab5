/// Email verification codes
///
/// A six-digit code is mailed at registration. Only its SHA-256 hash, an
/// expiry and a count of failed attempts are kept (as user meta). An account
/// with a pending code needs verification; confirming the code removes it.
/// After `MAX_CODE_ATTEMPTS` misses the code is dead until a new one is sent.

use std::sync::Arc;

use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::store::{CredentialStore, UserRecord};

pub const VERIFICATION_CODE_META: &str = "verification_code";
pub const VERIFICATION_EXPIRES_META: &str = "verification_code_expires";
pub const VERIFICATION_ATTEMPTS_META: &str = "verification_code_attempts";

pub const MAX_CODE_ATTEMPTS: u32 = 5;

/// Codes are valid for one day
pub const CODE_LIFETIME_SECONDS: i64 = 24 * 60 * 60;

pub fn generate_verification_code() -> String {
    format!("{:06}", thread_rng().gen_range(0..1_000_000))
}

/// Hex SHA-256 of a one-time secret as kept in user meta
pub(crate) fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Subject and HTML body of the verification mail
pub fn verification_email(code: &str) -> (String, String) {
    let subject = "Verify your email address".to_string();
    let body = format!(
        "Hello,<br><br>Your verification code is: <strong>{}</strong><br>\
         This code will expire in 24 hours.<br><br>\
         If you did not create an account, please ignore this email.",
        code
    );
    (subject, body)
}

/// Meta entries that make `code` the pending code, with a fresh attempt count
pub fn pending_code_meta(code: &str, now: i64) -> Vec<(String, String)> {
    vec![
        (VERIFICATION_CODE_META.to_string(), hash_code(code)),
        (
            VERIFICATION_EXPIRES_META.to_string(),
            (now + CODE_LIFETIME_SECONDS).to_string(),
        ),
        (VERIFICATION_ATTEMPTS_META.to_string(), "0".to_string()),
    ]
}

/// Record `code` as the pending verification code of `user_id`
pub async fn store_verification_code(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    code: &str,
    now: i64,
) -> Result<(), AppError> {
    for (key, value) in pending_code_meta(code, now) {
        store.set_user_meta(user_id, &key, &value).await?;
    }

    Ok(())
}

/// True while the account has an unconfirmed verification code
pub async fn needs_verification(
    store: &Arc<dyn CredentialStore>,
    user: &UserRecord,
) -> Result<bool, AppError> {
    let pending = store.get_user_meta(user.id, VERIFICATION_CODE_META).await?;
    Ok(pending.map_or(false, |hash| !hash.is_empty()))
}

async fn meta_number<T: std::str::FromStr>(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    key: &str,
) -> Result<Option<T>, AppError> {
    Ok(store
        .get_user_meta(user_id, key)
        .await?
        .and_then(|value| value.parse::<T>().ok()))
}

/// Check `code` against the pending one and clear it on a match.
///
/// Returns `false` for a wrong, expired, absent or locked-out code. Every
/// miss counts towards `MAX_CODE_ATTEMPTS`.
pub async fn confirm_code(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    code: &str,
    now: i64,
) -> Result<bool, AppError> {
    let stored_hash = match store.get_user_meta(user_id, VERIFICATION_CODE_META).await? {
        Some(hash) if !hash.is_empty() => hash,
        _ => return Ok(false),
    };

    let attempts: u32 = meta_number(store, user_id, VERIFICATION_ATTEMPTS_META)
        .await?
        .unwrap_or(0);
    if attempts >= MAX_CODE_ATTEMPTS {
        tracing::warn!(user_id = user_id, "Verification code locked after too many attempts");
        return Ok(false);
    }

    let expires_at: i64 = meta_number(store, user_id, VERIFICATION_EXPIRES_META)
        .await?
        .unwrap_or(0);

    if expires_at < now {
        tracing::info!(user_id = user_id, "Verification code expired");
        return Ok(false);
    }

    if stored_hash != hash_code(code) {
        store
            .set_user_meta(
                user_id,
                VERIFICATION_ATTEMPTS_META,
                &(attempts + 1).to_string(),
            )
            .await?;
        return Ok(false);
    }

    for key in [
        VERIFICATION_CODE_META,
        VERIFICATION_EXPIRES_META,
        VERIFICATION_ATTEMPTS_META,
    ] {
        store.delete_user_meta(user_id, key).await?;
    }

    Ok(true)
}
