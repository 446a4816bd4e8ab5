/// Password reset keys
///
/// A forgotten password is replaced through a mailed link carrying a random
/// key and the account login (username). Only the key's SHA-256 hash and an
/// expiry are kept as user meta; a successful reset consumes the key.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::Url;

use crate::auth::verification::hash_code;
use crate::error::AppError;
use crate::store::CredentialStore;

pub const RESET_KEY_META: &str = "password_reset_key";
pub const RESET_EXPIRES_META: &str = "password_reset_expires";

/// Reset links are valid for one day
pub const RESET_KEY_LIFETIME_SECONDS: i64 = 24 * 60 * 60;

const RESET_KEY_LENGTH: usize = 20;

pub fn generate_reset_key() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// `base` with `key` and `login` appended as query parameters
pub fn reset_link(base: &Url, key: &str, login: &str) -> String {
    let mut link = base.clone();
    link.query_pairs_mut()
        .append_pair("key", key)
        .append_pair("login", login);
    link.to_string()
}

/// Subject and HTML body of the reset mail
pub fn password_reset_email(display_name: &str, link: &str) -> (String, String) {
    let subject = "Password Reset Request".to_string();
    let body = format!(
        "Hello {},<br><br>\
         You have requested to reset your password. Click the link below to set a new password:<br>\
         {}<br>\
         This link will expire in 24 hours.<br><br>\
         If you did not request this, please ignore this email.",
        display_name, link
    );
    (subject, body)
}

/// Record `key` as the outstanding reset key of `user_id`, replacing any
/// earlier one
pub async fn store_reset_key(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    key: &str,
    now: i64,
) -> Result<(), AppError> {
    let expires_at = (now + RESET_KEY_LIFETIME_SECONDS).to_string();

    store
        .set_user_meta(user_id, RESET_KEY_META, &hash_code(key))
        .await?;
    store
        .set_user_meta(user_id, RESET_EXPIRES_META, &expires_at)
        .await?;

    Ok(())
}

/// True when `key` is the outstanding, unexpired reset key of `user_id`
pub async fn check_reset_key(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    key: &str,
    now: i64,
) -> Result<bool, AppError> {
    let stored_hash = match store.get_user_meta(user_id, RESET_KEY_META).await? {
        Some(hash) if !hash.is_empty() => hash,
        _ => return Ok(false),
    };

    let expires_at = store
        .get_user_meta(user_id, RESET_EXPIRES_META)
        .await?
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(0);

    Ok(expires_at >= now && stored_hash == hash_code(key))
}

pub async fn clear_reset_key(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
) -> Result<(), AppError> {
    store.delete_user_meta(user_id, RESET_KEY_META).await?;
    store.delete_user_meta(user_id, RESET_EXPIRES_META).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryCredentialStore, NewUser};

    async fn store_with_user() -> (Arc<dyn CredentialStore>, i64) {
        let store: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
        let id = store
            .create_user(&NewUser {
                username: "katherine".to_string(),
                email: "katherine@example.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Katherine".to_string(),
                last_name: "Johnson".to_string(),
                meta: Vec::new(),
            })
            .await
            .unwrap();
        (store, id)
    }

    #[test]
    fn test_generate_reset_key() {
        let key = generate_reset_key();

        assert_eq!(key.len(), RESET_KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_reset_key());
    }

    #[test]
    fn test_reset_link_encodes_parameters() {
        let base = Url::parse("https://app.example.com/my-account/reset-password/").unwrap();

        assert_eq!(
            reset_link(&base, "abc123", "jean luc"),
            "https://app.example.com/my-account/reset-password/?key=abc123&login=jean+luc"
        );
    }

    #[tokio::test]
    async fn test_key_check_and_clear() {
        let (store, id) = store_with_user().await;
        assert!(!check_reset_key(&store, id, "anything", 1_000).await.unwrap());

        store_reset_key(&store, id, "KEY123", 1_000).await.unwrap();
        assert!(!check_reset_key(&store, id, "KEY124", 1_000).await.unwrap());
        assert!(check_reset_key(&store, id, "KEY123", 1_000).await.unwrap());

        clear_reset_key(&store, id).await.unwrap();
        assert!(!check_reset_key(&store, id, "KEY123", 1_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_key_is_rejected() {
        let (store, id) = store_with_user().await;
        store_reset_key(&store, id, "KEY123", 1_000).await.unwrap();

        let deadline = 1_000 + RESET_KEY_LIFETIME_SECONDS;
        assert!(check_reset_key(&store, id, "KEY123", deadline).await.unwrap());
        assert!(!check_reset_key(&store, id, "KEY123", deadline + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_new_key_replaces_old_one() {
        let (store, id) = store_with_user().await;
        store_reset_key(&store, id, "FIRST", 1_000).await.unwrap();
        store_reset_key(&store, id, "SECOND", 1_000).await.unwrap();

        assert!(!check_reset_key(&store, id, "FIRST", 1_000).await.unwrap());
        assert!(check_reset_key(&store, id, "SECOND", 1_000).await.unwrap());
    }
}
