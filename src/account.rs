/// Account operations
///
/// Everything here runs for an already authenticated subject; the Auth Gate
/// middleware guarantees the `user_id` passed in came from a valid token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::{hash_password, validate_password_strength, verify_password, MessageResponse};
use crate::error::{AppError, AuthError, ValidationError};
use crate::store::{normalize_email, CredentialStore, UserRecord, UserUpdate};
use crate::validators::{
    is_blank, is_valid_email, is_valid_name, is_valid_phone_number, sanitize_text,
};

pub const META_PHONE_NUMBER: &str = "phone_number";
pub const META_COMPANY: &str = "company";
pub const META_POSITION: &str = "position";
pub const META_GOVERNMENT: &str = "government";

/// Account settings and the value each takes when never set
const SETTINGS_DEFAULTS: [(&str, &str); 4] = [
    (SETTING_EMAIL_NOTIFICATIONS, "yes"),
    (SETTING_NEWSLETTER, "yes"),
    (SETTING_PRIVACY, "public"),
    (SETTING_TWO_FACTOR, "no"),
];

const SETTING_EMAIL_NOTIFICATIONS: &str = "email_notifications";
const SETTING_NEWSLETTER: &str = "newsletter";
const SETTING_PRIVACY: &str = "privacy";
const SETTING_TWO_FACTOR: &str = "two_factor";

fn setting_default(key: &str) -> &'static str {
    SETTINGS_DEFAULTS
        .iter()
        .find(|(name, _)| *name == key)
        .map_or("", |(_, default)| *default)
}

/// Gravatar URL for `email`
pub fn avatar_url(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{:x}?d=mp", hasher.finalize())
}

/// Profile fields kept as user meta
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProfileMeta {
    pub phone_number: String,
    pub company: String,
    pub position: String,
    pub government: String,
}

async fn meta_or(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
    key: &str,
    default: &str,
) -> Result<String, AppError> {
    Ok(store
        .get_user_meta(user_id, key)
        .await?
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string()))
}

pub async fn load_profile_meta(
    store: &Arc<dyn CredentialStore>,
    user_id: i64,
) -> Result<ProfileMeta, AppError> {
    Ok(ProfileMeta {
        phone_number: meta_or(store, user_id, META_PHONE_NUMBER, "").await?,
        company: meta_or(store, user_id, META_COMPANY, "").await?,
        position: meta_or(store, user_id, META_POSITION, "").await?,
        government: meta_or(store, user_id, META_GOVERNMENT, "").await?,
    })
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    #[serde(flatten)]
    pub meta: ProfileMeta,
    pub registered: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: Profile,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub government: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub email_notifications: Option<String>,
    pub newsletter: Option<String>,
    pub privacy: Option<String>,
    pub two_factor: Option<String>,
}

impl UpdateSettingsRequest {
    fn value_for(&self, key: &str) -> Option<&str> {
        match key {
            SETTING_EMAIL_NOTIFICATIONS => self.email_notifications.as_deref(),
            SETTING_NEWSLETTER => self.newsletter.as_deref(),
            SETTING_PRIVACY => self.privacy.as_deref(),
            SETTING_TWO_FACTOR => self.two_factor.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Settings {
    pub email_notifications: String,
    pub newsletter: String,
    pub privacy: String,
    pub two_factor: String,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: Settings,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    async fn user(&self, user_id: i64) -> Result<UserRecord, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(AuthError::UserNotFound))
    }

    pub async fn profile(&self, user_id: i64) -> Result<ProfileResponse, AppError> {
        let user = self.user(user_id).await?;
        let meta = load_profile_meta(&self.store, user.id).await?;

        Ok(ProfileResponse {
            success: true,
            user: Profile {
                id: user.id,
                avatar: avatar_url(&user.email),
                username: user.username,
                email: user.email,
                name: user.display_name,
                first_name: user.first_name,
                last_name: user.last_name,
                meta,
                registered: user.registered_at.to_rfc3339(),
            },
        })
    }

    /// Apply the supplied fields and return the refreshed profile
    pub async fn update_profile(
        &self,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> Result<ProfileResponse, AppError> {
        let user = self.user(user_id).await?;

        let mut update = UserUpdate::default();
        if let Some(first_name) = &request.first_name {
            update.first_name = Some(is_valid_name("first_name", first_name)?);
        }
        if let Some(last_name) = &request.last_name {
            update.last_name = Some(is_valid_name("last_name", last_name)?);
        }
        if let Some(email) = &request.email {
            let email = normalize_email(&is_valid_email(email)?);
            if email != user.email {
                if let Some(owner) = self.store.find_by_email(&email).await? {
                    if owner.id != user.id {
                        return Err(ValidationError::EmailExists.into());
                    }
                }
                update.email = Some(email);
            }
        }

        let phone_number = match &request.phone_number {
            Some(phone) => Some(is_valid_phone_number(phone)?),
            None => None,
        };

        if !update.is_empty() {
            self.store.update_user(user.id, &update).await?;
        }
        if let Some(phone_number) = phone_number {
            self.store
                .set_user_meta(user.id, META_PHONE_NUMBER, &phone_number)
                .await?;
        }
        for (key, value) in [
            (META_COMPANY, &request.company),
            (META_POSITION, &request.position),
            (META_GOVERNMENT, &request.government),
        ] {
            if let Some(value) = value {
                self.store
                    .set_user_meta(user.id, key, &sanitize_text(value))
                    .await?;
            }
        }

        tracing::info!(user_id = user.id, "Profile updated");
        self.profile(user.id).await
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        request: ChangePasswordRequest,
    ) -> Result<MessageResponse, AppError> {
        let (current, new, confirm) = match (
            request.current_password.as_deref(),
            request.new_password.as_deref(),
            request.confirm_password.as_deref(),
        ) {
            (Some(current), Some(new), Some(confirm))
                if !current.is_empty() && !new.is_empty() && !confirm.is_empty() =>
            {
                (current, new, confirm)
            }
            _ => {
                return Err(
                    ValidationError::MissingFields("All fields are required".to_string()).into(),
                )
            }
        };

        if new != confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        validate_password_strength(new)?;

        let user = self.user(user_id).await?;
        if !verify_password(current, &user.password_hash)? {
            return Err(AuthError::InvalidPassword.into());
        }

        let password_hash = hash_password(new)?;
        self.store.set_password_hash(user.id, &password_hash).await?;

        tracing::info!(user_id = user.id, "Password changed");
        Ok(MessageResponse::new("Password changed successfully"))
    }

    pub async fn settings(&self, user_id: i64) -> Result<SettingsResponse, AppError> {
        let user = self.user(user_id).await?;
        let read = |key: &'static str| meta_or(&self.store, user.id, key, setting_default(key));

        Ok(SettingsResponse {
            success: true,
            settings: Settings {
                email_notifications: read(SETTING_EMAIL_NOTIFICATIONS).await?,
                newsletter: read(SETTING_NEWSLETTER).await?,
                privacy: read(SETTING_PRIVACY).await?,
                two_factor: read(SETTING_TWO_FACTOR).await?,
            },
        })
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        request: UpdateSettingsRequest,
    ) -> Result<SettingsResponse, AppError> {
        let user = self.user(user_id).await?;

        for (key, _) in SETTINGS_DEFAULTS {
            if let Some(value) = request.value_for(key) {
                self.store
                    .set_user_meta(user.id, key, &sanitize_text(value))
                    .await?;
            }
        }

        self.settings(user.id).await
    }

    /// Delete the account after re-checking the password
    pub async fn delete_account(
        &self,
        user_id: i64,
        request: DeleteAccountRequest,
    ) -> Result<MessageResponse, AppError> {
        let password = request.password.as_deref();
        if is_blank(password) {
            return Err(ValidationError::MissingFields("Password is required".to_string()).into());
        }
        let password = password.unwrap_or_default();

        let user = self.user(user_id).await?;
        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidPassword.into());
        }

        if !self.store.delete_user(user.id).await? {
            return Err(AppError::Internal("Failed to delete account".to_string()));
        }

        tracing::info!(user_id = user.id, "Account deleted");
        Ok(MessageResponse::new("Account deleted successfully"))
    }
}
