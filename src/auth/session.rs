/// Session flows
///
/// Login, registration, token refresh and identity checks, plus the email
/// confirmation steps that sit between registering and the first login and
/// the forgotten-password reset.

use std::sync::Arc;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::account::{
    avatar_url, load_profile_meta, META_COMPANY, META_GOVERNMENT, META_PHONE_NUMBER,
    META_POSITION,
};
use crate::auth::clock::Clock;
use crate::auth::codec::TokenCodec;
use crate::auth::gate::AuthGate;
use crate::auth::issuer::{IssuedToken, TokenIssuer, TOKEN_LIFETIME_SECONDS};
use crate::auth::password::{
    burn_verification_time, hash_password, validate_password_strength, verify_password,
};
use crate::auth::recovery::{
    check_reset_key, clear_reset_key, generate_reset_key, password_reset_email, reset_link,
    store_reset_key,
};
use crate::auth::verification::{
    confirm_code, generate_verification_code, needs_verification, pending_code_meta,
    store_verification_code, verification_email,
};
use crate::auth::verifier::TokenVerifier;
use crate::email_client::Notifier;
use crate::error::{AppError, AuthError, ValidationError};
use crate::store::{normalize_email, CredentialStore, NewUser, UserRecord};
use crate::validators::{
    is_blank, is_valid_email, is_valid_name, is_valid_phone_number, sanitize_text,
};

pub const TOKEN_TYPE: &str = "Bearer";

const RESEND_MESSAGE: &str =
    "If an account with that email needs verification, a new code has been sent.";

const RESET_REQUESTED_MESSAGE: &str =
    "If the email exists, a password reset link has been sent.";

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub government: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmEmailRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetPasswordRequest {
    pub key: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

/// `{success, message}` body shared by flows with nothing else to report
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
    pub government: String,
    pub company: String,
    pub position: String,
    pub phone_number: String,
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

impl From<IssuedToken> for RefreshResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            success: true,
            token: issued.token,
            token_type: TOKEN_TYPE,
            expires_in: TOKEN_LIFETIME_SECONDS,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingUser {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: String,
    pub needs_verification: bool,
    pub user: PendingUser,
}

#[derive(Debug, Serialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user: Identity,
}

/// Strips an email local part down to a username candidate
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '@' | '-'))
        .collect::<String>()
        .trim()
        .to_lowercase();

    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

fn required(value: &Option<String>) -> bool {
    !is_blank(value.as_deref())
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    issuer: TokenIssuer,
    gate: AuthGate,
    reset_url: Arc<Url>,
}

impl SessionService {
    /// # Arguments
    /// * `secret` - Signing key shared by the issuer and the verifier
    /// * `issuer` - Service identity written into every token
    /// * `reset_url` - Page that password reset links open
    pub fn new(
        secret: &[u8],
        issuer: String,
        reset_url: Url,
        clock: Arc<dyn Clock>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let codec = TokenCodec::new(secret, clock.clone());

        Self {
            issuer: TokenIssuer::new(codec.clone(), issuer),
            gate: AuthGate::new(TokenVerifier::new(codec)),
            reset_url: Arc::new(reset_url),
            store,
            notifier,
            clock,
        }
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    /// Exchange email and password for a token.
    ///
    /// An unknown email and a wrong password fail identically.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        let (email, password) = match (request.email.as_deref(), request.password.as_deref()) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                (email, password)
            }
            _ => {
                return Err(ValidationError::MissingFields(
                    "Email and password are required".to_string(),
                )
                .into())
            }
        };

        let user = match self.store.find_by_email(&normalize_email(email)).await? {
            Some(user) => user,
            None => {
                burn_verification_time(password);
                tracing::warn!("Login failed");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let password_matches = verify_password(password, &user.password_hash).unwrap_or_else(|e| {
            tracing::error!(user_id = user.id, error = %e, "Stored password hash is unusable");
            false
        });
        if !password_matches {
            tracing::warn!("Login failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        if needs_verification(&self.store, &user).await? {
            return Err(AuthError::EmailNotVerified(user.email).into());
        }

        let issued = self.issuer.issue(user.id)?;
        let meta = load_profile_meta(&self.store, user.id).await?;

        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginResponse {
            success: true,
            token: issued.token,
            token_type: TOKEN_TYPE,
            expires_in: TOKEN_LIFETIME_SECONDS,
            user: LoginUser {
                id: user.id,
                avatar: avatar_url(&user.email),
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                is_verified: true,
                government: meta.government,
                company: meta.company,
                position: meta.position,
                phone_number: meta.phone_number,
            },
        })
    }

    /// Create an account pending email verification. No token is issued.
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, AppError> {
        let all_present = [
            &request.email,
            &request.password,
            &request.first_name,
            &request.last_name,
            &request.phone_number,
        ]
        .into_iter()
        .all(required);
        if !all_present {
            return Err(ValidationError::MissingFields("Fields are required".to_string()).into());
        }

        let email = normalize_email(&is_valid_email(request.email.as_deref().unwrap_or_default())?);
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(ValidationError::EmailExists.into());
        }

        let password = request.password.as_deref().unwrap_or_default();
        validate_password_strength(password)?;

        let first_name = is_valid_name("first_name", request.first_name.as_deref().unwrap_or_default())?;
        let last_name = is_valid_name("last_name", request.last_name.as_deref().unwrap_or_default())?;
        let phone_number = is_valid_phone_number(request.phone_number.as_deref().unwrap_or_default())?;

        // profile fields and the pending code go in with the user row, so
        // there is never an account without its verification code
        let code = generate_verification_code();
        let mut meta = vec![(META_PHONE_NUMBER.to_string(), phone_number)];
        for (key, value) in [
            (META_COMPANY, &request.company),
            (META_POSITION, &request.position),
            (META_GOVERNMENT, &request.government),
        ] {
            let value = value.as_deref().map(sanitize_text).unwrap_or_default();
            meta.push((key.to_string(), value));
        }
        meta.extend(pending_code_meta(&code, self.clock.now()));

        let new_user = NewUser {
            username: self.unique_username(&email).await?,
            email,
            password_hash: hash_password(password)?,
            first_name,
            last_name,
            meta,
        };
        let user_id = self.store.create_user(&new_user).await?;

        self.mail_verification_code(user_id, &new_user.email, &code).await;

        tracing::info!(user_id = user_id, "User registered");

        Ok(RegisterResponse {
            success: true,
            message: "Registration successful. Please check your email for the verification code."
                .to_string(),
            needs_verification: true,
            user: PendingUser {
                id: user_id,
                email: new_user.email,
                first_name: new_user.first_name,
                last_name: new_user.last_name,
                is_verified: false,
            },
        })
    }

    /// Swap a still-valid token for a fresh one with a new 30-day window
    pub async fn refresh(&self, token: Option<&str>) -> Result<RefreshResponse, AppError> {
        let subject = self.gate.authenticate_token(token)?;
        let user = self
            .gate
            .verifier()
            .resolve_subject(&self.store, subject.user_id)
            .await?;

        let issued = self.issuer.issue(user.id)?;
        tracing::info!(user_id = user.id, "Token refreshed");

        Ok(issued.into())
    }

    /// Identity of the token bearer
    pub async fn verify(&self, token: Option<&str>) -> Result<VerifyResponse, AppError> {
        let subject = self.gate.authenticate_token(token)?;
        let user = self
            .gate
            .verifier()
            .resolve_subject(&self.store, subject.user_id)
            .await?;

        Ok(VerifyResponse {
            success: true,
            user: identity(&user),
        })
    }

    pub async fn confirm_email(
        &self,
        request: ConfirmEmailRequest,
    ) -> Result<MessageResponse, AppError> {
        if !required(&request.email) || !required(&request.code) {
            return Err(ValidationError::MissingFields(
                "Email and verification code are required".to_string(),
            )
            .into());
        }
        let email = normalize_email(request.email.as_deref().unwrap_or_default());
        let code = request.code.as_deref().unwrap_or_default();

        let user = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(ValidationError::InvalidCode)?;

        if !confirm_code(&self.store, user.id, code, self.clock.now()).await? {
            return Err(ValidationError::InvalidCode.into());
        }

        tracing::info!(user_id = user.id, "Email verified");
        Ok(MessageResponse::new(
            "Email verified successfully. You can now log in.",
        ))
    }

    /// Mail a fresh code to a pending account. The answer never reveals
    /// whether the account exists.
    pub async fn resend_verification(
        &self,
        request: ResendVerificationRequest,
    ) -> Result<MessageResponse, AppError> {
        if !required(&request.email) {
            return Err(ValidationError::MissingFields("Email is required".to_string()).into());
        }
        let email = normalize_email(request.email.as_deref().unwrap_or_default());

        if let Some(user) = self.store.find_by_email(&email).await? {
            if needs_verification(&self.store, &user).await? {
                self.send_verification_code(user.id, &user.email).await?;
            }
        }

        Ok(MessageResponse::new(RESEND_MESSAGE))
    }

    /// Mail a password reset link. The answer never reveals whether the
    /// account exists.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
    ) -> Result<MessageResponse, AppError> {
        let email = normalize_email(&is_valid_email(request.email.as_deref().unwrap_or_default())?);

        if let Some(user) = self.store.find_by_email(&email).await? {
            let key = generate_reset_key();
            store_reset_key(&self.store, user.id, &key, self.clock.now()).await?;

            let link = reset_link(&self.reset_url, &key, &user.username);
            let (subject, body) = password_reset_email(&user.display_name, &link);
            if let Err(e) = self.notifier.send(&user.email, &subject, &body).await {
                tracing::error!(user_id = user.id, error = %e, "Failed to send password reset email");
            }

            tracing::info!(user_id = user.id, "Password reset requested");
        }

        Ok(MessageResponse::new(RESET_REQUESTED_MESSAGE))
    }

    /// Set a new password with the key from a reset link. The key is
    /// single-use.
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<MessageResponse, AppError> {
        if !required(&request.key) || !required(&request.login) || !required(&request.password) {
            return Err(ValidationError::MissingFields(
                "Key, login, and password are required".to_string(),
            )
            .into());
        }
        let key = request.key.as_deref().unwrap_or_default().trim();
        let login = request.login.as_deref().unwrap_or_default().trim();
        let password = request.password.as_deref().unwrap_or_default();

        if request.confirm_password.as_deref() != Some(password) {
            return Err(ValidationError::PasswordMismatch.into());
        }
        validate_password_strength(password)?;

        let user = match self.store.find_by_username(login).await? {
            Some(user) => user,
            None => return Err(ValidationError::InvalidResetKey.into()),
        };
        if !check_reset_key(&self.store, user.id, key, self.clock.now()).await? {
            tracing::warn!(user_id = user.id, "Password reset with a bad key");
            return Err(ValidationError::InvalidResetKey.into());
        }

        self.store
            .set_password_hash(user.id, &hash_password(password)?)
            .await?;
        clear_reset_key(&self.store, user.id).await?;

        tracing::info!(user_id = user.id, "Password reset");
        Ok(MessageResponse::new(
            "Password has been reset successfully. You can now log in with your new password.",
        ))
    }

    async fn unique_username(&self, email: &str) -> Result<String, AppError> {
        let base = username_base(email);
        let mut candidate = base.clone();
        let mut suffix = 1;

        while self.store.username_exists(&candidate).await? {
            candidate = format!("{}{}", base, suffix);
            suffix += 1;
        }

        Ok(candidate)
    }

    /// Store a new code and mail it
    async fn send_verification_code(&self, user_id: i64, email: &str) -> Result<(), AppError> {
        let code = generate_verification_code();
        store_verification_code(&self.store, user_id, &code, self.clock.now()).await?;
        self.mail_verification_code(user_id, email, &code).await;
        Ok(())
    }

    /// Delivery failures are logged only
    async fn mail_verification_code(&self, user_id: i64, email: &str, code: &str) {
        let (subject, body) = verification_email(code);
        if let Err(e) = self.notifier.send(email, &subject, &body).await {
            tracing::error!(user_id = user_id, error = %e, "Failed to send verification email");
        }
    }
}

/// Public identity fields of a stored user
pub fn identity(user: &UserRecord) -> Identity {
    Identity {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        name: user.display_name.clone(),
        avatar: avatar_url(&user.email),
    }
}
