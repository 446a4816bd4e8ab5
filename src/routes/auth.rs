/// Authentication Routes
///
/// Thin adapters between HTTP and the session flows: login, registration,
/// token verification and refresh, email confirmation, password reset.

use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::gate::token_from_request;
use crate::auth::session::{
    ConfirmEmailRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResendVerificationRequest, ResetPasswordRequest, TokenRequest,
};
use crate::auth::SessionService;
use crate::error::{AppError, ContextualError, ErrorContext};

/// Header or query token first, then the `token` field of a JSON body
fn request_token(req: &HttpRequest, body: Option<web::Json<TokenRequest>>) -> Option<String> {
    token_from_request(req).or_else(|| {
        body.and_then(|body| body.into_inner().token)
            .filter(|token| !token.is_empty())
    })
}

/// POST /auth/login
///
/// Exchange email and password for a token.
///
/// # Errors
/// - 400: Email or password missing
/// - 401: Invalid credentials (email not found or wrong password)
/// - 403: Email not verified yet
///
/// # Security Notes
/// - Uses same error message for "not found" and "wrong password"
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let response = sessions.login(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /auth/register
///
/// Create an account and mail a verification code. No token is returned;
/// the user logs in after confirming the email.
///
/// # Errors
/// - 400: Missing fields, invalid email, email taken, weak password
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, ContextualError> {
    let context = ErrorContext::new("user_registration");

    let response = match sessions.register(form.into_inner()).await {
        Ok(response) => response,
        Err(e) => return Err(context.attach(e)),
    };

    tracing::info!(
        request_id = %context.request_id,
        user_id = response.user.id,
        "Registration accepted"
    );

    Ok(HttpResponse::Created().json(response))
}

/// POST /auth/verify
///
/// Identity of the token bearer. The token may come from the
/// `Authorization` header, the `token` query parameter or the JSON body.
///
/// # Errors
/// - 401: Missing or invalid token
/// - 404: Account no longer exists
pub async fn verify(
    req: HttpRequest,
    body: Option<web::Json<TokenRequest>>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let token = request_token(&req, body);
    let response = sessions.verify(token.as_deref()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /auth/refresh
///
/// Issue a new token for the bearer of a still-valid one. Expired tokens
/// cannot be refreshed.
///
/// # Errors
/// - 401: Missing or invalid token
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<TokenRequest>>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let token = request_token(&req, body);
    let response = sessions.refresh(token.as_deref()).await?;

    tracing::info!(request_id = %context.request_id, "Token refreshed successfully");

    Ok(HttpResponse::Ok().json(response))
}

/// POST /auth/confirm-email
///
/// # Errors
/// - 400: Missing fields, or a wrong/expired code
pub async fn confirm_email(
    form: web::Json<ConfirmEmailRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let response = sessions.confirm_email(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /auth/resend-verification
pub async fn resend_verification(
    form: web::Json<ResendVerificationRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let response = sessions.resend_verification(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/forgot-password
///
/// Mails a reset link when the email belongs to an account. The response is
/// the same either way.
///
/// # Errors
/// - 400: Email missing or malformed
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let response = sessions.forgot_password(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/reset-password
///
/// # Errors
/// - 400: Missing fields, mismatch, weak password, or a bad/expired key
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, ContextualError> {
    let context = ErrorContext::new("password_reset");

    let response = sessions
        .reset_password(form.into_inner())
        .await
        .map_err(|e| context.attach(e))?;
    Ok(HttpResponse::Ok().json(response))
}
