/// Account Routes
///
/// **Every handler here requires a valid token**; the Auth Gate middleware
/// injects the `AuthenticatedSubject` before the handler runs.

use actix_web::{web, HttpResponse};

use crate::account::{
    AccountService, ChangePasswordRequest, DeleteAccountRequest, UpdateProfileRequest,
    UpdateSettingsRequest,
};
use crate::auth::AuthenticatedSubject;
use crate::error::{AppError, ContextualError, ErrorContext};

/// GET /account/profile
pub async fn profile(
    subject: web::ReqData<AuthenticatedSubject>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let response = accounts.profile(subject.user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/update-profile
///
/// # Errors
/// - 400: Invalid name/email/phone, or email used by another account
pub async fn update_profile(
    subject: web::ReqData<AuthenticatedSubject>,
    form: web::Json<UpdateProfileRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let response = accounts
        .update_profile(subject.user_id, form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/change-password
///
/// # Errors
/// - 400: Missing fields, mismatch, weak new password
/// - 401: Current password is wrong
pub async fn change_password(
    subject: web::ReqData<AuthenticatedSubject>,
    form: web::Json<ChangePasswordRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, ContextualError> {
    let context = ErrorContext::new("change_password").with_user_id(subject.user_id);

    let response = accounts
        .change_password(subject.user_id, form.into_inner())
        .await
        .map_err(|e| context.attach(e))?;
    Ok(HttpResponse::Ok().json(response))
}

/// GET /account/settings
pub async fn settings(
    subject: web::ReqData<AuthenticatedSubject>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let response = accounts.settings(subject.user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/settings
pub async fn update_settings(
    subject: web::ReqData<AuthenticatedSubject>,
    form: web::Json<UpdateSettingsRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let response = accounts
        .update_settings(subject.user_id, form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /account/delete
///
/// # Errors
/// - 400: Password missing
/// - 401: Password is wrong
pub async fn delete_account(
    subject: web::ReqData<AuthenticatedSubject>,
    form: web::Json<DeleteAccountRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, ContextualError> {
    let context = ErrorContext::new("delete_account").with_user_id(subject.user_id);

    let response = accounts
        .delete_account(subject.user_id, form.into_inner())
        .await
        .map_err(|e| context.attach(e))?;
    Ok(HttpResponse::Ok().json(response))
}
