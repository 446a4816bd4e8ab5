/// Error Handling Module
///
/// Unified error handling for the authentication service:
/// 1. Domain-specific error types (validation, auth, database, email, config)
/// 2. A central `AppError` used for control flow (`?` everywhere)
/// 3. Mapping to the JSON error envelope returned over HTTP
/// 4. Structured error logging with request context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::TokenError;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    /// One or more required fields were absent or blank
    MissingFields(String),
    /// Every password policy rule the candidate violated
    WeakPassword(Vec<String>),
    EmailExists,
    PasswordMismatch,
    /// Email verification code unknown, wrong or expired
    InvalidCode,
    /// Password reset key unknown, used or expired
    InvalidResetKey,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::MissingFields(msg) => write!(f, "{}", msg),
            ValidationError::WeakPassword(errors) => write!(f, "{}", errors.join(", ")),
            ValidationError::EmailExists => {
                write!(f, "An account with this email already exists")
            }
            ValidationError::PasswordMismatch => write!(f, "New passwords do not match"),
            ValidationError::InvalidCode => write!(f, "Invalid or expired verification code"),
            ValidationError::InvalidResetKey => write!(f, "Invalid or expired reset link"),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Email service errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
        }
    }
}

impl StdError for EmailError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Authentication and authorization errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    /// Token rejected by the codec; the kind is kept for logs only
    InvalidToken(TokenError),
    InvalidCredentials,
    /// Password re-confirmation failed for an already authenticated user
    InvalidPassword,
    EmailNotVerified(String),
    UserNotFound,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Authorization token is required"),
            AuthError::InvalidToken(kind) => write!(f, "Invalid token: {}", kind),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::InvalidPassword => write!(f, "Password is incorrect"),
            AuthError::EmailNotVerified(_) => {
                write!(f, "Please verify your email address before logging in")
            }
            AuthError::UserNotFound => write!(f, "User not found"),
        }
    }
}

impl StdError for AuthError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::InvalidToken(err)
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Email(EmailError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Email(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(AuthError::InvalidToken(err))
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("23505") => {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.message().to_string(),
                ))
            }
            sqlx::Error::Database(_) => {
                AppError::Database(DatabaseError::QueryExecution(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error envelope returned for every failed request
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Always `false`; mirrors the `success` flag of successful responses
    pub success: bool,
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error kind
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
    /// Extra, kind-specific data (policy violations, verification hints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            success: false,
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    /// Status, machine-readable code and client-facing message.
    ///
    /// Token failures collapse to one message so callers cannot tell which
    /// check rejected the token.
    fn classify(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(e) => {
                let code = match e {
                    ValidationError::MissingFields(_) => "MISSING_FIELDS",
                    ValidationError::WeakPassword(_) => "WEAK_PASSWORD",
                    ValidationError::EmailExists => "EMAIL_EXISTS",
                    ValidationError::PasswordMismatch => "PASSWORD_MISMATCH",
                    ValidationError::InvalidCode => "INVALID_CODE",
                    ValidationError::InvalidResetKey => "INVALID_KEY",
                    _ => "VALIDATION_ERROR",
                };
                (StatusCode::BAD_REQUEST, code, e.to_string())
            }

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_ENTRY",
                    "Duplicate entry".to_string(),
                ),
                DatabaseError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
                }
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Email(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "EMAIL_SERVICE_ERROR",
                "Email service temporarily unavailable".to_string(),
            ),

            AppError::Auth(e) => match e {
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Authorization token is required".to_string(),
                ),
                AuthError::InvalidToken(_) => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID",
                    "Invalid or expired token".to_string(),
                ),
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid email or password".to_string(),
                ),
                AuthError::InvalidPassword => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_PASSWORD",
                    "Password is incorrect".to_string(),
                ),
                AuthError::EmailNotVerified(_) => (
                    StatusCode::FORBIDDEN,
                    "EMAIL_NOT_VERIFIED",
                    e.to_string(),
                ),
                AuthError::UserNotFound => (
                    StatusCode::NOT_FOUND,
                    "USER_NOT_FOUND",
                    "User not found".to_string(),
                ),
            },

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }

    /// Machine-readable kind of this error, as sent in the `code` field
    pub fn code(&self) -> &'static str {
        self.classify().1
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation(ValidationError::WeakPassword(errors)) => {
                Some(serde_json::json!({ "errors": errors }))
            }
            AppError::Auth(AuthError::EmailNotVerified(email)) => Some(serde_json::json!({
                "needs_verification": true,
                "email": email,
            })),
            _ => None,
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = self.classify();

        let mut error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );
        if let Some(details) = self.details() {
            error_response = error_response.with_details(details);
        }

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        let (status, code, _) = self.classify();

        // token failures keep their specific kind in the log only
        let reason = match self {
            AppError::Auth(AuthError::InvalidToken(kind)) => Some(*kind),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(
                request_id = request_id,
                code = code,
                error = %self,
                "Request failed"
            );
        } else if let AppError::Auth(AuthError::InvalidCredentials) = self {
            // which check failed is not logged either
            tracing::warn!(request_id = request_id, code = code, "Invalid credentials attempt");
        } else {
            tracing::warn!(
                request_id = request_id,
                code = code,
                reason = ?reason,
                error = %self,
                "Request rejected"
            );
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Request-scoped context attached to structured log lines
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<i64>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Tie `error` to this request. The result is logged once, and the
    /// context's request id doubles as the envelope's `error_id`.
    pub fn attach(self, error: AppError) -> ContextualError {
        ContextualError {
            context: self,
            error,
        }
    }

    fn log_error(&self, error: &AppError) {
        if error.status_code().is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                code = error.code(),
                error = %error,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                operation = %self.operation,
                user_id = ?self.user_id,
                code = error.code(),
                error = %error,
                "Request rejected"
            );
        }
    }
}

/// An `AppError` carrying the `ErrorContext` of the request it ended
#[derive(Debug)]
pub struct ContextualError {
    pub context: ErrorContext,
    pub error: AppError,
}

impl fmt::Display for ContextualError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context.operation, self.error)
    }
}

impl ResponseError for ContextualError {
    fn error_response(&self) -> HttpResponse {
        self.context.log_error(&self.error);

        let (status, error_response) =
            ErrorHandler::error_response(&self.error, &self.context.request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.error.status_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_weak_password_lists_every_violation() {
        let err = ValidationError::WeakPassword(vec![
            "first rule".to_string(),
            "second rule".to_string(),
        ]);
        assert_eq!(err.to_string(), "first rule, second rule");
    }

    #[test]
    fn test_app_error_conversion() {
        let val_err = ValidationError::InvalidFormat("test".to_string());
        let app_err: AppError = val_err.into();
        match app_err {
            AppError::Validation(_) => (),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_token_failures_share_one_public_message() {
        let kinds = [
            TokenError::Malformed,
            TokenError::InvalidSignature,
            TokenError::Expired,
        ];

        for kind in kinds {
            let err: AppError = kind.into();
            let (status, body) = ErrorHandler::error_response(&err, "req-1");
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body.code, "TOKEN_INVALID");
            assert_eq!(body.message, "Invalid or expired token");
        }
    }

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (AuthError::MissingToken.into(), StatusCode::UNAUTHORIZED),
            (AuthError::InvalidCredentials.into(), StatusCode::UNAUTHORIZED),
            (
                AuthError::EmailNotVerified("a@b.com".to_string()).into(),
                StatusCode::FORBIDDEN,
            ),
            (AuthError::UserNotFound.into(), StatusCode::NOT_FOUND),
            (ValidationError::EmailExists.into(), StatusCode::BAD_REQUEST),
            (ValidationError::InvalidResetKey.into(), StatusCode::BAD_REQUEST),
            (AppError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ResponseError::status_code(&err), expected, "{}", err);
        }
    }

    #[test]
    fn test_not_verified_response_carries_hint() {
        let err: AppError = AuthError::EmailNotVerified("a@b.com".to_string()).into();
        let (_, body) = ErrorHandler::error_response(&err, "req-2");

        let details = body.details.expect("details missing");
        assert_eq!(details["needs_verification"], true);
        assert_eq!(details["email"], "a@b.com");
    }

    #[test]
    fn test_error_response_creation() {
        let request_id = "test-123".to_string();
        let response = ErrorResponse::new(
            request_id.clone(),
            "Test error".to_string(),
            "TEST_ERROR".to_string(),
            400,
        );

        assert!(!response.success);
        assert_eq!(response.error_id, request_id);
        assert_eq!(response.code, "TEST_ERROR");
        assert_eq!(response.status, 400);
    }

    #[tokio::test]
    async fn test_contextual_error_uses_the_context_request_id() {
        let ctx = ErrorContext::new("delete_account").with_user_id(7);
        let request_id = ctx.request_id.clone();
        let err = ctx.attach(AuthError::InvalidPassword.into());
        assert_eq!(err.to_string(), "delete_account: Password is incorrect");

        let response = ResponseError::error_response(&err);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let bytes = actix_web::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error_id"], request_id.as_str());
        assert_eq!(body["code"], "INVALID_PASSWORD");
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id(42);
        assert_eq!(ctx_with_user.user_id, Some(42));
    }
}
