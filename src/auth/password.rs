/// Password Hashing and Verification
///
/// Handles password hashing with bcrypt and the password policy.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

lazy_static! {
    // Compared against when an account does not exist so that unknown
    // emails cost the same bcrypt work as wrong passwords.
    static ref DUMMY_HASH: Option<String> = hash("dummy-password-for-timing", DEFAULT_COST).ok();
}

/// Every policy rule `password` breaks, in a stable order.
///
/// Requirements:
/// - At least 8 bytes, at most 128 bytes
/// - At least one uppercase letter `[A-Z]`
/// - At least one lowercase letter `[a-z]`
/// - At least one digit `[0-9]`
/// - At least one character outside `[A-Za-z0-9]`
pub fn password_policy_violations(password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if password.len() < MIN_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }

    // bcrypt limitation and DoS prevention
    if password.len() > MAX_PASSWORD_LENGTH {
        errors.push(format!(
            "Password must be at most {} characters long",
            MAX_PASSWORD_LENGTH
        ));
    }

    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }

    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push("Password must contain at least one special character".to_string());
    }

    errors
}

/// Validate password strength, reporting all violations together
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let errors = password_policy_violations(password);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword(errors))
    }
}

/// Hash a password using bcrypt
///
/// # Errors
/// Returns error if:
/// - Password fails the policy
/// - Bcrypt hashing fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its hash
///
/// # Errors
/// Returns error if the stored hash is unreadable
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// Spend one bcrypt verification without a real account
pub fn burn_verification_time(password: &str) {
    if let Some(dummy) = DUMMY_HASH.as_ref() {
        let _ = verify(password, dummy);
    }
}
