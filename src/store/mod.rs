/// Credential Store
///
/// User records, password hashes and per-user metadata. The auth core only
/// talks to the `CredentialStore` trait; PostgreSQL backs it in production
/// and an in-memory map backs it in tests.

mod memory;
mod postgres;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::AppError;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// A stored user account
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub registered_at: DateTime<Utc>,
}

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Meta entries written together with the user row
    pub meta: Vec<(String, String)>,
}

impl NewUser {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Partial update of the core account columns; `None` leaves a column alone
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub trait CredentialStore: Send + Sync {
    fn find_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>>;

    fn find_by_id(&self, user_id: i64) -> BoxFuture<'_, Result<Option<UserRecord>, AppError>>;

    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>>;

    fn username_exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<bool, AppError>>;

    /// Insert a user with its initial meta and return the new id. Either
    /// everything is stored or nothing is.
    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<i64, AppError>>;

    /// Apply `update`; the display name follows first/last name changes
    fn update_user<'a>(
        &'a self,
        user_id: i64,
        update: &'a UserUpdate,
    ) -> BoxFuture<'a, Result<(), AppError>>;

    fn set_password_hash<'a>(
        &'a self,
        user_id: i64,
        password_hash: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>>;

    fn get_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, AppError>>;

    fn set_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>>;

    fn delete_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>>;

    /// Remove a user and all of its metadata. Returns `false` if no such user.
    fn delete_user(&self, user_id: i64) -> BoxFuture<'_, Result<bool, AppError>>;
}
