use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use sqlx::PgPool;

use crate::error::{AppError, ValidationError};
use crate::store::{normalize_email, CredentialStore, NewUser, UserRecord, UserUpdate};

/// Name Postgres gives the unique constraint on `users.email`
const USERS_EMAIL_KEY: &str = "users_email_key";

type UserRow = (i64, String, String, String, String, String, String, DateTime<Utc>);

const USER_COLUMNS: &str =
    "id, username, email, password_hash, first_name, last_name, display_name, registered_at";

fn into_record(row: UserRow) -> UserRecord {
    let (id, username, email, password_hash, first_name, last_name, display_name, registered_at) =
        row;
    UserRecord {
        id,
        username,
        email,
        password_hash,
        first_name,
        last_name,
        display_name,
        registered_at,
    }
}

/// A unique violation on `users.email` is reported as `EmailExists`, like the
/// in-memory store does
fn email_conflict(err: sqlx::Error) -> AppError {
    let taken = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.constraint() == Some(USERS_EMAIL_KEY)
    );
    if taken {
        ValidationError::EmailExists.into()
    } else {
        err.into()
    }
}

/// Credential store backed by the `users` / `user_meta` tables
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    fn find_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users WHERE email = $1",
                USER_COLUMNS
            ))
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(into_record))
        })
    }

    fn find_by_id(&self, user_id: i64) -> BoxFuture<'_, Result<Option<UserRecord>, AppError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users WHERE id = $1",
                USER_COLUMNS
            ))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(into_record))
        })
    }

    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>> {
        Box::pin(async move {
            let row = sqlx::query_as::<_, UserRow>(&format!(
                "SELECT {} FROM users WHERE username = $1",
                USER_COLUMNS
            ))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(into_record))
        })
    }

    fn username_exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<bool, AppError>> {
        Box::pin(async move {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
            )
            .bind(username)
            .fetch_one(&self.pool)
            .await?;

            Ok(exists)
        })
    }

    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<i64, AppError>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await?;

            let id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO users (username, email, password_hash, first_name, last_name, display_name, registered_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&user.username)
            .bind(normalize_email(&user.email))
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.display_name())
            .bind(Utc::now())
            .fetch_one(&mut transaction)
            .await
            .map_err(email_conflict)?;

            for (key, value) in &user.meta {
                sqlx::query(
                    "INSERT INTO user_meta (user_id, meta_key, meta_value) VALUES ($1, $2, $3)",
                )
                .bind(id)
                .bind(key)
                .bind(value)
                .execute(&mut transaction)
                .await?;
            }

            transaction.commit().await?;
            Ok(id)
        })
    }

    fn update_user<'a>(
        &'a self,
        user_id: i64,
        update: &'a UserUpdate,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                UPDATE users
                SET first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    email = COALESCE($4, email),
                    display_name = COALESCE($2, first_name) || ' ' || COALESCE($3, last_name)
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(update.first_name.as_deref())
            .bind(update.last_name.as_deref())
            .bind(update.email.as_deref().map(normalize_email))
            .execute(&self.pool)
            .await
            .map_err(email_conflict)?;

            Ok(())
        })
    }

    fn set_password_hash<'a>(
        &'a self,
        user_id: i64,
        password_hash: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
                .bind(user_id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn get_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, AppError>> {
        Box::pin(async move {
            let value = sqlx::query_scalar::<_, String>(
                "SELECT meta_value FROM user_meta WHERE user_id = $1 AND meta_key = $2",
            )
            .bind(user_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

            Ok(value)
        })
    }

    fn set_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO user_meta (user_id, meta_key, meta_value)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, meta_key) DO UPDATE SET meta_value = EXCLUDED.meta_value
                "#,
            )
            .bind(user_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
    }

    fn delete_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM user_meta WHERE user_id = $1 AND meta_key = $2")
                .bind(user_id)
                .bind(key)
                .execute(&self.pool)
                .await?;

            Ok(())
        })
    }

    fn delete_user(&self, user_id: i64) -> BoxFuture<'_, Result<bool, AppError>> {
        Box::pin(async move {
            // user_meta rows go with the user (ON DELETE CASCADE)
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

            Ok(result.rows_affected() > 0)
        })
    }
}
