use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use futures::future::{ready, BoxFuture};

use crate::error::{AppError, ValidationError};
use crate::store::{normalize_email, CredentialStore, NewUser, UserRecord, UserUpdate};

#[derive(Default)]
struct State {
    next_id: i64,
    users: HashMap<i64, UserRecord>,
    meta: HashMap<(i64, String), String>,
}

/// Process-local credential store
///
/// Ids are handed out sequentially starting at 1.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("Credential store lock poisoned".to_string()))
    }

    fn email_taken(state: &State, email: &str, except: Option<i64>) -> bool {
        state
            .users
            .values()
            .any(|user| user.email == email && Some(user.id) != except)
    }

    fn find_by_email_sync(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let email = normalize_email(email);
        let state = self.state()?;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    fn create_user_sync(&self, user: &NewUser) -> Result<i64, AppError> {
        let email = normalize_email(&user.email);
        let mut state = self.state()?;

        if Self::email_taken(&state, &email, None) {
            return Err(ValidationError::EmailExists.into());
        }

        state.next_id += 1;
        let id = state.next_id;
        state.users.insert(
            id,
            UserRecord {
                id,
                username: user.username.clone(),
                email,
                password_hash: user.password_hash.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                display_name: user.display_name(),
                registered_at: Utc::now(),
            },
        );
        for (key, value) in &user.meta {
            state.meta.insert((id, key.clone()), value.clone());
        }

        Ok(id)
    }

    fn update_user_sync(&self, user_id: i64, update: &UserUpdate) -> Result<(), AppError> {
        let mut state = self.state()?;

        let email = update.email.as_deref().map(normalize_email);
        if let Some(email) = &email {
            if Self::email_taken(&state, email, Some(user_id)) {
                return Err(ValidationError::EmailExists.into());
            }
        }

        if let Some(user) = state.users.get_mut(&user_id) {
            if let Some(first_name) = &update.first_name {
                user.first_name = first_name.clone();
            }
            if let Some(last_name) = &update.last_name {
                user.last_name = last_name.clone();
            }
            if let Some(email) = email {
                user.email = email;
            }
            if update.first_name.is_some() || update.last_name.is_some() {
                user.display_name = format!("{} {}", user.first_name, user.last_name);
            }
        }

        Ok(())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, AppError> {
        let mut state = self.state()?;
        Ok(f(&mut state))
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn find_by_email<'a>(
        &'a self,
        email: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>> {
        Box::pin(ready(self.find_by_email_sync(email)))
    }

    fn find_by_id(&self, user_id: i64) -> BoxFuture<'_, Result<Option<UserRecord>, AppError>> {
        Box::pin(ready(
            self.with_state(|state| state.users.get(&user_id).cloned()),
        ))
    }

    fn find_by_username<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, Result<Option<UserRecord>, AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state
                .users
                .values()
                .find(|user| user.username == username)
                .cloned()
        })))
    }

    fn username_exists<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<bool, AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state.users.values().any(|user| user.username == username)
        })))
    }

    fn create_user<'a>(&'a self, user: &'a NewUser) -> BoxFuture<'a, Result<i64, AppError>> {
        Box::pin(ready(self.create_user_sync(user)))
    }

    fn update_user<'a>(
        &'a self,
        user_id: i64,
        update: &'a UserUpdate,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(ready(self.update_user_sync(user_id, update)))
    }

    fn set_password_hash<'a>(
        &'a self,
        user_id: i64,
        password_hash: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(ready(self.with_state(|state| {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.password_hash = password_hash.to_string();
            }
        })))
    }

    fn get_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state.meta.get(&(user_id, key.to_string())).cloned()
        })))
    }

    fn set_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state.meta.insert((user_id, key.to_string()), value.to_string());
        })))
    }

    fn delete_user_meta<'a>(
        &'a self,
        user_id: i64,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state.meta.remove(&(user_id, key.to_string()));
        })))
    }

    fn delete_user(&self, user_id: i64) -> BoxFuture<'_, Result<bool, AppError>> {
        Box::pin(ready(self.with_state(|state| {
            state.meta.retain(|(owner, _), _| *owner != user_id);
            state.users.remove(&user_id).is_some()
        })))
    }
}
