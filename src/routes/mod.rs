mod account;
mod auth;
mod health_check;

pub use account::{change_password, delete_account, profile, settings, update_profile, update_settings};
pub use auth::{
    confirm_email, forgot_password, login, refresh, register, resend_verification, reset_password,
    verify,
};
pub use health_check::health_check;
