use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::account::AccountService;
use crate::auth::{Clock, SessionService};
use crate::configuration::AuthSettings;
use crate::email_client::Notifier;
use crate::error::{AppError, ConfigError, ValidationError};
use crate::logger::{access_log, LoggerMiddleware};
use crate::middleware::AuthGateMiddleware;
use crate::store::CredentialStore;
use crate::routes::{
    change_password, confirm_email, delete_account, forgot_password, health_check, login,
    profile, refresh, register, resend_verification, reset_password, settings, update_profile,
    update_settings, verify,
};

/// Wire the services the handlers share
pub fn build_services(
    auth: &AuthSettings,
    clock: Arc<dyn Clock>,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
) -> Result<(SessionService, AccountService), ConfigError> {
    let secret = auth.validated_secret()?;
    let sessions = SessionService::new(
        secret,
        auth.issuer.clone(),
        auth.parsed_reset_url()?,
        clock,
        store.clone(),
        notifier,
    );
    let accounts = AccountService::new(store);

    Ok((sessions, accounts))
}

pub fn run(
    listener: TcpListener,
    sessions: SessionService,
    accounts: AccountService,
) -> Result<Server, std::io::Error> {
    let gate = sessions.gate().clone();
    let sessions = web::Data::new(sessions);
    let accounts = web::Data::new(accounts);

    let server = HttpServer::new(move || {
        // Malformed JSON bodies get the same error envelope as everything else
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            tracing::warn!(error = %err, "Rejected request body");
            AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
        });

        App::new()
            // Global middleware
            .wrap(access_log())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(json_config)
            .app_data(sessions.clone())
            .app_data(accounts.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/register", web::post().to(register))
                    .route("/verify", web::post().to(verify))
                    .route("/refresh", web::post().to(refresh))
                    .route("/confirm-email", web::post().to(confirm_email))
                    .route("/resend-verification", web::post().to(resend_verification)),
            )
            // registered ahead of the gated /account scope, which would
            // otherwise claim these paths
            .route("/account/forgot-password", web::post().to(forgot_password))
            .route("/account/reset-password", web::post().to(reset_password))

            // Protected routes (require a valid token)
            .service(
                web::scope("/account")
                    .wrap(AuthGateMiddleware::new(gate.clone()))
                    .route("/profile", web::get().to(profile))
                    .route("/update-profile", web::post().to(update_profile))
                    .route("/change-password", web::post().to(change_password))
                    .route("/settings", web::get().to(settings))
                    .route("/settings", web::post().to(update_settings))
                    .route("/delete", web::post().to(delete_account)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
