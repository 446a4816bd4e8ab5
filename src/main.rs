use qounam_auth::auth::SystemClock;
use qounam_auth::configuration::get_configuration;
use qounam_auth::email_client::{EmailClient, SenderEmail};
use qounam_auth::startup::{build_services, run};
use qounam_auth::store::PgCredentialStore;
use qounam_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

fn startup_error(kind: std::io::ErrorKind, message: &str) -> std::io::Error {
    std::io::Error::new(kind, message.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Structured logging
    if let Err(e) = init_telemetry() {
        eprintln!("Failed to initialise telemetry: {}", e);
    }

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(std::io::ErrorKind::InvalidInput, "Configuration error"));
        }
    };

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(std::io::ErrorKind::ConnectionRefused, "Database connection error")
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        startup_error(std::io::ErrorKind::Other, "Migration error")
    })?;
    tracing::info!("Database ready");

    let sender = SenderEmail::parse(configuration.email_client.sender_email.clone()).map_err(|e| {
        tracing::error!("Invalid sender email: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;
    let email_client = EmailClient::new(
        configuration.email_client.base_url.clone(),
        sender,
        reqwest::Client::new(),
    );

    let (sessions, accounts) = build_services(
        &configuration.auth,
        Arc::new(SystemClock),
        Arc::new(PgCredentialStore::new(pool)),
        Arc::new(email_client),
    )
    .map_err(|e| {
        tracing::error!("Invalid auth settings: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions, accounts)?.await
}
