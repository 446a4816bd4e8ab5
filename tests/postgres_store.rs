//! `PgCredentialStore` against a real PostgreSQL database
//!
//! Each test creates its own database from `configuration.yaml` /
//! `APP__DATABASE__*` and runs the migrations. They need a reachable server:
//! `cargo test --test postgres_store -- --ignored`

use qounam_auth::configuration::{get_configuration, DatabaseSettings};
use qounam_auth::error::{AppError, ValidationError};
use qounam_auth::store::{CredentialStore, NewUser, PgCredentialStore, UserUpdate};
use sqlx::{Connection, Executor, PgConnection, PgPool};

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn spawn_store() -> (PgCredentialStore, PgPool) {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let pool = configure_database(&configuration.database).await;

    (PgCredentialStore::new(pool.clone()), pool)
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "hash".to_string(),
        first_name: "Mary".to_string(),
        last_name: "Jackson".to_string(),
        meta: vec![("company".to_string(), "NACA".to_string())],
    }
}

#[tokio::test]
#[ignore = "needs PostgreSQL"]
async fn create_and_find_by_email_ignores_case() {
    let (store, _) = spawn_store().await;

    let id = store
        .create_user(&new_user("mary", "Mary@Example.com"))
        .await
        .unwrap();

    let by_email = store.find_by_email("MARY@example.COM").await.unwrap().unwrap();
    assert_eq!(by_email.id, id);
    assert_eq!(by_email.email, "mary@example.com");
    assert_eq!(by_email.display_name, "Mary Jackson");

    assert_eq!(store.find_by_id(id).await.unwrap(), Some(by_email.clone()));
    assert_eq!(store.find_by_username("mary").await.unwrap(), Some(by_email));
    assert!(store.username_exists("mary").await.unwrap());
    assert!(!store.username_exists("dorothy").await.unwrap());
    assert_eq!(
        store.get_user_meta(id, "company").await.unwrap().as_deref(),
        Some("NACA")
    );
}

#[tokio::test]
#[ignore = "needs PostgreSQL"]
async fn duplicate_email_is_email_exists_and_leaves_nothing_behind() {
    let (store, pool) = spawn_store().await;
    store
        .create_user(&new_user("mary", "mary@example.com"))
        .await
        .unwrap();

    let result = store
        .create_user(&new_user("mary2", "MARY@example.com"))
        .await;
    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::EmailExists))
    ));

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    let meta: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_meta")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(users, 1);
    assert_eq!(meta, 1);

    let other = store
        .create_user(&new_user("dorothy", "dorothy@example.com"))
        .await
        .unwrap();
    let update = UserUpdate {
        email: Some("Mary@example.com".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        store.update_user(other, &update).await,
        Err(AppError::Validation(ValidationError::EmailExists))
    ));
}

#[tokio::test]
#[ignore = "needs PostgreSQL"]
async fn update_user_keeps_display_name_in_step() {
    let (store, _) = spawn_store().await;
    let id = store
        .create_user(&new_user("mary", "mary@example.com"))
        .await
        .unwrap();

    let update = UserUpdate {
        first_name: Some("Katherine".to_string()),
        ..Default::default()
    };
    store.update_user(id, &update).await.unwrap();
    let user = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.first_name, "Katherine");
    assert_eq!(user.last_name, "Jackson");
    assert_eq!(user.display_name, "Katherine Jackson");

    let update = UserUpdate {
        last_name: Some("Johnson".to_string()),
        email: Some("  KJ@Example.com ".to_string()),
        ..Default::default()
    };
    store.update_user(id, &update).await.unwrap();
    let user = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.display_name, "Katherine Johnson");
    assert_eq!(user.email, "kj@example.com");

    store.set_password_hash(id, "new-hash").await.unwrap();
    let user = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(user.password_hash, "new-hash");
}

#[tokio::test]
#[ignore = "needs PostgreSQL"]
async fn meta_upserts_and_cascades_on_delete() {
    let (store, pool) = spawn_store().await;
    let id = store
        .create_user(&new_user("mary", "mary@example.com"))
        .await
        .unwrap();

    store.set_user_meta(id, "company", "NASA").await.unwrap();
    assert_eq!(
        store.get_user_meta(id, "company").await.unwrap().as_deref(),
        Some("NASA")
    );

    store.set_user_meta(id, "position", "Engineer").await.unwrap();
    store.delete_user_meta(id, "position").await.unwrap();
    assert!(store.get_user_meta(id, "position").await.unwrap().is_none());

    assert!(store.delete_user(id).await.unwrap());
    assert!(!store.delete_user(id).await.unwrap());
    assert!(store.find_by_id(id).await.unwrap().is_none());

    let meta: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_meta WHERE user_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(meta, 0);
}
