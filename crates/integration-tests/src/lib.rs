//! Integration tests for Delicious.
//!
//! # Running Tests
//!
//! ```bash
//! # Migrate the database and start the server
//! cargo run -p delicious-cli -- migrate
//! cargo run -p delicious-web
//!
//! # Run the ignored tests
//! cargo test -p delicious-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `http` - End-to-end tests against a running server (`DELICIOUS_TEST_URL`)
//! - `services` - Service tests against the database (`DELICIOUS_DATABASE_URL`)

#![allow(clippy::missing_panics_doc, clippy::expect_used)]

use reqwest::{Client, StatusCode, redirect};
use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

use delicious_web::models::User;
use delicious_web::services::{AuthService, Registration};

/// Password used for every account the tests create.
pub const TEST_PASSWORD: &str = "integration-test-password";

/// Base URL of the running server (configurable via environment).
#[must_use]
pub fn base_url() -> String {
    std::env::var("DELICIOUS_TEST_URL").unwrap_or_else(|_| "http://localhost:7777".to_string())
}

/// A client with its own cookie jar that does not follow redirects, so tests
/// can assert on `Location` headers.
#[must_use]
pub fn client() -> Client {
    Client::builder()
        .cookie_store(true)
        .redirect(redirect::Policy::none())
        .build()
        .expect("Failed to create HTTP client")
}

/// A short random tag for names and emails.
#[must_use]
pub fn unique() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Register a fresh account through the form; the client is logged in afterwards.
///
/// Returns the email used.
pub async fn register(client: &Client, name: &str) -> String {
    let email = format!("{}-{}@example.com", name.to_lowercase(), unique());
    let resp = client
        .post(format!("{}/register", base_url()))
        .form(&[
            ("name", name),
            ("email", email.as_str()),
            ("password", TEST_PASSWORD),
            ("password_confirm", TEST_PASSWORD),
        ])
        .send()
        .await
        .expect("Failed to register");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER, "registration failed");
    email
}

/// Value of the `Location` header of a redirect.
#[must_use]
pub fn location(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Connect to the test database.
pub async fn pool() -> PgPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DELICIOUS_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("DELICIOUS_DATABASE_URL not set");
    delicious_web::db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to database")
}

/// Key used to digest reset tokens in service tests.
#[must_use]
pub fn token_key() -> SecretString {
    SecretString::from("kT9#vQ2$wL7!pR4@zX8&mN3^bH6*cJ1%".to_string())
}

/// Register a user directly through the service.
pub async fn create_user(pool: &PgPool, name: &str) -> User {
    let key = token_key();
    let email = format!("{}-{}@example.com", name.to_lowercase(), unique());
    AuthService::new(pool, &key)
        .register(&Registration {
            name: name.to_string(),
            email,
            password: TEST_PASSWORD.to_string(),
            password_confirm: TEST_PASSWORD.to_string(),
        })
        .await
        .expect("Failed to create user")
}
