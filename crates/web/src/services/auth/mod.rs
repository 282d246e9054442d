//! Authentication service.
//!
//! Provides password registration and login, profile updates and the
//! password reset flow. Reset tokens are handed to the user in plaintext and
//! stored only as an HMAC-SHA256 digest keyed by the session secret.

mod error;

pub use error::AuthError;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use sqlx::PgPool;

use delicious_core::{Email, UserId};

use crate::db::RepositoryError;
use crate::db::users::UserRepository;
use crate::models::User;

/// Random bytes in a reset token (hex-encoded to 40 characters).
pub const RESET_TOKEN_BYTES: usize = 20;

/// How long a reset token stays valid.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// Upper bound on password length, keeps hashing cost bounded.
const MAX_PASSWORD_LENGTH: usize = 1024;

type HmacSha256 = Hmac<Sha256>;

/// Submitted registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Registration input that passed validation.
#[derive(Debug)]
struct ValidRegistration {
    name: String,
    email: Email,
}

impl Registration {
    /// Check every field, collecting all messages.
    fn validate(&self) -> Result<ValidRegistration, AuthError> {
        let mut errors = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            errors.push("You need to supply a name!".to_string());
        }

        let email = Email::normalized(&self.email);
        if email.is_err() {
            errors.push("That email is not valid!".to_string());
        }

        if self.password.is_empty() {
            errors.push("Password can't be blank".to_string());
        } else if self.password.len() > MAX_PASSWORD_LENGTH {
            errors.push(format!(
                "Passwords are limited to {MAX_PASSWORD_LENGTH} characters"
            ));
        }
        if self.password_confirm.is_empty() {
            errors.push("Confirmed password can't be blank".to_string());
        }
        if self.password_confirm != self.password {
            errors.push("Uh-oh! Those passwords don't match!".to_string());
        }

        match email {
            Ok(email) if errors.is_empty() => Ok(ValidRegistration {
                name: name.to_string(),
                email,
            }),
            _ => Err(AuthError::Validation(errors)),
        }
    }
}

/// A freshly issued reset token and the account it belongs to.
#[derive(Debug)]
pub struct IssuedResetToken {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service.
///
/// Handles user registration, login, profile changes and password reset.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    token_key: &'a SecretString,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    ///
    /// `token_key` keys the reset-token digest.
    #[must_use]
    pub const fn new(pool: &'a PgPool, token_key: &'a SecretString) -> Self {
        Self {
            users: UserRepository::new(pool),
            token_key,
        }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` with every problem found in the form.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    pub async fn register(&self, form: &Registration) -> Result<User, AuthError> {
        let valid = form.validate()?;
        let password_hash = hash_password(&form.password)?;

        let user = self
            .users
            .create(&valid.email, &valid.name, &password_hash)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::normalized(email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        Ok(user)
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the user doesn't exist.
    pub async fn get_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Change a user's name and email.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` for a blank name or malformed email.
    /// Returns `AuthError::UserAlreadyExists` if another account uses the email.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        name: &str,
        email: &str,
    ) -> Result<User, AuthError> {
        let mut errors = Vec::new();
        let name = name.trim();
        if name.is_empty() {
            errors.push("You need to supply a name!".to_string());
        }
        let email = Email::normalized(email);
        let email = match email {
            Ok(email) if errors.is_empty() => email,
            Ok(_) => return Err(AuthError::Validation(errors)),
            Err(_) => {
                errors.push("That email is not valid!".to_string());
                return Err(AuthError::Validation(errors));
            }
        };

        self.users
            .update_profile(user_id, name, &email)
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                RepositoryError::NotFound => AuthError::UserNotFound,
                other => AuthError::Repository(other),
            })
    }

    /// Issue a reset token for the account registered under `email`.
    ///
    /// Any earlier token for the account stops working.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if no account uses the email.
    pub async fn issue_reset_token(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedResetToken, AuthError> {
        let email = Email::normalized(email).map_err(|_| AuthError::UserNotFound)?;
        let user = self
            .users
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let token = generate_reset_token();
        let expires_at = now + RESET_TOKEN_TTL;
        let digest = self.token_digest(&token)?;
        self.users
            .set_reset_token(user.id, &digest, expires_at)
            .await?;

        tracing::info!(user_id = %user.id, %expires_at, "password reset token issued");
        Ok(IssuedResetToken {
            user,
            token,
            expires_at,
        })
    }

    /// The user holding `token`, if it is known and `now` is before its expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` for unknown or expired tokens.
    pub async fn check_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        let digest = self.token_digest(token)?;
        self.users
            .get_by_reset_token(&digest, now)
            .await?
            .ok_or(AuthError::InvalidResetToken)
    }

    /// Set a new password using a reset token, then forget the token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` if the two passwords differ.
    /// Returns `AuthError::Validation` for a blank password.
    /// Returns `AuthError::InvalidResetToken` for unknown or expired tokens.
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password_confirm: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AuthError> {
        if password != password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        if password.is_empty() || password.len() > MAX_PASSWORD_LENGTH {
            return Err(AuthError::Validation(vec![
                "Please choose a new password".to_string(),
            ]));
        }

        let digest = self.token_digest(token)?;
        let password_hash = hash_password(password)?;
        let user = self
            .users
            .complete_password_reset(&digest, &password_hash, now)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(user)
    }

    fn token_digest(&self, token: &str) -> Result<String, AuthError> {
        reset_token_digest(self.token_key.expose_secret().as_bytes(), token)
    }
}

/// Generate a random reset token as lowercase hex.
#[must_use]
pub fn generate_reset_token() -> String {
    hex::encode(rand::random::<[u8; RESET_TOKEN_BYTES]>())
}

/// HMAC-SHA256 of a reset token, hex-encoded, as stored in the database.
fn reset_token_digest(key: &[u8], token: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| AuthError::TokenHash)?;
    mac.update(token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration {
            name: " Wes ".to_string(),
            email: " Wes@Example.com".to_string(),
            password: "hunter22".to_string(),
            password_confirm: "hunter22".to_string(),
        }
    }

    #[test]
    fn test_registration_normalizes() {
        let valid = registration().validate().unwrap();
        assert_eq!(valid.name, "Wes");
        assert_eq!(valid.email.as_str(), "wes@example.com");
    }

    #[test]
    fn test_registration_collects_every_error() {
        let form = Registration {
            name: "  ".to_string(),
            email: "not-an-email".to_string(),
            password: String::new(),
            password_confirm: "x".to_string(),
        };
        let Err(AuthError::Validation(errors)) = form.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(
            errors,
            vec![
                "You need to supply a name!",
                "That email is not valid!",
                "Password can't be blank",
                "Uh-oh! Those passwords don't match!",
            ]
        );
    }

    #[test]
    fn test_registration_blank_confirm() {
        let form = Registration {
            password_confirm: String::new(),
            ..registration()
        };
        let Err(AuthError::Validation(errors)) = form.validate() else {
            panic!("expected validation errors");
        };
        assert!(errors.contains(&"Confirmed password can't be blank".to_string()));
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("pw", "not a hash"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_reset_token_shape() {
        let token = generate_reset_token();
        assert_eq!(token.len(), RESET_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_reset_token());
    }

    #[test]
    fn test_reset_token_digest_is_keyed() {
        let a = reset_token_digest(b"key-one", "token").unwrap();
        let b = reset_token_digest(b"key-two", "token").unwrap();
        assert_eq!(a, reset_token_digest(b"key-one", "token").unwrap());
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, "token");
    }
}
