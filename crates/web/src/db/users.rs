//! User repository for database operations.
//!
//! Covers accounts, password hashes, password reset state and hearts.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use delicious_core::{Email, StoreId, UserId};

use super::RepositoryError;
use crate::models::User;

/// Columns selected for every `User`, hearts aggregated inline.
const USER_COLUMNS: &str = r"
    u.id, u.email, u.name, u.created_at,
    ARRAY(SELECT h.store_id FROM user_hearts h WHERE h.user_id = u.id ORDER BY h.store_id) AS hearts
";

/// Internal row type for database queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    hearts: Vec<i32>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            name: row.name,
            hearts: row.hearts.into_iter().map(StoreId::new).collect::<BTreeSet<_>>(),
            created_at: row.created_at,
        })
    }
}

/// Row type for password lookups.
#[derive(Debug, sqlx::FromRow)]
struct PasswordRow {
    #[sqlx(flatten)]
    user: UserRow,
    password_hash: String,
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user by their (normalized) email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user together with their password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_password_hash(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS}, u.password_hash FROM users u WHERE u.email = $1");
        let row = sqlx::query_as::<_, PasswordRow>(&sql)
            .bind(email.as_str())
            .fetch_optional(self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some((row.user.try_into()?, row.password_hash)))
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        email: &Email,
        name: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO users (email, name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, created_at, ARRAY[]::INTEGER[] AS hearts
            ",
        )
        .bind(email.as_str())
        .bind(name)
        .bind(password_hash)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "email"))?;

        row.try_into()
    }

    /// Update a user's name and email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another account uses the email.
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_profile(
        &self,
        id: UserId,
        name: &str,
        email: &Email,
    ) -> Result<User, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET name = $2, email = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(name)
        .bind(email.as_str())
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "email"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(RepositoryError::NotFound)
    }

    /// Store a password reset token hash and its expiry.
    ///
    /// Replaces any token issued earlier.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_reset_token(
        &self,
        id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET reset_password_token_hash = $2, reset_password_expires = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_i32())
        .bind(token_hash)
        .bind(expires_at)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    /// Find the user holding a reset token that is still valid at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users u
             WHERE u.reset_password_token_hash = $1 AND u.reset_password_expires > $2"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Set a new password for the holder of a valid reset token and clear the token.
    ///
    /// The token check and the write are one statement, so a token can be
    /// redeemed only once. Returns `None` if no valid token matched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let id: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE users
            SET password_hash = $2,
                reset_password_token_hash = NULL,
                reset_password_expires = NULL,
                updated_at = now()
            WHERE reset_password_token_hash = $1 AND reset_password_expires > $3
            RETURNING id
            ",
        )
        .bind(token_hash)
        .bind(password_hash)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        match id {
            Some(id) => self.get_by_id(UserId::new(id)).await,
            None => Ok(None),
        }
    }

    /// Toggle `store` in the user's hearts and return whether it is now hearted.
    ///
    /// Runs as a single statement: an existing heart is deleted, otherwise one
    /// is inserted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn toggle_heart(&self, user: UserId, store: StoreId) -> Result<bool, RepositoryError> {
        let hearted: bool = sqlx::query_scalar(
            r"
            WITH removed AS (
                DELETE FROM user_hearts
                WHERE user_id = $1 AND store_id = $2
                RETURNING store_id
            ),
            inserted AS (
                INSERT INTO user_hearts (user_id, store_id)
                SELECT $1, $2
                WHERE NOT EXISTS (SELECT 1 FROM removed)
                ON CONFLICT DO NOTHING
                RETURNING store_id
            )
            SELECT EXISTS (SELECT 1 FROM inserted)
            ",
        )
        .bind(user.as_i32())
        .bind(store.as_i32())
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        Ok(hearted)
    }
}
