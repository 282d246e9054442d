//! Review repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use delicious_core::{Rating, ReviewId, StoreId, UserId};

use super::RepositoryError;
use crate::models::{NewReview, Review, ReviewView};

fn rating(value: i16) -> Result<Rating, RepositoryError> {
    Rating::new(i64::from(value))
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid rating in database: {e}")))
}

/// Internal row type for database queries.
#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    author_id: i32,
    store_id: i32,
    text: String,
    rating: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ReviewId::new(row.id),
            author: UserId::new(row.author_id),
            store: StoreId::new(row.store_id),
            text: row.text,
            rating: rating(row.rating)?,
            created_at: row.created_at,
        })
    }
}

/// Row type for reviews joined with their author.
#[derive(Debug, sqlx::FromRow)]
struct ReviewViewRow {
    author_name: String,
    text: String,
    rating: i16,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewViewRow> for ReviewView {
    type Error = RepositoryError;

    fn try_from(row: ReviewViewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            author_name: row.author_name,
            text: row.text,
            rating: rating(row.rating)?,
            created_at: row.created_at,
        })
    }
}

/// Repository for review database operations.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    /// Create a new review repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Save a review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store doesn't exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            INSERT INTO reviews (author_id, store_id, text, rating)
            VALUES ($1, $2, $3, $4)
            RETURNING id, author_id, store_id, text, rating, created_at
            ",
        )
        .bind(author.as_i32())
        .bind(store.as_i32())
        .bind(&review.text)
        .bind(review.rating.as_i16())
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

        row.try_into()
    }

    /// Reviews for a store with author names, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_store(&self, store: StoreId) -> Result<Vec<ReviewView>, RepositoryError> {
        let rows = sqlx::query_as::<_, ReviewViewRow>(
            r"
            SELECT u.name AS author_name, r.text, r.rating, r.created_at
            FROM reviews r
            JOIN users u ON u.id = r.author_id
            WHERE r.store_id = $1
            ORDER BY r.created_at DESC, r.id DESC
            ",
        )
        .bind(store.as_i32())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
