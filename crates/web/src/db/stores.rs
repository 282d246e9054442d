//! Store repository for database operations.
//!
//! Listing, tag aggregation, full-text search and proximity search all run
//! in `PostgreSQL`; this module only shapes the queries and rows.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use delicious_core::{GeoPoint, Slug, StoreId, UserId};

use super::RepositoryError;
use crate::models::{Location, NearbyStore, Store, StoreDraft, TagCount, TopStore};

/// Columns selected for every `Store`.
const STORE_COLUMNS: &str = r"
    s.id, s.name, s.slug, s.description, s.tags, s.lng, s.lat, s.address,
    s.photo, s.author_id, s.created_at
";

/// Internal row type for database queries.
#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    tags: Vec<String>,
    lng: f64,
    lat: f64,
    address: String,
    photo: Option<String>,
    author_id: i32,
    created_at: DateTime<Utc>,
}

fn location(lng: f64, lat: f64, address: String) -> Result<Location, RepositoryError> {
    let point = GeoPoint::new(lng, lat).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid coordinates in database: {e}"))
    })?;
    Ok(Location { point, address })
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: StoreId::new(row.id),
            name: row.name,
            slug: Slug::from_stored(row.slug),
            description: row.description,
            tags: row.tags,
            location: location(row.lng, row.lat, row.address)?,
            photo: row.photo,
            author: UserId::new(row.author_id),
            created_at: row.created_at,
        })
    }
}

/// Row type for the proximity search.
#[derive(Debug, sqlx::FromRow)]
struct NearbyRow {
    slug: String,
    name: String,
    description: String,
    lng: f64,
    lat: f64,
    address: String,
    photo: Option<String>,
    distance_meters: f64,
}

impl TryFrom<NearbyRow> for NearbyStore {
    type Error = RepositoryError;

    fn try_from(row: NearbyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            slug: Slug::from_stored(row.slug),
            name: row.name,
            description: row.description,
            location: location(row.lng, row.lat, row.address)?,
            photo: row.photo,
            distance_meters: row.distance_meters,
        })
    }
}

/// Row type for the top-stores aggregation.
#[derive(Debug, sqlx::FromRow)]
struct TopStoreRow {
    id: i32,
    name: String,
    slug: String,
    photo: Option<String>,
    review_count: i64,
    average_rating: f64,
}

impl From<TopStoreRow> for TopStore {
    fn from(row: TopStoreRow) -> Self {
        Self {
            id: StoreId::new(row.id),
            name: row.name,
            slug: Slug::from_stored(row.slug),
            photo: row.photo,
            review_count: row.review_count,
            average_rating: row.average_rating,
        }
    }
}

fn into_stores(rows: Vec<StoreRow>) -> Result<Vec<Store>, RepositoryError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

/// Repository for store database operations.
pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Count slugs equal to `base` or `base-<number>`, ignoring case.
    ///
    /// `exclude` leaves a store out of the count (the one being renamed).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_slug_collisions(
        &self,
        base: &Slug,
        exclude: Option<StoreId>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM stores
            WHERE slug ~* $1 AND ($2::INTEGER IS NULL OR id <> $2)
            ",
        )
        .bind(base.collision_pattern())
        .bind(exclude.map(|id| id.as_i32()))
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Insert a new store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is already taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn insert(
        &self,
        draft: &StoreDraft,
        slug: &Slug,
        author: UserId,
    ) -> Result<Store, RepositoryError> {
        let sql = format!(
            "INSERT INTO stores AS s (name, slug, description, tags, lng, lat, address, photo, author_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {STORE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(&draft.name)
            .bind(slug.as_str())
            .bind(&draft.description)
            .bind(&draft.tags)
            .bind(draft.location.lng())
            .bind(draft.location.lat())
            .bind(&draft.location.address)
            .bind(draft.photo.as_deref())
            .bind(author.as_i32())
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "slug"))?;

        row.try_into()
    }

    /// Overwrite a store's fields.
    ///
    /// A `None` photo in the draft keeps the current photo.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store doesn't exist.
    /// Returns `RepositoryError::Conflict` if the slug is already taken.
    pub async fn update(
        &self,
        id: StoreId,
        draft: &StoreDraft,
        slug: &Slug,
    ) -> Result<Store, RepositoryError> {
        let sql = format!(
            "UPDATE stores AS s
             SET name = $2, slug = $3, description = $4, tags = $5,
                 lng = $6, lat = $7, address = $8, photo = COALESCE($9, s.photo)
             WHERE s.id = $1
             RETURNING {STORE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id.as_i32())
            .bind(&draft.name)
            .bind(slug.as_str())
            .bind(&draft.description)
            .bind(&draft.tags)
            .bind(draft.location.lng())
            .bind(draft.location.lat())
            .bind(&draft.location.address)
            .bind(draft.photo.as_deref())
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "slug"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Get a store by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores s WHERE s.id = $1");
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a store by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores s WHERE s.slug = $1");
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// One page of stores, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores s
             ORDER BY s.created_at DESC, s.id DESC
             OFFSET $1 LIMIT $2"
        );
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(skip)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        into_stores(rows)
    }

    /// Total number of stores.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Stores carrying `tag`, or every store with at least one tag when `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores s
             WHERE CASE WHEN $1::TEXT IS NULL THEN cardinality(s.tags) > 0
                        ELSE $1 = ANY(s.tags) END
             ORDER BY s.created_at DESC, s.id DESC"
        );
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(tag)
            .fetch_all(self.pool)
            .await?;

        into_stores(rows)
    }

    /// Tag histogram: every tag with the number of stores using it, most used first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tag_counts(&self) -> Result<Vec<TagCount>, RepositoryError> {
        let tags = sqlx::query_as::<_, TagCount>(
            r"
            SELECT t.tag, COUNT(*) AS count
            FROM stores s
            CROSS JOIN LATERAL unnest(s.tags) AS t(tag)
            GROUP BY t.tag
            ORDER BY count DESC, t.tag ASC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(tags)
    }

    /// Full-text search over name and description, best match first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS}
             FROM stores s, websearch_to_tsquery('english', $1) AS q
             WHERE s.search_vector @@ q
             ORDER BY ts_rank(s.search_vector, q) DESC, s.id ASC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(query)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        into_stores(rows)
    }

    /// Stores within `radius_meters` of `point`, nearest first.
    ///
    /// The `earth_box` test uses the GiST index; the exact distance check
    /// trims the box corners.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn near(
        &self,
        point: GeoPoint,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<NearbyStore>, RepositoryError> {
        let rows = sqlx::query_as::<_, NearbyRow>(
            r"
            SELECT slug, name, description, lng, lat, address, photo, distance_meters
            FROM (
                SELECT s.*,
                       earth_distance(ll_to_earth($2, $1), ll_to_earth(s.lat, s.lng)) AS distance_meters
                FROM stores s
                WHERE earth_box(ll_to_earth($2, $1), $3) @> ll_to_earth(s.lat, s.lng)
            ) nearby
            WHERE distance_meters <= $3
            ORDER BY distance_meters ASC
            LIMIT $4
            ",
        )
        .bind(point.lng())
        .bind(point.lat())
        .bind(radius_meters)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Stores a user has hearted, newest heart first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn hearted_by(&self, user: UserId) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS}
             FROM stores s
             JOIN user_hearts h ON h.store_id = s.id
             WHERE h.user_id = $1
             ORDER BY h.created_at DESC"
        );
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(user.as_i32())
            .fetch_all(self.pool)
            .await?;

        into_stores(rows)
    }

    /// Highest average rating among stores with at least `min_reviews` reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn top(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>, RepositoryError> {
        let rows = sqlx::query_as::<_, TopStoreRow>(
            r"
            SELECT s.id, s.name, s.slug, s.photo,
                   COUNT(r.id) AS review_count,
                   AVG(r.rating)::DOUBLE PRECISION AS average_rating
            FROM stores s
            JOIN reviews r ON r.store_id = s.id
            GROUP BY s.id
            HAVING COUNT(r.id) >= $1
            ORDER BY average_rating DESC, review_count DESC, s.id ASC
            LIMIT $2
            ",
        )
        .bind(min_reviews)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
