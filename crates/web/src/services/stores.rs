//! Store service.
//!
//! Owns the rules around store writes that the repository doesn't know about:
//! slug assignment with collision retry, ownership checks, reviews and hearts.

use sqlx::PgPool;
use thiserror::Error;

use delicious_core::{GeoPoint, Slug, StoreId, UserId};

use crate::db::{RepositoryError, ReviewRepository, StoreRepository, UserRepository};
use crate::models::{
    NearbyStore, NewReview, Pagination, Store, StoreDetail, StoreDraft, TagCount, TopStore, User,
};

/// How many suffixes to try before giving up on a slug.
pub const SLUG_ATTEMPTS: i64 = 5;

/// Maximum results for the text search.
pub const SEARCH_LIMIT: i64 = 5;

/// Radius of the proximity search.
pub const NEAR_RADIUS_METERS: f64 = 10_000.0;

/// Maximum results for the proximity search.
pub const NEAR_LIMIT: i64 = 10;

/// Reviews a store needs before it can rank in the top list.
pub const TOP_MIN_REVIEWS: i64 = 2;

/// Length of the top list.
pub const TOP_LIMIT: i64 = 10;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store not found.
    #[error("store not found")]
    NotFound,

    /// The user is not the store's author.
    #[error("You must own a store in order to edit it!")]
    NotOwner,

    /// Every slug candidate was taken.
    #[error("could not find a free slug for {0}")]
    SlugExhausted(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One listing page plus the overall store count.
#[derive(Debug)]
pub struct StorePage {
    pub stores: Vec<Store>,
    pub total: i64,
    pub pagination: Pagination,
}

/// Store service.
pub struct StoreService<'a> {
    stores: StoreRepository<'a>,
    reviews: ReviewRepository<'a>,
    users: UserRepository<'a>,
}

impl<'a> StoreService<'a> {
    /// Create a new store service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            stores: StoreRepository::new(pool),
            reviews: ReviewRepository::new(pool),
            users: UserRepository::new(pool),
        }
    }

    /// Create a store authored by `author`, deriving a unique slug from its name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SlugExhausted` if every slug attempt collided.
    pub async fn create(&self, author: UserId, draft: &StoreDraft) -> Result<Store, StoreError> {
        let base = Slug::from_name(&draft.name);

        for attempt in 0..SLUG_ATTEMPTS {
            let slug = self.candidate_slug(&base, None, attempt).await?;
            match self.stores.insert(draft, &slug, author).await {
                Ok(store) => {
                    tracing::info!(store_id = %store.id, slug = %store.slug, "store created");
                    return Ok(store);
                }
                Err(RepositoryError::Conflict(_)) => {
                    tracing::debug!(%slug, attempt, "slug taken, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::SlugExhausted(base.into_inner()))
    }

    /// Look up a store by id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown id.
    pub async fn get(&self, id: StoreId) -> Result<Store, StoreError> {
        self.stores.get_by_id(id).await?.ok_or(StoreError::NotFound)
    }

    /// Load a store for editing by `editor`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown id and
    /// `StoreError::NotOwner` when `editor` didn't create it.
    pub async fn editable(&self, id: StoreId, editor: UserId) -> Result<Store, StoreError> {
        let store = self.get(id).await?;
        if !store.is_owned_by(editor) {
            tracing::warn!(store_id = %id, user_id = %editor, "edit attempt by non-owner");
            return Err(StoreError::NotOwner);
        }
        Ok(store)
    }

    /// Overwrite a store owned by `editor`.
    ///
    /// The slug is regenerated only when the name changes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound`, `StoreError::NotOwner` or
    /// `StoreError::SlugExhausted`.
    pub async fn update(
        &self,
        id: StoreId,
        editor: UserId,
        draft: &StoreDraft,
    ) -> Result<Store, StoreError> {
        let current = self.editable(id, editor).await?;

        if current.name == draft.name {
            return Ok(self.stores.update(id, draft, &current.slug).await?);
        }

        let base = Slug::from_name(&draft.name);
        for attempt in 0..SLUG_ATTEMPTS {
            let slug = self.candidate_slug(&base, Some(id), attempt).await?;
            match self.stores.update(id, draft, &slug).await {
                Ok(store) => {
                    tracing::info!(store_id = %id, slug = %store.slug, "store renamed");
                    return Ok(store);
                }
                Err(RepositoryError::Conflict(_)) => {
                    tracing::debug!(%slug, attempt, "slug taken, retrying");
                }
                Err(RepositoryError::NotFound) => return Err(StoreError::NotFound),
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::SlugExhausted(base.into_inner()))
    }

    /// Slug to try on the given attempt; later attempts skip further ahead.
    async fn candidate_slug(
        &self,
        base: &Slug,
        exclude: Option<StoreId>,
        attempt: i64,
    ) -> Result<Slug, StoreError> {
        let existing = self.stores.count_slug_collisions(base, exclude).await?;
        Ok(base.disambiguate(existing + attempt))
    }

    /// A store with its author's name and its reviews, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn detail(&self, slug: &str) -> Result<Option<StoreDetail>, StoreError> {
        let Some(store) = self.stores.get_by_slug(slug).await? else {
            return Ok(None);
        };

        let (author, reviews) = tokio::try_join!(
            self.users.get_by_id(store.author),
            self.reviews.list_for_store(store.id),
        )?;

        Ok(Some(StoreDetail {
            author_name: author.map(|u| u.name).unwrap_or_default(),
            store,
            reviews,
        }))
    }

    /// One page of the newest-first listing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn page(&self, pagination: Pagination) -> Result<StorePage, StoreError> {
        let (stores, total) = tokio::try_join!(
            self.stores.list(pagination.skip(), pagination.limit()),
            self.stores.count(),
        )?;

        Ok(StorePage {
            stores,
            total,
            pagination,
        })
    }

    /// Tag histogram and the stores matching `tag` (any tagged store when `None`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if a query fails.
    pub async fn by_tag(
        &self,
        tag: Option<&str>,
    ) -> Result<(Vec<TagCount>, Vec<Store>), StoreError> {
        let (tags, stores) =
            tokio::try_join!(self.stores.tag_counts(), self.stores.list_by_tag(tag))?;
        Ok((tags, stores))
    }

    /// Text search; a blank query matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Store>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.stores.search(query, SEARCH_LIMIT).await?)
    }

    /// Stores near `point`, nearest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn near(&self, point: GeoPoint) -> Result<Vec<NearbyStore>, StoreError> {
        Ok(self
            .stores
            .near(point, NEAR_RADIUS_METERS, NEAR_LIMIT)
            .await?)
    }

    /// Stores hearted by `user`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn hearted(&self, user: UserId) -> Result<Vec<Store>, StoreError> {
        Ok(self.stores.hearted_by(user).await?)
    }

    /// Best-rated stores.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Repository` if the query fails.
    pub async fn top(&self) -> Result<Vec<TopStore>, StoreError> {
        Ok(self.stores.top(TOP_MIN_REVIEWS, TOP_LIMIT).await?)
    }

    /// Add or remove `store` from the user's hearts and return the updated user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store (or user) doesn't exist.
    pub async fn toggle_heart(&self, user: UserId, store: StoreId) -> Result<User, StoreError> {
        let hearted = self
            .users
            .toggle_heart(user, store)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => StoreError::NotFound,
                other => StoreError::Repository(other),
            })?;
        tracing::debug!(user_id = %user, store_id = %store, hearted, "heart toggled");

        self.users.get_by_id(user).await?.ok_or(StoreError::NotFound)
    }

    /// Save a review and return the reviewed store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the store doesn't exist.
    pub async fn add_review(
        &self,
        author: UserId,
        store: StoreId,
        review: &NewReview,
    ) -> Result<Store, StoreError> {
        let target = self.get(store).await?;

        self.reviews
            .create(author, store, review)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => StoreError::NotFound,
                other => StoreError::Repository(other),
            })?;

        Ok(target)
    }
}
