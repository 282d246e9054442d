//! Store domain types.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer, ser::SerializeStruct};

use delicious_core::{GeoPoint, Slug, StoreId, UserId, normalize_tags};

use super::ReviewView;

/// Stores shown per listing page.
pub const STORES_PER_PAGE: i64 = 4;

/// Image shown for stores without an uploaded photo.
pub const DEFAULT_PHOTO_URL: &str = "/public/images/photos/store.png";

/// A store's position and street address.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub point: GeoPoint,
    pub address: String,
}

impl Location {
    /// Longitude in degrees.
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.point.lng()
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.point.lat()
    }
}

/// Serialized GeoJSON-style: `{"type":"Point","coordinates":[lng,lat],"address":...}`.
impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Location", 3)?;
        s.serialize_field("type", "Point")?;
        s.serialize_field("coordinates", &[self.point.lng(), self.point.lat()])?;
        s.serialize_field("address", &self.address)?;
        s.end()
    }
}

/// A store listing.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
    pub author: UserId,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// URL of the store photo, or the placeholder.
    #[must_use]
    pub fn photo_url(&self) -> String {
        photo_url(self.photo.as_deref())
    }

    /// Whether `user` may edit this store.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.author == user
    }

    /// First words of the description for listing cards.
    #[must_use]
    pub fn excerpt(&self) -> String {
        const WORDS: usize = 25;
        let mut words = self.description.split_whitespace();
        let head: Vec<&str> = words.by_ref().take(WORDS).collect();
        let mut out = head.join(" ");
        if words.next().is_some() {
            out.push('…');
        }
        out
    }
}

/// Public path for an uploaded photo filename.
#[must_use]
pub fn photo_url(photo: Option<&str>) -> String {
    photo.map_or_else(
        || DEFAULT_PHOTO_URL.to_string(),
        |p| format!("/public/uploads/{p}"),
    )
}

/// Raw store form fields as submitted.
#[derive(Debug, Clone, Default)]
pub struct StoreInput {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub address: String,
    pub lng: String,
    pub lat: String,
}

/// Validated store fields ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDraft {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
}

impl StoreDraft {
    /// Validate form input, collecting every problem.
    ///
    /// # Errors
    ///
    /// Returns the list of user-facing messages when any field is invalid.
    pub fn from_input(input: &StoreInput) -> Result<Self, Vec<String>> {
        let mut errors = Vec::new();

        let name = input.name.trim().to_string();
        if name.is_empty() {
            errors.push("Please enter a store name!".to_string());
        }

        let address = input.address.trim().to_string();
        if address.is_empty() {
            errors.push("You must supply an address!".to_string());
        }

        let lng = input.lng.trim().parse::<f64>();
        let lat = input.lat.trim().parse::<f64>();
        let point = match (lng, lat) {
            (Ok(lng), Ok(lat)) => match GeoPoint::new(lng, lat) {
                Ok(point) => Some(point),
                Err(e) => {
                    errors.push(format!("Invalid coordinates: {e}"));
                    None
                }
            },
            _ => {
                errors.push("You must supply coordinates!".to_string());
                None
            }
        };

        match point {
            Some(point) if errors.is_empty() => Ok(Self {
                name,
                description: input.description.trim().to_string(),
                tags: normalize_tags(&input.tags),
                location: Location { point, address },
                photo: None,
            }),
            _ => Err(errors),
        }
    }
}

/// A store together with its author and reviews.
#[derive(Debug, Clone)]
pub struct StoreDetail {
    pub store: Store,
    pub author_name: String,
    pub reviews: Vec<ReviewView>,
}

/// One row of the tag histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// A store in the top-rated view.
#[derive(Debug, Clone, Serialize)]
pub struct TopStore {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub photo: Option<String>,
    pub review_count: i64,
    pub average_rating: f64,
}

impl TopStore {
    /// URL of the store photo, or the placeholder.
    #[must_use]
    pub fn photo_url(&self) -> String {
        photo_url(self.photo.as_deref())
    }

    /// Average rating rounded to one decimal.
    #[must_use]
    pub fn average_display(&self) -> String {
        format!("{:.1}", self.average_rating)
    }
}

/// A store returned by the proximity search.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyStore {
    pub slug: Slug,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub photo: Option<String>,
    pub distance_meters: f64,
}

/// Page window for the store listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: i64,
}

impl Pagination {
    /// Window for a requested page; anything below 1 means page 1.
    #[must_use]
    pub fn new(page: Option<i64>) -> Self {
        Self {
            page: page.filter(|p| *p >= 1).unwrap_or(1),
        }
    }

    /// The requested page number.
    #[must_use]
    pub const fn page(self) -> i64 {
        self.page
    }

    /// Rows per page.
    #[must_use]
    pub const fn limit(self) -> i64 {
        STORES_PER_PAGE
    }

    /// Rows to skip before this page.
    #[must_use]
    pub const fn skip(self) -> i64 {
        self.page.saturating_mul(STORES_PER_PAGE) - STORES_PER_PAGE
    }

    /// Number of pages needed for `total` stores, `ceil(total / per_page)`.
    #[must_use]
    pub const fn total_pages(total: i64) -> i64 {
        (total + STORES_PER_PAGE - 1) / STORES_PER_PAGE
    }

    /// Page to redirect to when this page came back empty past the start.
    ///
    /// Returns `None` when the page should render as is.
    #[must_use]
    pub fn redirect_target(self, found: usize, total: i64) -> Option<i64> {
        if found == 0 && self.skip() > 0 {
            Some(Self::total_pages(total).max(1))
        } else {
            None
        }
    }
}
