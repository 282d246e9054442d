//! Domain models.
//!
//! These types are validated domain objects, separate from database row types.

pub mod review;
pub mod session;
pub mod store;
pub mod user;

pub use review::{NewReview, Review, ReviewView};
pub use session::{CurrentUser, FlashLevel, FlashMessage, keys as session_keys};
pub use store::{
    Location, NearbyStore, Pagination, Store, StoreDetail, StoreDraft, StoreInput, TagCount,
    TopStore,
};
pub use user::User;
