//! Core types for Delicious.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod geo;
pub mod id;
pub mod rating;
pub mod slug;
pub mod tag;

pub use email::{Email, EmailError};
pub use geo::{GeoError, GeoPoint};
pub use id::*;
pub use rating::{Rating, RatingError};
pub use slug::Slug;
pub use tag::{SUGGESTED_TAGS, normalize_tags};
