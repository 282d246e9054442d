//! Review domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use delicious_core::{Rating, ReviewId, StoreId, UserId};

/// Maximum review length in characters.
pub const MAX_REVIEW_LENGTH: usize = 2000;

/// A stored review.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub author: UserId,
    pub store: StoreId,
    pub text: String,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
}

/// A review as shown on the store page, with the author's name.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewView {
    pub author_name: String,
    pub text: String,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
}

impl ReviewView {
    /// Filled and empty stars, e.g. `★★★☆☆`.
    #[must_use]
    pub fn stars(&self) -> String {
        let filled = usize::from(self.rating.get());
        let empty = usize::from(Rating::MAX) - filled;
        format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
    }

    /// Short date for display.
    #[must_use]
    pub fn date(&self) -> String {
        self.created_at.format("%b %-d, %Y").to_string()
    }
}

/// A validated review submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub text: String,
    pub rating: Rating,
}

impl NewReview {
    /// Validate the review form fields.
    ///
    /// # Errors
    ///
    /// Returns a user-facing message for the first invalid field.
    pub fn parse(text: &str, rating: Option<i64>) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("Your review needs some text!".to_string());
        }
        if text.chars().count() > MAX_REVIEW_LENGTH {
            return Err(format!(
                "Reviews are limited to {MAX_REVIEW_LENGTH} characters."
            ));
        }
        let rating = rating
            .ok_or_else(|| "Please pick a rating!".to_string())
            .and_then(|r| Rating::new(r).map_err(|e| e.to_string()))?;

        Ok(Self {
            text: text.to_string(),
            rating,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let review = NewReview::parse("  Great coffee ", Some(4)).unwrap();
        assert_eq!(review.text, "Great coffee");
        assert_eq!(review.rating.get(), 4);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(NewReview::parse("   ", Some(3)).is_err());
        assert!(NewReview::parse("ok", None).is_err());
        assert!(NewReview::parse("ok", Some(6)).is_err());
        assert!(NewReview::parse(&"a".repeat(MAX_REVIEW_LENGTH + 1), Some(3)).is_err());
    }

    #[test]
    fn test_stars() {
        let view = ReviewView {
            author_name: "Wes".to_string(),
            text: "ok".to_string(),
            rating: Rating::new(3).unwrap(),
            created_at: Utc::now(),
        };
        assert_eq!(view.stars(), "★★★☆☆");
    }
}
