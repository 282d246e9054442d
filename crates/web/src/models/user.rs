//! User domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use delicious_core::{Email, StoreId, UserId};

/// A registered user (domain type).
///
/// Credential material and reset state stay in the repository; this is the
/// representation handlers render and return as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Stores this user has hearted.
    pub hearts: BTreeSet<StoreId>,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether `store` is in this user's hearts.
    #[must_use]
    pub fn has_hearted(&self, store: StoreId) -> bool {
        self.hearts.contains(&store)
    }

    /// Record the outcome of a heart toggle.
    pub fn set_heart(&mut self, store: StoreId, hearted: bool) {
        if hearted {
            self.hearts.insert(store);
        } else {
            self.hearts.remove(&store);
        }
    }

    /// Flip `store` in the heart set and return whether it is now hearted.
    pub fn toggle_heart(&mut self, store: StoreId) -> bool {
        let hearted = !self.has_hearted(store);
        self.set_heart(store, hearted);
        hearted
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("wes@example.com").unwrap(),
            name: "Wes".to_string(),
            hearts: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_toggle_twice_restores() {
        let mut user = user();
        let store = StoreId::new(9);

        assert!(user.toggle_heart(store));
        assert!(user.has_hearted(store));
        assert!(!user.toggle_heart(store));
        assert!(!user.has_hearted(store));
    }

    #[test]
    fn test_set_heart_has_set_semantics() {
        let mut user = user();
        user.set_heart(StoreId::new(3), true);
        user.set_heart(StoreId::new(3), true);
        assert_eq!(user.hearts.len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut user = user();
        user.set_heart(StoreId::new(5), true);
        user.set_heart(StoreId::new(2), true);

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "wes@example.com");
        assert_eq!(json["hearts"], serde_json::json!([2, 5]));
        assert!(json.get("password_hash").is_none());
    }
}
