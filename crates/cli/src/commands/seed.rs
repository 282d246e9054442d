//! Load sample users, stores and reviews from a YAML file.
//!
//! Everything goes through the same services the site uses, so passwords are
//! hashed and slugs are assigned exactly as they would be from the forms.
//! Users that already exist are logged in instead of re-registered, which
//! makes the command safe to re-run for users; stores are always added.

use std::collections::HashMap;
use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{info, warn};

use delicious_core::UserId;
use delicious_web::models::{NewReview, StoreDraft, StoreInput, User};
use delicious_web::services::{AuthError, AuthService, Registration, StoreService};

/// Top level of the seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub stores: Vec<SeedStore>,
}

/// A user to register.
#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// A store and its reviews, authored by one of the seed users.
#[derive(Debug, Deserialize)]
pub struct SeedStore {
    pub author: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub address: String,
    pub lng: f64,
    pub lat: f64,
    #[serde(default)]
    pub reviews: Vec<SeedReview>,
}

/// A review by one of the seed users.
#[derive(Debug, Deserialize)]
pub struct SeedReview {
    pub author: String,
    pub rating: i64,
    pub text: String,
}

impl SeedStore {
    fn input(&self) -> StoreInput {
        StoreInput {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            address: self.address.clone(),
            lng: self.lng.to_string(),
            lat: self.lat.to_string(),
        }
    }
}

/// Check references between users, stores and reviews before touching the database.
fn validate(seed: &SeedFile) -> Vec<String> {
    let emails: Vec<String> = seed
        .users
        .iter()
        .map(|u| u.email.trim().to_lowercase())
        .collect();
    let known = |email: &str| emails.iter().any(|e| *e == email.trim().to_lowercase());

    let mut errors = Vec::new();
    for store in &seed.stores {
        if !known(&store.author) {
            errors.push(format!("{}: unknown author {}", store.name, store.author));
        }
        if let Err(problems) = StoreDraft::from_input(&store.input()) {
            errors.extend(problems.into_iter().map(|p| format!("{}: {p}", store.name)));
        }
        for review in &store.reviews {
            if !known(&review.author) {
                errors.push(format!(
                    "{}: review by unknown author {}",
                    store.name, review.author
                ));
            }
            if let Err(problem) = NewReview::parse(&review.text, Some(review.rating)) {
                errors.push(format!("{}: {problem}", store.name));
            }
        }
    }
    errors
}

/// Seed the database from `path`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or invalid, or a database
/// operation fails.
pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!(path = %path.display(), "Loading seed data");
    let content = tokio::fs::read_to_string(path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        for err in &errors {
            warn!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = super::connect().await?;

    // Only reset tokens use the key; seeding never issues one.
    let token_key = SecretString::from(
        std::env::var("DELICIOUS_SESSION_SECRET").unwrap_or_default(),
    );
    let auth = AuthService::new(&pool, &token_key);
    let stores = StoreService::new(&pool);

    let mut users: HashMap<String, UserId> = HashMap::new();
    for seed_user in &seed.users {
        let user = register_or_login(&auth, seed_user).await?;
        users.insert(user.email.as_str().to_string(), user.id);
    }
    info!(count = users.len(), "Users ready");

    let author_of = |email: &str| -> Result<UserId, String> {
        users
            .get(&email.trim().to_lowercase())
            .copied()
            .ok_or_else(|| format!("unknown author {email}"))
    };

    let mut review_count = 0;
    for seed_store in &seed.stores {
        let draft = StoreDraft::from_input(&seed_store.input()).map_err(|e| e.join("; "))?;
        let store = stores.create(author_of(&seed_store.author)?, &draft).await?;
        info!(slug = %store.slug, "Store created");

        for seed_review in &seed_store.reviews {
            let review = NewReview::parse(&seed_review.text, Some(seed_review.rating))?;
            stores
                .add_review(author_of(&seed_review.author)?, store.id, &review)
                .await?;
            review_count += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Users: {}", users.len());
    info!("  Stores: {}", seed.stores.len());
    info!("  Reviews: {review_count}");
    Ok(())
}

async fn register_or_login(auth: &AuthService<'_>, seed: &SeedUser) -> Result<User, AuthError> {
    let registration = Registration {
        name: seed.name.clone(),
        email: seed.email.clone(),
        password: seed.password.clone(),
        password_confirm: seed.password.clone(),
    };
    match auth.register(&registration).await {
        Err(AuthError::UserAlreadyExists) => {
            info!(email = %seed.email, "User exists, reusing");
            auth.login(&seed.email, &seed.password).await
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../../data/sample.yaml");

    #[test]
    fn test_sample_file_is_valid() {
        let seed: SeedFile = serde_yaml::from_str(SAMPLE).unwrap();
        assert!(!seed.users.is_empty());
        assert!(!seed.stores.is_empty());
        assert!(validate(&seed).is_empty(), "{:?}", validate(&seed));
    }

    #[test]
    fn test_validate_reports_unknown_authors_and_bad_reviews() {
        let seed: SeedFile = serde_yaml::from_str(
            r"
users:
  - name: Wes
    email: wes@example.com
    password: hunter2hunter2
stores:
  - author: nobody@example.com
    name: Ghost Cafe
    address: 1 Nowhere
    lng: 0
    lat: 100
    reviews:
      - author: WES@example.com
        rating: 9
        text: hmm
",
        )
        .unwrap();

        let errors = validate(&seed);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors[0].contains("unknown author nobody@example.com"));
        assert!(errors[1].contains("Invalid coordinates"));
    }
}
