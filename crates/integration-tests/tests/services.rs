//! Service-level integration tests.
//!
//! These tests require:
//! - A migrated `PostgreSQL` database (`delicious-cli migrate`)
//! - `DELICIOUS_DATABASE_URL` pointing at it
//!
//! Run with: cargo test -p delicious-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration, Utc};

use delicious_core::{GeoPoint, Rating};
use delicious_integration_tests::{TEST_PASSWORD, create_user, pool, token_key, unique};
use delicious_web::models::{Location, NewReview, StoreDraft};
use delicious_web::services::auth::RESET_TOKEN_TTL;
use delicious_web::services::{AuthError, AuthService, StoreError, StoreService};

fn draft(name: &str, lng: f64, lat: f64) -> StoreDraft {
    StoreDraft {
        name: name.to_string(),
        description: "Integration test store".to_string(),
        tags: vec!["Wifi".to_string()],
        location: Location {
            point: GeoPoint::new(lng, lat).unwrap(),
            address: "1 Test Street".to_string(),
        },
        photo: None,
    }
}

// =============================================================================
// Slugs
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_slugs_get_sequential_suffixes() {
    let pool = pool().await;
    let owner = create_user(&pool, "Slugger").await;
    let stores = StoreService::new(&pool);
    let name = format!("Slug Test {}", unique());

    let first = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    let second = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    let third = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();

    let base = first.slug.as_str().to_string();
    assert_eq!(second.slug.as_str(), format!("{base}-2"));
    assert_eq!(third.slug.as_str(), format!("{base}-3"));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_update_keeps_slug_unless_renamed() {
    let pool = pool().await;
    let owner = create_user(&pool, "Renamer").await;
    let stores = StoreService::new(&pool);
    let name = format!("Rename Test {}", unique());

    let store = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();

    let mut same_name = draft(&name, 1.0, 1.0);
    same_name.description = "Changed".to_string();
    let updated = stores.update(store.id, owner.id, &same_name).await.unwrap();
    assert_eq!(updated.slug, store.slug);
    assert_eq!(updated.description, "Changed");

    let renamed = stores
        .update(store.id, owner.id, &draft(&format!("{name} Two"), 1.0, 1.0))
        .await
        .unwrap();
    assert_eq!(renamed.slug.as_str(), format!("{}-two", store.slug));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_create_skips_past_slug_left_by_rename() {
    let pool = pool().await;
    let owner = create_user(&pool, "Baker").await;
    let stores = StoreService::new(&pool);
    let tag = unique();
    let name = format!("Pie {tag}");

    let first = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    let second = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    let base = first.slug.as_str().to_string();
    assert_eq!(second.slug.as_str(), format!("{base}-2"));

    // Only `-2` is left, so the count points back at a taken slug.
    stores
        .update(first.id, owner.id, &draft(&format!("Crumble {tag}"), 0.0, 0.0))
        .await
        .unwrap();

    let third = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    assert_eq!(third.slug.as_str(), format!("{base}-3"));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_rename_skips_past_slug_left_by_rename() {
    let pool = pool().await;
    let owner = create_user(&pool, "Pastry").await;
    let stores = StoreService::new(&pool);
    let tag = unique();
    let name = format!("Tart {tag}");

    let first = stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    stores.create(owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    let cake = stores
        .create(owner.id, &draft(&format!("Cake {tag}"), 0.0, 0.0))
        .await
        .unwrap();

    stores
        .update(first.id, owner.id, &draft(&format!("Scone {tag}"), 0.0, 0.0))
        .await
        .unwrap();

    let renamed = stores.update(cake.id, owner.id, &draft(&name, 0.0, 0.0)).await.unwrap();
    assert_eq!(renamed.slug.as_str(), format!("{}-3", first.slug));
}

// =============================================================================
// Ownership
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_non_owner_cannot_edit() {
    let pool = pool().await;
    let owner = create_user(&pool, "Owner").await;
    let intruder = create_user(&pool, "Intruder").await;
    let stores = StoreService::new(&pool);

    let store = stores
        .create(owner.id, &draft(&format!("Owned {}", unique()), 0.0, 0.0))
        .await
        .unwrap();

    assert!(matches!(
        stores.editable(store.id, intruder.id).await,
        Err(StoreError::NotOwner)
    ));
    assert!(matches!(
        stores
            .update(store.id, intruder.id, &draft("Stolen", 0.0, 0.0))
            .await,
        Err(StoreError::NotOwner)
    ));

    let unchanged = stores.get(store.id).await.unwrap();
    assert_eq!(unchanged.name, store.name);
}

// =============================================================================
// Hearts
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_heart_toggles_back_and_forth() {
    let pool = pool().await;
    let user = create_user(&pool, "Hearter").await;
    let stores = StoreService::new(&pool);
    let store = stores
        .create(user.id, &draft(&format!("Hearted {}", unique()), 0.0, 0.0))
        .await
        .unwrap();

    let after_first = stores.toggle_heart(user.id, store.id).await.unwrap();
    assert!(after_first.has_hearted(store.id));
    let hearted = stores.hearted(user.id).await.unwrap();
    assert!(hearted.iter().any(|s| s.id == store.id));

    let after_second = stores.toggle_heart(user.id, store.id).await.unwrap();
    assert!(!after_second.has_hearted(store.id));
    assert!(stores.hearted(user.id).await.unwrap().is_empty());
}

// =============================================================================
// Geo search
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_near_returns_stores_within_radius_nearest_first() {
    let pool = pool().await;
    let owner = create_user(&pool, "Mapper").await;
    let stores = StoreService::new(&pool);
    let tag = unique();

    // Open ocean, nothing else should be seeded here.
    let (lng, lat) = (-140.0, -50.0);
    let five_km = stores
        .create(owner.id, &draft(&format!("Five {tag}"), lng, lat + 0.045))
        .await
        .unwrap();
    let one_km = stores
        .create(owner.id, &draft(&format!("One {tag}"), lng, lat + 0.009))
        .await
        .unwrap();
    let twenty_km = stores
        .create(owner.id, &draft(&format!("Twenty {tag}"), lng, lat + 0.18))
        .await
        .unwrap();

    let found = stores.near(GeoPoint::new(lng, lat).unwrap()).await.unwrap();
    let ours: Vec<_> = found
        .iter()
        .filter(|s| s.name.ends_with(&tag))
        .map(|s| s.slug.clone())
        .collect();

    assert_eq!(ours, vec![one_km.slug, five_km.slug]);
    assert!(!found.iter().any(|s| s.slug == twenty_km.slug));
    assert!(found.len() <= 10);
    assert!(found.windows(2).all(|w| w[0].distance_meters <= w[1].distance_meters));
}

// =============================================================================
// Reviews and ranking
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_reviews_show_on_detail_newest_first() {
    let pool = pool().await;
    let owner = create_user(&pool, "Reviewed").await;
    let critic = create_user(&pool, "Critic").await;
    let stores = StoreService::new(&pool);
    let store = stores
        .create(owner.id, &draft(&format!("Review Me {}", unique()), 0.0, 0.0))
        .await
        .unwrap();

    for (text, rating) in [("first", 2), ("second", 5)] {
        let review = NewReview {
            text: text.to_string(),
            rating: Rating::new(rating).unwrap(),
        };
        stores.add_review(critic.id, store.id, &review).await.unwrap();
    }

    let detail = stores.detail(store.slug.as_str()).await.unwrap().unwrap();
    assert_eq!(detail.author_name, owner.name);
    assert_eq!(detail.reviews.len(), 2);
    assert_eq!(detail.reviews[0].text, "second");
    assert_eq!(detail.reviews[0].author_name, critic.name);
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_top_needs_two_reviews_and_ranks_by_average() {
    let pool = pool().await;
    let owner = create_user(&pool, "Ranked").await;
    let critic = create_user(&pool, "Judge").await;
    let stores = StoreService::new(&pool);
    let tag = unique();

    let review = |rating| NewReview {
        text: "ranked".to_string(),
        rating: Rating::new(rating).unwrap(),
    };

    let lonely = stores
        .create(owner.id, &draft(&format!("Lonely {tag}"), 0.0, 0.0))
        .await
        .unwrap();
    stores.add_review(critic.id, lonely.id, &review(5)).await.unwrap();

    let great = stores
        .create(owner.id, &draft(&format!("Great {tag}"), 0.0, 0.0))
        .await
        .unwrap();
    for rating in [5, 5] {
        stores.add_review(critic.id, great.id, &review(rating)).await.unwrap();
    }

    let top = stores.top().await.unwrap();
    assert!(top.len() <= 10);
    assert!(top.iter().all(|s| s.review_count >= 2));
    assert!(top.windows(2).all(|w| w[0].average_rating >= w[1].average_rating));
    assert!(!top.iter().any(|s| s.id == lonely.id));

    // A perfect score ranks unless ten other perfect stores already fill the list.
    let full_of_perfect = top.len() == 10 && top.iter().all(|s| s.average_rating >= 5.0);
    if !full_of_perfect {
        let ours = top.iter().find(|s| s.id == great.id).unwrap();
        assert_eq!(ours.review_count, 2);
        assert!((ours.average_rating - 5.0).abs() < f64::EPSILON);
    }
}

// =============================================================================
// Tags and search
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_tag_counts_sorted_by_count_then_name() {
    let pool = pool().await;
    let owner = create_user(&pool, "Tagger").await;
    let stores = StoreService::new(&pool);
    let tag = unique();
    let busy = format!("zz-busy-{tag}");
    let quiet = format!("aa-quiet-{tag}");
    let also_quiet = format!("mm-quiet-{tag}");

    for (i, tags) in [
        vec![busy.clone()],
        vec![busy.clone(), also_quiet.clone(), quiet.clone()],
    ]
    .into_iter()
    .enumerate()
    {
        let mut store = draft(&format!("Tagged {tag} {i}"), 0.0, 0.0);
        store.tags = tags;
        stores.create(owner.id, &store).await.unwrap();
    }

    let (counts, tagged) = stores.by_tag(Some(quiet.as_str())).await.unwrap();
    assert_eq!(tagged.len(), 1);

    let position = |name: &str| counts.iter().position(|t| t.tag == name).unwrap();
    assert_eq!(counts[position(&busy)].count, 2);
    assert_eq!(counts[position(&quiet)].count, 1);
    assert_eq!(counts[position(&also_quiet)].count, 1);
    assert!(position(&busy) < position(&quiet));
    assert!(position(&quiet) < position(&also_quiet));
    assert!(counts.windows(2).all(|w| w[0].count >= w[1].count));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_search_returns_at_most_five() {
    let pool = pool().await;
    let owner = create_user(&pool, "Searcher").await;
    let stores = StoreService::new(&pool);
    let word = format!("qx{}", unique());

    for i in 0..6 {
        stores
            .create(owner.id, &draft(&format!("Cafe {word} {i}"), 0.0, 0.0))
            .await
            .unwrap();
    }

    let found = stores.search(&word).await.unwrap();
    assert_eq!(found.len(), 5);
    assert!(found.iter().all(|s| s.name.contains(&word)));
    assert!(stores.search("   ").await.unwrap().is_empty());
}

// =============================================================================
// Password reset
// =============================================================================

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_reset_token_expires_and_is_single_use() {
    let pool = pool().await;
    let key = token_key();
    let auth = AuthService::new(&pool, &key);
    let user = create_user(&pool, "Forgetful").await;
    let issued_at = Utc::now();

    let issued = auth
        .issue_reset_token(user.email.as_str(), issued_at)
        .await
        .unwrap();
    assert_eq!(issued.expires_at, issued_at + RESET_TOKEN_TTL);

    // Valid just before expiry, rejected at the expiry instant.
    let just_before = issued.expires_at - Duration::seconds(1);
    assert!(auth.check_reset_token(&issued.token, just_before).await.is_ok());
    assert!(matches!(
        auth.check_reset_token(&issued.token, issued.expires_at).await,
        Err(AuthError::InvalidResetToken)
    ));

    let new_password = "a-brand-new-password";
    auth.reset_password(&issued.token, new_password, new_password, just_before)
        .await
        .unwrap();

    assert!(matches!(
        auth.reset_password(&issued.token, new_password, new_password, just_before)
            .await,
        Err(AuthError::InvalidResetToken)
    ));
    assert!(auth.login(user.email.as_str(), new_password).await.is_ok());
    assert!(matches!(
        auth.login(user.email.as_str(), TEST_PASSWORD).await,
        Err(AuthError::InvalidCredentials)
    ));
}

#[tokio::test]
#[ignore = "Requires a migrated PostgreSQL database"]
async fn test_duplicate_email_is_rejected_case_insensitively() {
    let pool = pool().await;
    let key = token_key();
    let auth = AuthService::new(&pool, &key);
    let user = create_user(&pool, "Original").await;

    let err = auth
        .register(&delicious_web::services::Registration {
            name: "Copycat".to_string(),
            email: user.email.as_str().to_uppercase(),
            password: TEST_PASSWORD.to_string(),
            password_confirm: TEST_PASSWORD.to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserAlreadyExists));
}
