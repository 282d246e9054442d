//! Store page route handlers.

use std::collections::BTreeSet;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use delicious_core::{SUGGESTED_TAGS, StoreId};

use super::Layout;
use crate::db::UserRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAuth, flash_info, flash_success};
use crate::models::{
    FlashLevel, FlashMessage, Pagination, Store, StoreDetail, StoreDraft, StoreInput, TagCount,
    TopStore,
};
use crate::services::{PhotoUpload, StoreService, uploads};
use crate::state::AppState;

// =============================================================================
// Templates
// =============================================================================

/// Stores the current user has hearted, for the heart buttons on cards.
#[derive(Debug, Clone, Default)]
pub struct Hearts(BTreeSet<StoreId>);

impl Hearts {
    /// Whether the card for `store` should show as hearted.
    #[must_use]
    pub fn contains(&self, store: &Store) -> bool {
        self.0.contains(&store.id)
    }
}

/// Paged store listing.
#[derive(Template, WebTemplate)]
#[template(path = "stores.html")]
pub struct StoresTemplate {
    pub layout: Layout,
    pub stores: Vec<Store>,
    pub hearts: Hearts,
    pub page: i64,
    pub pages: i64,
    pub total: i64,
}

/// Single store with its reviews.
#[derive(Template, WebTemplate)]
#[template(path = "store.html")]
pub struct StoreTemplate {
    pub layout: Layout,
    pub detail: StoreDetail,
    pub hearted: bool,
    pub can_edit: bool,
}

/// Add/edit store form.
#[derive(Template, WebTemplate)]
#[template(path = "edit_store.html")]
pub struct EditStoreTemplate {
    pub layout: Layout,
    pub action: String,
    pub input: StoreInput,
    pub photo_url: Option<String>,
}

impl EditStoreTemplate {
    /// Every checkbox to offer: the suggested tags, then any custom ones on the store.
    #[must_use]
    pub fn tag_choices(&self) -> Vec<String> {
        let mut choices: Vec<String> = SUGGESTED_TAGS.iter().map(ToString::to_string).collect();
        for tag in &self.input.tags {
            if !choices.iter().any(|c| c == tag) {
                choices.push(tag.clone());
            }
        }
        choices
    }

    /// Whether `tag` should be pre-checked.
    #[must_use]
    pub fn is_checked(&self, tag: &str) -> bool {
        self.input.tags.iter().any(|t| t == tag)
    }
}

/// Tag histogram with the matching stores.
#[derive(Template, WebTemplate)]
#[template(path = "tags.html")]
pub struct TagsTemplate {
    pub layout: Layout,
    pub tags: Vec<TagCount>,
    pub active: Option<String>,
    pub stores: Vec<Store>,
    pub hearts: Hearts,
}

impl TagsTemplate {
    /// Whether `tag` is the one being filtered on.
    #[must_use]
    pub fn is_active(&self, tag: &str) -> bool {
        self.active.as_deref() == Some(tag)
    }
}

/// Top rated stores.
#[derive(Template, WebTemplate)]
#[template(path = "top.html")]
pub struct TopTemplate {
    pub layout: Layout,
    pub stores: Vec<TopStore>,
}

/// Map search page; results are fetched from the JSON API.
#[derive(Template, WebTemplate)]
#[template(path = "map.html")]
pub struct MapTemplate {
    pub layout: Layout,
}

/// Stores the current user has hearted.
#[derive(Template, WebTemplate)]
#[template(path = "hearts.html")]
pub struct HeartsTemplate {
    pub layout: Layout,
    pub stores: Vec<Store>,
    pub hearts: Hearts,
}

// =============================================================================
// Listing
// =============================================================================

/// First page of the newest-first listing.
pub async fn index(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    listing(&state, &session, Pagination::new(None)).await
}

/// A numbered page of the listing.
pub async fn page(
    State(state): State<AppState>,
    session: Session,
    Path(page): Path<i64>,
) -> Result<Response, AppError> {
    listing(&state, &session, Pagination::new(Some(page))).await
}

async fn listing(
    state: &AppState,
    session: &Session,
    pagination: Pagination,
) -> Result<Response, AppError> {
    let page = StoreService::new(state.pool()).page(pagination).await?;

    if let Some(target) = pagination.redirect_target(page.stores.len(), page.total) {
        flash_info(
            session,
            format!(
                "Hey! You asked for page {}. But that doesn't exist. So I put you on page {target}",
                pagination.page()
            ),
        )
        .await;
        return Ok(Redirect::to(&format!("/stores/page/{target}")).into_response());
    }

    let layout = Layout::load(session, "Stores").await;
    let hearts = hearts_for(state, &layout).await?;

    Ok(StoresTemplate {
        layout,
        stores: page.stores,
        hearts,
        page: pagination.page(),
        pages: Pagination::total_pages(page.total),
        total: page.total,
    }
    .into_response())
}

/// Store detail page.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let detail = StoreService::new(state.pool())
        .detail(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {slug}")))?;

    let layout = Layout::load(&session, detail.store.name.clone()).await;
    let hearted = hearts_for(&state, &layout).await?.contains(&detail.store);
    let can_edit = layout
        .user
        .as_ref()
        .is_some_and(|u| detail.store.is_owned_by(u.id));

    Ok(StoreTemplate {
        layout,
        detail,
        hearted,
        can_edit,
    }
    .into_response())
}

// =============================================================================
// Add / Edit
// =============================================================================

/// Empty add-store form.
pub async fn add_form(
    session: Session,
    RequireAuth(_user): RequireAuth,
) -> Result<Response, AppError> {
    Ok(EditStoreTemplate {
        layout: Layout::load(&session, "Add Store").await,
        action: "/add".to_string(),
        input: StoreInput::default(),
        photo_url: None,
    }
    .into_response())
}

/// Create a store from the multipart form.
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let (input, photo) = read_store_form(multipart).await?;

    let mut draft = match StoreDraft::from_input(&input) {
        Ok(draft) => draft,
        Err(errors) => {
            return Ok(form_with_errors(&session, "Add Store", "/add", input, None, errors).await);
        }
    };
    draft.photo = save_photo(&state, photo).await?;

    let created = StoreService::new(state.pool()).create(user.id, &draft).await;
    let store =
        discard_photo_on_error(&state.upload_dir(), draft.photo.as_deref(), created).await?;

    flash_success(
        &session,
        format!("Successfully created {}. Care to leave a review?", store.name),
    )
    .await;
    Ok(Redirect::to(&format!("/store/{}", store.slug)).into_response())
}

/// Edit form for a store the current user owns.
pub async fn edit_form(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<StoreId>,
) -> Result<Response, AppError> {
    let store = StoreService::new(state.pool()).editable(id, user.id).await?;

    Ok(EditStoreTemplate {
        layout: Layout::load(&session, format!("Edit {}", store.name)).await,
        action: format!("/add/{id}"),
        photo_url: Some(store.photo_url()),
        input: input_from_store(store),
    }
    .into_response())
}

/// Overwrite a store the current user owns.
///
/// A new photo replaces the old one; submitting no file keeps it.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<StoreId>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let service = StoreService::new(state.pool());
    // Ownership is checked before anything is written to disk.
    let current = service.editable(id, user.id).await?;

    let (input, photo) = read_store_form(multipart).await?;
    let mut draft = match StoreDraft::from_input(&input) {
        Ok(draft) => draft,
        Err(errors) => {
            let title = format!("Edit {}", current.name);
            let action = format!("/add/{id}");
            let photo_url = Some(current.photo_url());
            return Ok(form_with_errors(&session, title, &action, input, photo_url, errors).await);
        }
    };
    draft.photo = save_photo(&state, photo).await?;

    let updated = service.update(id, user.id, &draft).await;
    let store =
        discard_photo_on_error(&state.upload_dir(), draft.photo.as_deref(), updated).await?;
    if let (Some(old), Some(new)) = (current.photo.as_deref(), store.photo.as_deref())
        && old != new
    {
        uploads::remove_photo(&state.upload_dir(), old).await;
    }

    flash_success(&session, format!("Successfully updated {}.", store.name)).await;
    Ok(Redirect::to(&format!("/stores/{id}/edit")).into_response())
}

/// Re-render the store form with the submitted values and what was wrong with them.
async fn form_with_errors(
    session: &Session,
    title: impl Into<String>,
    action: &str,
    input: StoreInput,
    photo_url: Option<String>,
    errors: Vec<String>,
) -> Response {
    let mut layout = Layout::load(session, title).await;
    layout
        .flashes
        .extend(errors.into_iter().map(|message| FlashMessage {
            level: FlashLevel::Error,
            message,
        }));

    let page = EditStoreTemplate {
        layout,
        action: action.to_string(),
        input,
        photo_url,
    };
    (StatusCode::BAD_REQUEST, page).into_response()
}

fn input_from_store(store: Store) -> StoreInput {
    StoreInput {
        lng: store.location.lng().to_string(),
        lat: store.location.lat().to_string(),
        name: store.name,
        description: store.description,
        tags: store.tags,
        address: store.location.address,
    }
}

async fn save_photo(
    state: &AppState,
    photo: Option<PhotoUpload>,
) -> Result<Option<String>, AppError> {
    match photo.filter(|p| !p.is_empty()) {
        Some(photo) => Ok(Some(uploads::store_photo(&state.upload_dir(), photo).await?)),
        None => Ok(None),
    }
}

/// Remove a just-written photo when the store row it belongs to wasn't saved.
async fn discard_photo_on_error<T, E>(
    upload_dir: &std::path::Path,
    photo: Option<&str>,
    result: Result<T, E>,
) -> Result<T, E> {
    if result.is_err()
        && let Some(filename) = photo
    {
        uploads::remove_photo(upload_dir, filename).await;
    }
    result
}

/// Pull the store fields and the optional photo out of a multipart form.
///
/// `tags` may repeat; unknown fields are ignored.
async fn read_store_form(
    mut multipart: Multipart,
) -> Result<(StoreInput, Option<PhotoUpload>), AppError> {
    let mut input = StoreInput::default();
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid form data: {e}")))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        if name == "photo" {
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read photo: {e}")))?;
            photo = Some(PhotoUpload {
                content_type,
                bytes: bytes.to_vec(),
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read {name}: {e}")))?;
        match name.as_str() {
            "name" => input.name = value,
            "description" => input.description = value,
            "tags" => input.tags.push(value),
            "address" => input.address = value,
            "lng" => input.lng = value,
            "lat" => input.lat = value,
            _ => {}
        }
    }

    Ok((input, photo))
}

// =============================================================================
// Tags / Top / Map / Hearts
// =============================================================================

/// Tag histogram and every tagged store.
pub async fn tags(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    tag_page(&state, &session, None).await
}

/// Tag histogram and the stores carrying `tag`.
pub async fn tag(
    State(state): State<AppState>,
    session: Session,
    Path(tag): Path<String>,
) -> Result<Response, AppError> {
    tag_page(&state, &session, Some(tag)).await
}

async fn tag_page(
    state: &AppState,
    session: &Session,
    active: Option<String>,
) -> Result<Response, AppError> {
    let (tags, stores) = StoreService::new(state.pool())
        .by_tag(active.as_deref())
        .await?;

    let title = active.as_deref().unwrap_or("Tags").to_string();
    let layout = Layout::load(session, title).await;
    let hearts = hearts_for(state, &layout).await?;

    Ok(TagsTemplate {
        layout,
        tags,
        active,
        stores,
        hearts,
    }
    .into_response())
}

/// Best-rated stores.
pub async fn top(State(state): State<AppState>, session: Session) -> Result<Response, AppError> {
    let stores = StoreService::new(state.pool()).top().await?;

    Ok(TopTemplate {
        layout: Layout::load(&session, "Top Stores").await,
        stores,
    }
    .into_response())
}

/// Map search page.
pub async fn map(session: Session) -> Result<Response, AppError> {
    Ok(MapTemplate {
        layout: Layout::load(&session, "Map").await,
    }
    .into_response())
}

/// Stores the current user has hearted.
pub async fn hearts(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<Response, AppError> {
    let stores = StoreService::new(state.pool()).hearted(user.id).await?;
    let hearts = Hearts(stores.iter().map(|s| s.id).collect());

    Ok(HeartsTemplate {
        layout: Layout::load(&session, "Hearted Stores").await,
        stores,
        hearts,
    }
    .into_response())
}

/// The logged-in user's hearts, empty when nobody is logged in.
async fn hearts_for(state: &AppState, layout: &Layout) -> Result<Hearts, AppError> {
    let Some(user) = &layout.user else {
        return Ok(Hearts::default());
    };
    let user = UserRepository::new(state.pool()).get_by_id(user.id).await?;
    Ok(Hearts(user.map(|u| u.hearts).unwrap_or_default()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use delicious_core::{GeoPoint, Slug, UserId};

    use super::*;
    use crate::models::Location;
    use crate::services::StoreError;

    fn store(id: i32, tags: &[&str]) -> Store {
        Store {
            id: StoreId::new(id),
            name: "Bagel Barn".to_string(),
            slug: Slug::from_name("Bagel Barn"),
            description: "Fresh".to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            location: Location {
                point: GeoPoint::new(-79.38, 43.65).unwrap(),
                address: "1 King St W".to_string(),
            },
            photo: None,
            author: UserId::new(1),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hearts_contains() {
        let hearts = Hearts([StoreId::new(2)].into_iter().collect());
        assert!(hearts.contains(&store(2, &[])));
        assert!(!hearts.contains(&store(3, &[])));
        assert!(!Hearts::default().contains(&store(2, &[])));
    }

    #[tokio::test]
    async fn test_failed_write_discards_new_photo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.png"), b"x").unwrap();

        let failed: Result<(), StoreError> = Err(StoreError::SlugExhausted("pie".to_string()));
        let result = discard_photo_on_error(dir.path(), Some("fresh.png"), failed).await;
        assert!(matches!(result, Err(StoreError::SlugExhausted(_))));
        assert!(!dir.path().join("fresh.png").exists());
    }

    #[tokio::test]
    async fn test_successful_write_keeps_new_photo() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fresh.png"), b"x").unwrap();

        let saved: Result<i32, StoreError> = Ok(7);
        let result = discard_photo_on_error(dir.path(), Some("fresh.png"), saved).await;
        assert_eq!(result.unwrap(), 7);
        assert!(dir.path().join("fresh.png").exists());
    }

    #[test]
    fn test_input_from_store_round_trips_fields() {
        let input = input_from_store(store(1, &["Wifi"]));
        assert_eq!(input.name, "Bagel Barn");
        assert_eq!(input.lng, "-79.38");
        assert_eq!(input.lat, "43.65");
        assert_eq!(input.tags, vec!["Wifi"]);
        assert!(StoreDraft::from_input(&input).is_ok());
    }

    #[test]
    fn test_tag_choices_include_custom_tags_once() {
        let page = EditStoreTemplate {
            layout: Layout::anonymous("Edit"),
            action: "/add/1".to_string(),
            input: StoreInput {
                tags: vec!["Wifi".to_string(), "Patio".to_string()],
                ..StoreInput::default()
            },
            photo_url: None,
        };
        let choices = page.tag_choices();
        assert_eq!(choices.len(), SUGGESTED_TAGS.len() + 1);
        assert_eq!(choices.last().unwrap(), "Patio");
        assert!(page.is_checked("Wifi"));
        assert!(!page.is_checked("Licensed"));
    }

    #[test]
    fn test_add_form_renders_suggested_tags() {
        let html = EditStoreTemplate {
            layout: Layout::anonymous("Add Store"),
            action: "/add".to_string(),
            input: StoreInput::default(),
            photo_url: None,
        }
        .render()
        .unwrap();
        assert!(html.contains("action=\"/add\""));
        for tag in SUGGESTED_TAGS {
            assert!(html.contains(tag));
        }
    }
}
