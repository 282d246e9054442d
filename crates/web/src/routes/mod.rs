//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Stores
//! GET  /                        - Newest stores, page 1
//! GET  /stores                  - Newest stores, page 1
//! GET  /stores/page/{page}      - Newest stores, given page
//! GET  /store/{slug}            - Store detail with reviews
//! GET  /add                     - Add store form (auth)
//! POST /add                     - Create store, multipart (auth)
//! POST /add/{id}                - Update store, multipart (auth, owner)
//! GET  /stores/{id}/edit        - Edit store form (auth, owner)
//! GET  /tags                    - Tag histogram and every tagged store
//! GET  /tags/{tag}              - Tag histogram and stores with the tag
//! GET  /top                     - Top rated stores
//! GET  /map                     - Map search page
//! GET  /hearts                  - Hearted stores (auth)
//! POST /reviews/{id}            - Add review (auth)
//!
//! # Auth
//! GET  /login      POST /login
//! GET  /register   POST /register
//! GET  /logout
//!
//! # Account
//! GET  /account    POST /account  - Profile (auth)
//! POST /account/forgot            - Email a reset link
//! GET  /account/reset/{token}     - Reset form
//! POST /account/reset/{token}     - Set new password
//!
//! # JSON API
//! GET  /api/search?q=             - Text search
//! GET  /api/stores/near?lat=&lng= - Stores within 10 km
//! POST /api/stores/{id}/heart     - Toggle heart (auth)
//! ```

pub mod account;
pub mod api;
pub mod auth;
pub mod reviews;
pub mod stores;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::middleware::{api_rate_limiter, auth_rate_limiter, current_user, take_flashes};
use crate::models::{CurrentUser, FlashMessage};
use crate::state::AppState;

/// Largest accepted store form, photo included.
const STORE_FORM_LIMIT: usize = 10 * 1024 * 1024;

/// Data every page passes to `base.html`.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub title: String,
    pub user: Option<CurrentUser>,
    pub flashes: Vec<FlashMessage>,
}

impl Layout {
    /// Build the layout for a page, taking any pending flash messages.
    pub async fn load(session: &Session, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            user: current_user(session).await,
            flashes: take_flashes(session).await,
        }
    }

    /// Layout with no session, for error pages.
    #[must_use]
    pub fn anonymous(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Whether anyone is logged in.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Store browsing and editing routes.
fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(stores::index))
        .route("/stores", get(stores::index))
        .route("/stores/page/{page}", get(stores::page))
        .route("/store/{slug}", get(stores::show))
        .route("/add", get(stores::add_form).post(stores::create))
        .route("/add/{id}", post(stores::update))
        .route("/stores/{id}/edit", get(stores::edit_form))
        .route("/tags", get(stores::tags))
        .route("/tags/{tag}", get(stores::tag))
        .route("/top", get(stores::top))
        .route("/map", get(stores::map))
        .route("/hearts", get(stores::hearts))
        .route("/reviews/{id}", post(reviews::create))
        .layer(DefaultBodyLimit::max(STORE_FORM_LIMIT))
}

/// Login, registration, profile and password reset pages.
///
/// The form submissions share one strict rate limiter.
fn auth_routes() -> Router<AppState> {
    let limiter = auth_rate_limiter();

    Router::new()
        .route(
            "/login",
            get(auth::login_page).merge(post(auth::login).layer(limiter.clone())),
        )
        .route(
            "/register",
            get(auth::register_page).merge(post(auth::register).layer(limiter.clone())),
        )
        .route("/logout", get(auth::logout))
        .route("/account", get(account::index).post(account::update))
        .route(
            "/account/forgot",
            post(account::forgot).layer(limiter.clone()),
        )
        .route(
            "/account/reset/{token}",
            get(account::reset_form).merge(post(account::reset).layer(limiter)),
        )
}

/// JSON endpoints used by the search box, the map and the heart buttons.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(api::search))
        .route("/stores/near", get(api::near))
        .route("/stores/{id}/heart", post(api::heart))
        .layer(api_rate_limiter())
}

/// Create all page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(store_routes())
        .merge(auth_routes())
        .nest("/api", api_routes())
}
