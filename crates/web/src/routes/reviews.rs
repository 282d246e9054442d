//! Review route handlers.

use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use delicious_core::StoreId;

use crate::error::AppError;
use crate::middleware::{RequireAuth, flash_error, flash_success};
use crate::models::NewReview;
use crate::services::StoreService;
use crate::state::AppState;

/// Review form data.
///
/// `rating` is a radio group, so it is missing when nothing was picked.
#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub text: String,
    pub rating: Option<String>,
}

impl ReviewForm {
    fn parse(&self) -> Result<NewReview, String> {
        let rating = match self.rating.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| "Please pick a rating!".to_string())?,
            ),
        };
        NewReview::parse(&self.text, rating)
    }
}

/// Add a review to a store and return to its page.
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<StoreId>,
    Form(form): Form<ReviewForm>,
) -> Result<Response, AppError> {
    let service = StoreService::new(state.pool());

    let review = match form.parse() {
        Ok(review) => review,
        Err(message) => {
            let store = service.get(id).await?;
            flash_error(&session, message).await;
            return Ok(Redirect::to(&format!("/store/{}", store.slug)).into_response());
        }
    };

    let store = service.add_review(user.id, id, &review).await?;
    tracing::info!(store_id = %id, user_id = %user.id, rating = %review.rating, "review saved");

    flash_success(&session, "Review Saved!").await;
    Ok(Redirect::to(&format!("/store/{}", store.slug)).into_response())
}
