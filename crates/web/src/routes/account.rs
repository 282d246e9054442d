//! Account route handlers.
//!
//! The profile page requires authentication; the password reset flow does not.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use super::Layout;
use super::auth::EMAIL_TAKEN_MESSAGE;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{RequireAuth, flash_error, flash_success, set_current_user};
use crate::models::CurrentUser;
use crate::services::email::deliver_password_reset;
use crate::services::{AuthError, AuthService};
use crate::state::AppState;

const RESET_INVALID_MESSAGE: &str = "Password reset is invalid or has expired";

/// Profile form data.
#[derive(Debug, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Forgot password form data.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordForm {
    #[serde(default)]
    pub email: String,
}

/// Reset password form data.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Profile page template.
#[derive(Template, WebTemplate)]
#[template(path = "account.html")]
pub struct AccountTemplate {
    pub layout: Layout,
    pub name: String,
    pub email: String,
}

/// Reset password page template.
#[derive(Template, WebTemplate)]
#[template(path = "reset.html")]
pub struct ResetTemplate {
    pub layout: Layout,
    pub token: String,
}

// =============================================================================
// Profile
// =============================================================================

/// Display the profile page.
pub async fn index(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
) -> Result<Response, AppError> {
    let user = AuthService::new(state.pool(), state.token_key())
        .get_user(current.id)
        .await?;

    Ok(AccountTemplate {
        layout: Layout::load(&session, "Edit Your Account").await,
        name: user.name,
        email: user.email.into_inner(),
    }
    .into_response())
}

/// Change the current user's name and email.
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(current): RequireAuth,
    Form(form): Form<AccountForm>,
) -> Result<Response, AppError> {
    let auth = AuthService::new(state.pool(), state.token_key());

    match auth.update_profile(current.id, &form.name, &form.email).await {
        Ok(user) => {
            set_current_user(&session, &CurrentUser::from(&user)).await?;
            flash_success(&session, "Updated the profile!").await;
        }
        Err(AuthError::Validation(errors)) => {
            for message in errors {
                flash_error(&session, message).await;
            }
        }
        Err(AuthError::UserAlreadyExists) => {
            flash_error(&session, EMAIL_TAKEN_MESSAGE).await;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(Redirect::to("/account").into_response())
}

// =============================================================================
// Password Reset
// =============================================================================

/// Issue a reset token and email the link.
pub async fn forgot(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<ForgotPasswordForm>,
) -> Result<Response, AppError> {
    let auth = AuthService::new(state.pool(), state.token_key());

    let issued = match auth.issue_reset_token(&form.email, Utc::now()).await {
        Ok(issued) => issued,
        Err(AuthError::UserNotFound) => {
            flash_error(&session, "No account with that email exists.").await;
            return Ok(Redirect::to("/login").into_response());
        }
        Err(e) => return Err(e.into()),
    };

    let reset_url = state
        .config()
        .base_url
        .join(&format!("account/reset/{}", issued.token))
        .map_err(|e| AppError::Internal(format!("Failed to build reset URL: {e}")))?;

    deliver_password_reset(
        state.email(),
        issued.user.email.as_str(),
        &issued.user.name,
        reset_url.as_str(),
    )
    .await?;

    flash_success(&session, "You have been emailed a password reset link.").await;
    Ok(Redirect::to("/login").into_response())
}

/// Display the new-password form for a live token.
pub async fn reset_form(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    if !is_token_shaped(&token) {
        flash_error(&session, RESET_INVALID_MESSAGE).await;
        return Ok(Redirect::to("/login").into_response());
    }

    let auth = AuthService::new(state.pool(), state.token_key());
    match auth.check_reset_token(&token, Utc::now()).await {
        Ok(_) => Ok(ResetTemplate {
            layout: Layout::load(&session, "Reset your Password").await,
            token,
        }
        .into_response()),
        Err(AuthError::InvalidResetToken) => {
            flash_error(&session, RESET_INVALID_MESSAGE).await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Set the new password and log the user in.
pub async fn reset(
    State(state): State<AppState>,
    session: Session,
    Path(token): Path<String>,
    Form(form): Form<ResetPasswordForm>,
) -> Result<Response, AppError> {
    if !is_token_shaped(&token) {
        flash_error(&session, RESET_INVALID_MESSAGE).await;
        return Ok(Redirect::to("/login").into_response());
    }

    let auth = AuthService::new(state.pool(), state.token_key());
    let back = format!("/account/reset/{token}");

    match auth
        .reset_password(&token, &form.password, &form.password_confirm, Utc::now())
        .await
    {
        Ok(user) => {
            set_current_user(&session, &CurrentUser::from(&user)).await?;
            flash_success(
                &session,
                "💃 Nice! Your password has been reset! You are now logged in!",
            )
            .await;
            Ok(Redirect::to("/").into_response())
        }
        Err(AuthError::PasswordMismatch) => {
            flash_error(&session, "Passwords do not match!").await;
            Ok(Redirect::to(&back).into_response())
        }
        Err(AuthError::Validation(errors)) => {
            for message in errors {
                flash_error(&session, message).await;
            }
            Ok(Redirect::to(&back).into_response())
        }
        Err(AuthError::InvalidResetToken) => {
            flash_error(&session, RESET_INVALID_MESSAGE).await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Issued tokens are lowercase hex; anything else can't match and is not
/// echoed back into a redirect.
fn is_token_shaped(token: &str) -> bool {
    !token.is_empty() && token.len() <= 128 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::auth::generate_reset_token;

    #[test]
    fn test_issued_tokens_are_token_shaped() {
        assert!(is_token_shaped(&generate_reset_token()));
    }

    #[test]
    fn test_rejects_odd_tokens() {
        assert!(!is_token_shaped(""));
        assert!(!is_token_shaped("abc\r\nLocation: /evil"));
        assert!(!is_token_shaped("../../etc"));
        assert!(!is_token_shaped(&"a".repeat(129)));
    }

    #[test]
    fn test_reset_page_posts_back_to_token() {
        let html = ResetTemplate {
            layout: Layout::anonymous("Reset your Password"),
            token: "deadbeef".to_string(),
        }
        .render()
        .unwrap();
        assert!(html.contains("action=\"/account/reset/deadbeef\""));
    }
}
