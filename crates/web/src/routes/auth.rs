//! Authentication route handlers.
//!
//! Handles login, registration and logout with locally stored accounts.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use super::Layout;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{clear_current_user, flash_error, flash_success, set_current_user};
use crate::models::{CurrentUser, FlashLevel, FlashMessage};
use crate::services::{AuthError, AuthService, Registration};
use crate::state::AppState;

/// Shown when registering or updating a profile with an email already in use.
pub const EMAIL_TAKEN_MESSAGE: &str = "That email is already registered!";

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

impl From<RegisterForm> for Registration {
    fn from(form: RegisterForm) -> Self {
        Self {
            name: form.name,
            email: form.email,
            password: form.password,
            password_confirm: form.password_confirm,
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Login page, with the forgot-password form underneath.
#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub layout: Layout,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub layout: Layout,
    pub name: String,
    pub email: String,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(session: Session) -> Result<Response, AppError> {
    Ok(LoginTemplate {
        layout: Layout::load(&session, "Login").await,
    }
    .into_response())
}

/// Handle login form submission.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let auth = AuthService::new(state.pool(), state.token_key());

    match auth.login(&form.email, &form.password).await {
        Ok(user) => {
            set_current_user(&session, &CurrentUser::from(&user)).await?;
            tracing::info!(user_id = %user.id, "user logged in");
            flash_success(&session, "You are now logged in!").await;
            Ok(Redirect::to("/").into_response())
        }
        Err(AuthError::InvalidCredentials) => {
            tracing::debug!("login failed");
            flash_error(&session, "Failed Login!").await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(session: Session) -> Result<Response, AppError> {
    Ok(RegisterTemplate {
        layout: Layout::load(&session, "Register").await,
        name: String::new(),
        email: String::new(),
    }
    .into_response())
}

/// Handle registration form submission.
///
/// Problems with the form re-render it with the name and email kept.
/// A successful registration logs the new user in.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let registration = Registration::from(form);
    let auth = AuthService::new(state.pool(), state.token_key());

    let errors = match auth.register(&registration).await {
        Ok(user) => {
            set_current_user(&session, &CurrentUser::from(&user)).await?;
            flash_success(&session, "You are now logged in!").await;
            return Ok(Redirect::to("/").into_response());
        }
        Err(AuthError::Validation(errors)) => errors,
        Err(AuthError::UserAlreadyExists) => vec![EMAIL_TAKEN_MESSAGE.to_string()],
        Err(e) => return Err(e.into()),
    };

    let mut layout = Layout::load(&session, "Register").await;
    layout
        .flashes
        .extend(errors.into_iter().map(|message| FlashMessage {
            level: FlashLevel::Error,
            message,
        }));

    let page = RegisterTemplate {
        layout,
        name: registration.name,
        email: registration.email,
    };
    Ok((StatusCode::BAD_REQUEST, page).into_response())
}

// =============================================================================
// Logout
// =============================================================================

/// Log out and go home.
pub async fn logout(session: Session) -> Result<Response, AppError> {
    clear_current_user(&session).await?;
    flash_success(&session, "You are now logged out! 👋").await;
    Ok(Redirect::to("/").into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_page_keeps_submitted_values() {
        let html = RegisterTemplate {
            layout: Layout::anonymous("Register"),
            name: "Wes <b>".to_string(),
            email: "wes@example.com".to_string(),
        }
        .render()
        .unwrap();
        assert!(html.contains("wes@example.com"));
        assert!(html.contains("Wes &#60;b&#62;") || html.contains("Wes &lt;b&gt;"));
    }

    #[test]
    fn test_login_page_has_forgot_form() {
        let html = LoginTemplate {
            layout: Layout::anonymous("Login"),
        }
        .render()
        .unwrap();
        assert!(html.contains("action=\"/login\""));
        assert!(html.contains("action=\"/account/forgot\""));
    }
}
