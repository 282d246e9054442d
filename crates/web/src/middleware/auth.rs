//! Authentication middleware and extractors.
//!
//! Provides extractors for requiring a logged-in user in route handlers.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use super::flash::flash_error;
use crate::models::{CurrentUser, session_keys};

/// Message shown when a gated page is opened while logged out.
pub const LOGIN_REQUIRED_MESSAGE: &str = "Oops! You must be logged in to do that!";

/// Extractor that requires a logged-in user.
///
/// Pages redirect to `/login` with a flash message; `/api/` paths answer 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but the user is not logged in.
pub enum AuthRejection {
    /// Redirect to login page (for HTML requests).
    RedirectToLogin,
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let is_api = parts.uri.path().starts_with("/api/");

        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let user: Option<CurrentUser> = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten();

        match user {
            Some(user) => Ok(Self(user)),
            None if is_api => Err(AuthRejection::Unauthorized),
            None => {
                flash_error(session, LOGIN_REQUIRED_MESSAGE).await;
                Err(AuthRejection::RedirectToLogin)
            }
        }
    }
}

/// The logged-in user, if any.
pub async fn current_user(session: &Session) -> Option<CurrentUser> {
    session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten()
}

/// Log a user in.
///
/// The session ID is cycled first so a pre-login session cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await?;
    crate::error::set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Log the current user out.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    crate::error::clear_sentry_user();
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::http::Request;
    use tower_sessions::MemoryStore;

    use delicious_core::{Email, UserId};

    use super::*;
    use crate::middleware::flash::take_flashes;

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("wes@example.com").unwrap(),
            name: "Wes".to_string(),
        }
    }

    fn parts_with_session(path: &str, session: &Session) -> Parts {
        let (mut parts, ()) = Request::builder().uri(path).body(()).unwrap().into_parts();
        parts.extensions.insert(session.clone());
        parts
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_require_auth_redirects_pages_with_flash() {
        let session = session();
        let mut parts = parts_with_session("/add", &session);

        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(rejection, AuthRejection::RedirectToLogin));

        let flashes = take_flashes(&session).await;
        assert_eq!(flashes[0].message, LOGIN_REQUIRED_MESSAGE);
    }

    #[tokio::test]
    async fn test_require_auth_api_is_unauthorized() {
        let session = session();
        let mut parts = parts_with_session("/api/stores/1/heart", &session);

        let rejection = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
        assert!(take_flashes(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_logged_in_user_is_extracted() {
        let session = session();
        session
            .insert(session_keys::CURRENT_USER, user())
            .await
            .unwrap();
        let mut parts = parts_with_session("/hearts", &session);

        let RequireAuth(found) = RequireAuth::from_request_parts(&mut parts, &())
            .await
            .ok()
            .unwrap();
        assert_eq!(found.id, UserId::new(7));
        assert_eq!(current_user(&session).await.unwrap().name, "Wes");
    }

    #[tokio::test]
    async fn test_clear_current_user() {
        let session = session();
        session
            .insert(session_keys::CURRENT_USER, user())
            .await
            .unwrap();
        clear_current_user(&session).await.unwrap();
        assert!(current_user(&session).await.is_none());
    }
}
