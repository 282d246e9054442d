//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::filters;
use crate::routes::Layout;
use crate::services::{AuthError, EmailError, StoreError, UploadError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Photo upload failed.
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Sending email failed.
    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    /// Reading or writing the session failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Rendering a template failed.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User may not touch this resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Generic error page.
#[derive(Template)]
#[template(path = "error.html")]
struct ErrorPage {
    layout: Layout,
    status: u16,
    message: String,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(RepositoryError::NotFound)
            | Self::Store(StoreError::NotFound)
            | Self::Auth(AuthError::UserNotFound)
            | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::NotOwner) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(RepositoryError::Conflict(_))
            | Self::Auth(AuthError::UserAlreadyExists)
            | Self::Store(StoreError::SlugExhausted(_)) => StatusCode::CONFLICT,
            Self::Upload(UploadError::NotAnImage | UploadError::Decode(_))
            | Self::Auth(
                AuthError::Validation(_)
                | AuthError::PasswordMismatch
                | AuthError::InvalidResetToken,
            )
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Auth(AuthError::InvalidCredentials) | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    fn public_message(&self) -> String {
        match self {
            Self::NotFound(_)
            | Self::Database(RepositoryError::NotFound)
            | Self::Store(StoreError::NotFound)
            | Self::Auth(AuthError::UserNotFound) => "That page doesn't exist!".to_string(),
            Self::Store(e @ StoreError::NotOwner) => e.to_string(),
            Self::Upload(e @ UploadError::NotAnImage) => e.to_string(),
            Self::Upload(UploadError::Decode(_)) => "That image couldn't be read.".to_string(),
            Self::Store(StoreError::SlugExhausted(_)) => {
                "Too many stores share that name, please pick another.".to_string()
            }
            Self::Auth(AuthError::Validation(errors)) => errors.join(" "),
            Self::Auth(
                e @ (AuthError::InvalidCredentials
                | AuthError::UserAlreadyExists
                | AuthError::PasswordMismatch
                | AuthError::InvalidResetToken),
            ) => e.to_string(),
            Self::Forbidden(msg) | Self::Unauthorized(msg) | Self::BadRequest(msg) => msg.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        // Don't expose internal error details to clients
        let message = self.public_message();
        let page = ErrorPage {
            layout: Layout::anonymous(status.canonical_reason().unwrap_or("Error")),
            status: status.as_u16(),
            message: message.clone(),
        };

        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to render error page");
                (status, message).into_response()
            }
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("store-123".to_string());
        assert_eq!(err.to_string(), "Not found: store-123");

        let err = AppError::BadRequest("invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: invalid input");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_map_to_status() {
        assert_eq!(
            get_status(StoreError::NotOwner.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(StoreError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(UploadError::NotAnImage.into()),
            StatusCode::BAD_REQUEST
        );
        let exhausted = AppError::from(StoreError::SlugExhausted("pie".to_string()));
        assert_eq!(
            exhausted.public_message(),
            "Too many stores share that name, please pick another."
        );
        assert_eq!(get_status(exhausted), StatusCode::CONFLICT);
    }

    #[test]
    fn test_public_messages() {
        assert_eq!(
            AppError::from(StoreError::NotOwner).public_message(),
            "You must own a store in order to edit it!"
        );
        assert_eq!(
            AppError::from(UploadError::NotAnImage).public_message(),
            "That filetype isn't allowed!"
        );
        assert_eq!(
            AppError::Internal("db password leaked".to_string()).public_message(),
            "Internal server error"
        );
    }
}
