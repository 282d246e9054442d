//! One-shot flash messages stored in the session.
//!
//! A handler pushes messages before redirecting; the next page rendered
//! through [`Layout`](crate::routes::Layout) takes and displays them.

use tower_sessions::Session;

use crate::models::{FlashLevel, FlashMessage, session_keys};

/// Queue a message for the next rendered page.
///
/// Session failures are logged and swallowed; losing a flash never fails the request.
pub async fn push_flash(session: &Session, level: FlashLevel, message: impl Into<String>) {
    let mut flashes = session
        .get::<Vec<FlashMessage>>(session_keys::FLASHES)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    flashes.push(FlashMessage {
        level,
        message: message.into(),
    });

    if let Err(e) = session.insert(session_keys::FLASHES, flashes).await {
        tracing::warn!(error = %e, "failed to store flash message");
    }
}

/// Queue a success message.
pub async fn flash_success(session: &Session, message: impl Into<String>) {
    push_flash(session, FlashLevel::Success, message).await;
}

/// Queue an informational message.
pub async fn flash_info(session: &Session, message: impl Into<String>) {
    push_flash(session, FlashLevel::Info, message).await;
}

/// Queue an error message.
pub async fn flash_error(session: &Session, message: impl Into<String>) {
    push_flash(session, FlashLevel::Error, message).await;
}

/// Remove and return every pending message.
pub async fn take_flashes(session: &Session) -> Vec<FlashMessage> {
    session
        .remove::<Vec<FlashMessage>>(session_keys::FLASHES)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_flashes_are_taken_once_in_order() {
        let session = session();
        flash_success(&session, "first").await;
        flash_error(&session, "second").await;

        let flashes = take_flashes(&session).await;
        assert_eq!(flashes.len(), 2);
        assert_eq!(flashes[0].message, "first");
        assert_eq!(flashes[0].level, FlashLevel::Success);
        assert_eq!(flashes[1].level, FlashLevel::Error);

        assert!(take_flashes(&session).await.is_empty());
    }
}
