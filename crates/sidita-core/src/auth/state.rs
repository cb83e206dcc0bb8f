use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::models::{Session, UserId};

/// The observable "current user" cell.
///
/// One instance is created by the application and handed to the session
/// manager and to every consumer that needs the signed-in identity.
pub struct SessionState {
    tx: watch::Sender<Option<Session>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Receive the current value now and every change after
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn id(&self) -> Option<UserId> {
        self.tx.borrow().as_ref().map(|s| s.id.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Replace the current value and notify subscribers
    pub(crate) fn publish(&self, session: Option<Session>) {
        self.tx.send_replace(session);
    }

    /// Merge `update` into the current session if it belongs to `id`.
    /// Returns the merged session, or `None` when `id` is not the current user.
    pub(crate) fn merge_if_current(
        &self,
        id: &UserId,
        update: &Map<String, Value>,
    ) -> serde_json::Result<Option<Session>> {
        let mut outcome = Ok(None);
        self.tx.send_if_modified(|current| match current {
            Some(session) if &session.id == id => match session.merged_with(update) {
                Ok(merged) => {
                    *session = merged.clone();
                    outcome = Ok(Some(merged));
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            },
            _ => false,
        });
        outcome
    }
}
