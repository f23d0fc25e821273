//! Backend seams: identity provider and profile store.
//!
//! ARCHITECTURE
//! ============
//! The session machine only talks to the outside world through two traits:
//! `IdentityBackend` (credentials, sessions, auth events) and `ProfileStore`
//! (profile lookup by user id). Adapters live in submodules: `supabase` for a
//! hosted project over HTTP, `memory` for tests and local runs.
//!
//! EVENTS
//! ======
//! Backends push `AuthEvent`s through an `AuthEventHub`. Each subscriber gets
//! its own unbounded FIFO queue, so events are never dropped or reordered for
//! a live subscriber. Dropping an `AuthSubscription` unsubscribes it.

pub mod memory;
pub mod supabase;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::BackendError;
use crate::types::{AuthEvent, AuthUser, Profile, Session, SignUpMetadata};

// =============================================================================
// TRAITS
// =============================================================================

/// Authority for credentials and session tokens.
#[async_trait::async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Returns the new session, or `None` if the backend accepted the
    /// credentials without issuing one.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError>;

    /// Returns the created user, or `None` when the backend hides it
    /// (e.g. pending confirmation).
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<Option<AuthUser>, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Currently persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Subscribe to login, logout, refresh, and restoration events.
    fn on_auth_state_change(&self) -> AuthSubscription;
}

/// Keyed lookup of application profiles.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` means no profile row exists for this user yet.
    async fn get_by_id(&self, user_id: &str) -> Result<Option<Profile>, BackendError>;
}

// =============================================================================
// EVENT HUB
// =============================================================================

#[derive(Default)]
struct HubInner {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<AuthEvent>>,
}

/// Fan-out of auth events to any number of ordered subscriber queues.
#[derive(Clone, Default)]
pub struct AuthEventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl AuthEventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subscribe(&self) -> AuthSubscription {
        self.subscribe_with(None)
    }

    /// Subscribe, queueing `initial` for this subscriber only.
    #[must_use]
    pub fn subscribe_with(&self, initial: Option<AuthEvent>) -> AuthSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(event) = initial {
            if tx.send(event).is_err() {
                debug!("initial auth event dropped; receiver already closed");
            }
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        debug!(subscription_id = id, "auth subscription opened");
        AuthSubscription { id, hub: Arc::downgrade(&self.inner), events: rx }
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: &AuthEvent) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        inner.subscribers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribers
            .len()
    }
}

/// Ordered stream of auth events for one subscriber.
///
/// Dropping the subscription (or calling [`AuthSubscription::unsubscribe`])
/// removes it from its hub.
pub struct AuthSubscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
    events: mpsc::UnboundedReceiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the hub is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        self.events.recv().await
    }

    /// Explicitly end the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.hub.upgrade() {
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            inner.subscribers.remove(&self.id);
            debug!(subscription_id = self.id, "auth subscription closed");
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
