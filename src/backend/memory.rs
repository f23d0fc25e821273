//! In-memory identity backend and profile store.
//!
//! DESIGN
//! ======
//! Behaves like a hosted auth service closely enough to drive the session
//! machine end to end: same error texts, events emitted after every session
//! change, optional replay of the current session to new subscribers. Failure
//! injection is one-shot (`fail_next_*`) so tests can script a single bad call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::{AuthEventHub, AuthSubscription, IdentityBackend, ProfileStore};
use crate::error::BackendError;
use crate::types::{AuthEvent, AuthEventKind, AuthUser, Profile, Role, Session, SessionToken, SignUpMetadata};

pub const DEFAULT_MIN_PASSWORD_LEN: usize = 6;

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Queue an `InitialSession` event for every new subscriber.
    pub replay_initial_session: bool,
    pub signups_enabled: bool,
    /// New accounts must be confirmed before they can sign in.
    pub require_confirmation: bool,
    pub min_password_len: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            replay_initial_session: true,
            signups_enabled: true,
            require_confirmation: false,
            min_password_len: DEFAULT_MIN_PASSWORD_LEN,
        }
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

struct Account {
    user_id: String,
    password: String,
    confirmed: bool,
    metadata: Option<SignUpMetadata>,
}

#[derive(Default)]
struct IdentityState {
    /// Accounts keyed by lowercase email.
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    sign_in_failure: Option<BackendError>,
    sign_up_failure: Option<BackendError>,
    sign_out_failure: Option<BackendError>,
    get_session_failure: Option<BackendError>,
}

/// Process-local identity backend.
pub struct InMemoryIdentity {
    state: Mutex<IdentityState>,
    hub: AuthEventHub,
    options: MemoryOptions,
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    #[must_use]
    pub fn with_options(options: MemoryOptions) -> Self {
        Self { state: Mutex::new(IdentityState::default()), hub: AuthEventHub::new(), options }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a confirmed account and return its user id.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let user_id = Uuid::new_v4().to_string();
        self.lock().accounts.insert(
            email.trim().to_lowercase(),
            Account { user_id: user_id.clone(), password: password.to_string(), confirmed: true, metadata: None },
        );
        user_id
    }

    /// Mark an account as confirmed. Returns false if unknown.
    pub fn confirm(&self, email: &str) -> bool {
        match self.lock().accounts.get_mut(&email.trim().to_lowercase()) {
            Some(account) => {
                account.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// User id registered for `email`.
    #[must_use]
    pub fn user_id(&self, email: &str) -> Option<String> {
        self.lock()
            .accounts
            .get(&email.trim().to_lowercase())
            .map(|a| a.user_id.clone())
    }

    /// Metadata recorded at sign-up for `email`.
    #[must_use]
    pub fn account_metadata(&self, email: &str) -> Option<SignUpMetadata> {
        self.lock()
            .accounts
            .get(&email.trim().to_lowercase())
            .and_then(|a| a.metadata.clone())
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    pub fn fail_next_sign_in(&self, err: BackendError) {
        self.lock().sign_in_failure = Some(err);
    }

    pub fn fail_next_sign_up(&self, err: BackendError) {
        self.lock().sign_up_failure = Some(err);
    }

    pub fn fail_next_sign_out(&self, err: BackendError) {
        self.lock().sign_out_failure = Some(err);
    }

    pub fn fail_next_get_session(&self, err: BackendError) {
        self.lock().get_session_failure = Some(err);
    }

    /// Rotate the current session's token and emit `TokenRefreshed`.
    /// Returns the refreshed session, or `None` when signed out.
    pub fn refresh_session(&self) -> Option<Session> {
        let refreshed = {
            let mut state = self.lock();
            let session = state.session.as_mut()?;
            session.token = new_token();
            session.clone()
        };
        self.hub
            .emit(&AuthEvent::new(AuthEventKind::TokenRefreshed, Some(refreshed.clone())));
        Some(refreshed)
    }

    /// Drop the session server-side (expiry, revocation) and emit `SignedOut`.
    pub fn expire_session(&self) {
        self.lock().session = None;
        self.hub.emit(&AuthEvent::new(AuthEventKind::SignedOut, None));
    }

    /// Push an arbitrary event to subscribers.
    pub fn emit(&self, event: &AuthEvent) -> usize {
        self.hub.emit(event)
    }

    fn open_session(&self, email: &str, user_id: &str) -> Session {
        let session = Session {
            user_id: user_id.to_string(),
            email: email.to_string(),
            issued_at: OffsetDateTime::now_utc(),
            token: new_token(),
        };
        self.lock().session = Some(session.clone());
        self.hub
            .emit(&AuthEvent::new(AuthEventKind::SignedIn, Some(session.clone())));
        session
    }
}

fn new_token() -> SessionToken {
    SessionToken {
        access_token: Uuid::new_v4().simple().to_string(),
        refresh_token: Some(Uuid::new_v4().simple().to_string()),
        expires_at: None,
    }
}

fn looks_like_email(email: &str) -> bool {
    let mut parts = email.split('@');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(local), Some(domain), None) if !local.is_empty() && domain.contains('.')
    )
}

#[async_trait::async_trait]
impl IdentityBackend for InMemoryIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let user_id = {
            let mut state = self.lock();
            if let Some(err) = state.sign_in_failure.take() {
                return Err(err);
            }
            let key = email.trim().to_lowercase();
            match state.accounts.get(&key) {
                Some(account) if account.password == password && account.confirmed => account.user_id.clone(),
                Some(account) if account.password == password => {
                    return Err(BackendError::Rejected {
                        status: Some(400),
                        code: Some("email_not_confirmed".into()),
                        message: "Email not confirmed".into(),
                    });
                }
                _ => {
                    return Err(BackendError::Rejected {
                        status: Some(400),
                        code: Some("invalid_credentials".into()),
                        message: "Invalid login credentials".into(),
                    });
                }
            }
        };
        let session = self.open_session(&email.trim().to_lowercase(), &user_id);
        info!(user_id = %user_id, "in-memory sign in");
        Ok(Some(session))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<Option<AuthUser>, BackendError> {
        let key = email.trim().to_lowercase();
        let user_id = {
            let mut state = self.lock();
            if let Some(err) = state.sign_up_failure.take() {
                return Err(err);
            }
            if !self.options.signups_enabled {
                return Err(BackendError::Rejected {
                    status: Some(422),
                    code: Some("signup_not_allowed".into()),
                    message: "Signups not allowed for this instance".into(),
                });
            }
            if !looks_like_email(&key) {
                return Err(BackendError::Rejected {
                    status: Some(400),
                    code: Some("email_address_invalid".into()),
                    message: "Invalid email address format".into(),
                });
            }
            if password.chars().count() < self.options.min_password_len {
                return Err(BackendError::Rejected {
                    status: Some(422),
                    code: Some("weak_password".into()),
                    message: format!("Password should be at least {} characters", self.options.min_password_len),
                });
            }
            if state.accounts.contains_key(&key) {
                return Err(BackendError::Rejected {
                    status: Some(422),
                    code: Some("user_already_exists".into()),
                    message: "User already registered".into(),
                });
            }
            let user_id = Uuid::new_v4().to_string();
            state.accounts.insert(
                key.clone(),
                Account {
                    user_id: user_id.clone(),
                    password: password.to_string(),
                    confirmed: !self.options.require_confirmation,
                    metadata: Some(metadata.clone()),
                },
            );
            user_id
        };

        info!(user_id = %user_id, "in-memory sign up");
        if !self.options.require_confirmation {
            self.open_session(&key, &user_id);
        }
        Ok(Some(AuthUser { id: user_id, email: key }))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        {
            let mut state = self.lock();
            if let Some(err) = state.sign_out_failure.take() {
                return Err(err);
            }
            state.session = None;
        }
        self.hub.emit(&AuthEvent::new(AuthEventKind::SignedOut, None));
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let mut state = self.lock();
        if let Some(err) = state.get_session_failure.take() {
            return Err(err);
        }
        Ok(state.session.clone())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        if self.options.replay_initial_session {
            let initial = AuthEvent::new(AuthEventKind::InitialSession, self.current_session());
            self.hub.subscribe_with(Some(initial))
        } else {
            self.hub.subscribe()
        }
    }
}

// =============================================================================
// PROFILES
// =============================================================================

/// Process-local profile table.
#[derive(Default)]
pub struct InMemoryProfiles {
    rows: Mutex<HashMap<String, Profile>>,
    failure: Mutex<Option<BackendError>>,
    lookups: AtomicUsize,
}

impl InMemoryProfiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: Profile) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.id.clone(), profile);
    }

    /// Create and store a profile row stamped with the current time.
    pub fn provision(&self, user_id: &str, email: &str, role: Role) -> Profile {
        let now = OffsetDateTime::now_utc();
        let profile = Profile {
            id: user_id.to_string(),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            role,
            created_at: now,
            updated_at: now,
        };
        self.insert(profile.clone());
        profile
    }

    pub fn remove(&self, user_id: &str) -> Option<Profile> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }

    pub fn fail_next(&self, err: BackendError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    /// Number of `get_by_id` calls served so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfiles {
    async fn get_by_id(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(err);
        }
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
