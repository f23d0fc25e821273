//! Session state machine: owns auth state and keeps it in sync with the
//! identity backend.
//!
//! ARCHITECTURE
//! ============
//! One worker task owns the backend event subscription and applies
//! transitions strictly one at a time, in arrival order. A bootstrap task asks
//! the backend for its current session once and hands the answer to the same
//! worker, so bootstrap and events never interleave. State lives in a
//! `tokio::sync::watch` channel: the worker and `sign_out` write it, UI code
//! reads snapshots or awaits changes through a `StateSubscription`. The
//! worker outlives a closed backend event stream and keeps serving bootstrap
//! and refresh commands; only `shutdown` stops it and ends the state stream.
//!
//! STALE FETCHES
//! =============
//! Every write bumps a generation counter inside the watch lock. A profile
//! fetch remembers the generation it was issued under and its result is
//! dropped if anything (a newer event, a sign-out) moved the state since.
//!
//! TRADE-OFFS
//! ==========
//! Sign-in and sign-up never touch state. The backend's own event is the
//! single source of truth for the new session, at the cost of a short window
//! where the call has returned but the state has not caught up yet.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{AuthSubscription, IdentityBackend, ProfileStore};
use crate::config::SessionConfig;
use crate::error::{AuthError, AuthOperation, BackendError, SIGN_IN_FALLBACK, classify};
use crate::types::{AuthContext, AuthState, Profile, Session, SignUpMetadata};

/// Trim and lowercase an email before it reaches the backend.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// =============================================================================
// SHARED STATE
// =============================================================================

/// Writer side of the state channel. `None` once the machine shut down, which
/// is what ends every subscriber's stream.
struct Shared {
    state: Mutex<Option<watch::Sender<AuthState>>>,
    generation: AtomicU64,
}

impl Shared {
    /// Apply `f` and bump the generation under the same watch lock.
    /// Returns the new generation, or `None` after shutdown.
    fn transition(&self, f: impl FnOnce(&mut AuthState)) -> Option<u64> {
        let sender = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref()?;
        let mut generation = 0;
        sender.send_modify(|state| {
            f(state);
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        });
        Some(generation)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn session(&self) -> Option<Session> {
        let sender = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        sender.as_ref().and_then(|tx| tx.borrow().session.clone())
    }

    /// Store a fetched profile unless the state moved on since `generation`.
    fn settle(&self, generation: u64, user_id: &str, profile: Option<Profile>) -> bool {
        let sender = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return false;
        };
        sender.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation || state.user_id() != Some(user_id) {
                return false;
            }
            state.profile = profile;
            state.loading = false;
            true
        })
    }

    /// Receivers still attached, including the machine's own.
    fn receiver_count(&self) -> usize {
        let sender = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        sender.as_ref().map_or(0, watch::Sender::receiver_count)
    }

    /// Drop the sender. Returns whether it was still open.
    fn close(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }
}

enum Command {
    Bootstrap(Result<Option<Session>, BackendError>),
    RefreshProfile,
}

// =============================================================================
// SESSION MACHINE
// =============================================================================

/// Owner of the current `AuthState`. Construct one per application and hand
/// it (usually behind an `Arc`) to whatever needs auth.
pub struct SessionMachine {
    backend: Arc<dyn IdentityBackend>,
    shared: Arc<Shared>,
    state: watch::Receiver<AuthState>,
    commands: mpsc::UnboundedSender<Command>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionMachine {
    /// Start with default config. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(backend: Arc<dyn IdentityBackend>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self::start_with_config(backend, profiles, SessionConfig::default())
    }

    #[must_use]
    pub fn start_with_config(
        backend: Arc<dyn IdentityBackend>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        let (sender, state) = watch::channel(AuthState::bootstrapping());
        let shared = Arc::new(Shared { state: Mutex::new(Some(sender)), generation: AtomicU64::new(0) });
        let (commands, command_rx) = mpsc::unbounded_channel();

        // Subscribe before bootstrapping so no event can slip between the two.
        let events = backend.on_auth_state_change();
        let worker = Worker { shared: Arc::clone(&shared), profiles, profile_timeout: config.profile_timeout };
        let worker_task = tokio::spawn(worker.run(events, command_rx));
        let bootstrap_task = tokio::spawn(bootstrap(Arc::clone(&backend), commands.clone()));
        info!("session machine started");

        Self { backend, shared, state, commands, tasks: vec![worker_task, bootstrap_task] }
    }

    /// Sign in with email and password.
    ///
    /// State is not touched here; the backend's `SignedIn` event drives it.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure for inline display.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        match self.backend.sign_in_with_password(&email, password).await {
            Ok(Some(session)) => {
                info!(user_id = %session.user_id, "sign in accepted");
                Ok(())
            }
            Ok(None) => {
                warn!("sign in returned no session");
                Err(AuthError::unknown(SIGN_IN_FALLBACK))
            }
            Err(err) => {
                let normalized = classify(AuthOperation::SignIn, &err);
                warn!(code = normalized.code(), error = %err, "sign in failed");
                Err(normalized)
            }
        }
    }

    /// Register a new account. `display_name` defaults to the email.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure for inline display.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let metadata = SignUpMetadata::new(&email, display_name);
        match self.backend.sign_up(&email, password, &metadata).await {
            Ok(user) => {
                info!(user_id = ?user.as_ref().map(|u| u.id.as_str()), "sign up accepted");
                Ok(())
            }
            Err(err) => {
                let normalized = classify(AuthOperation::SignUp, &err);
                warn!(code = normalized.code(), error = %err, "sign up failed");
                Err(normalized)
            }
        }
    }

    /// Sign out.
    ///
    /// Local state is cleared when this is called, before the returned future
    /// is polled, and any in-flight profile fetch is invalidated. The future
    /// performs the backend call; its failure is logged and otherwise ignored.
    pub fn sign_out(&self) -> impl Future<Output = ()> + Send + '_ {
        if self.shared.transition(|state| *state = AuthState::signed_out()).is_some() {
            info!("signed out locally");
        }
        async move {
            if let Err(err) = self.backend.sign_out().await {
                warn!(error = %err, "backend sign out failed; local state already cleared");
            }
        }
    }

    /// Re-fetch the current user's profile, e.g. after it was provisioned.
    /// No-op when signed out.
    pub fn refresh_profile(&self) {
        if self.commands.send(Command::RefreshProfile).is_err() {
            debug!("refresh_profile after shutdown");
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn context(&self) -> AuthContext {
        AuthContext::from(&*self.state.borrow())
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    /// Observe state changes. Drop or `unsubscribe()` the result to stop.
    #[must_use]
    pub fn subscribe(&self) -> StateSubscription {
        let mut rx = self.state.clone();
        rx.mark_unchanged();
        StateSubscription { rx }
    }

    /// Live subscriptions; zero after shutdown.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.receiver_count().saturating_sub(1)
    }

    /// Stop the worker and bootstrap tasks, releasing the backend
    /// subscription, and end the state stream. Subscribers drain what they
    /// have not seen yet, then `changed()` returns `None`. The last state
    /// stays readable through `snapshot()`.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
        if self.shared.close() {
            info!("session machine stopped");
        }
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn bootstrap(backend: Arc<dyn IdentityBackend>, commands: mpsc::UnboundedSender<Command>) {
    let result = backend.get_session().await;
    if commands.send(Command::Bootstrap(result)).is_err() {
        debug!("bootstrap finished after shutdown");
    }
}

// =============================================================================
// WORKER
// =============================================================================

struct Worker {
    shared: Arc<Shared>,
    profiles: Arc<dyn ProfileStore>,
    profile_timeout: Duration,
}

impl Worker {
    async fn run(self, mut events: AuthSubscription, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut events_open = true;
        loop {
            tokio::select! {
                biased;
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        debug!(event = ?event.kind, "auth event");
                        self.apply(event.session).await;
                    }
                    None => {
                        // Bootstrap and refresh still arrive as commands.
                        debug!("auth event stream closed");
                        events_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Bootstrap(result)) => self.bootstrap(result).await,
                    Some(Command::RefreshProfile) => {
                        let current = self.shared.session();
                        if current.is_some() {
                            self.apply(current).await;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("session worker stopped");
    }

    /// Bootstrap only counts if nothing else has written state yet; an event
    /// or sign-out that got there first is at least as fresh.
    async fn bootstrap(&self, result: Result<Option<Session>, BackendError>) {
        if self.shared.generation() != 0 {
            debug!("bootstrap superseded");
            return;
        }
        match result {
            Ok(session) => self.apply(session).await,
            Err(err) => {
                warn!(error = %err, "initial session lookup failed");
                self.shared.transition(|state| *state = AuthState::signed_out());
            }
        }
    }

    async fn apply(&self, session: Option<Session>) {
        let Some(session) = session else {
            self.shared.transition(|state| *state = AuthState::signed_out());
            info!("session cleared");
            return;
        };

        let user_id = session.user_id.clone();
        let Some(generation) = self.shared.transition(|state| {
            if state.user_id() != Some(user_id.as_str()) {
                state.profile = None;
                state.loading = true;
            }
            state.session = Some(session);
        }) else {
            return;
        };

        let profile = self.fetch_profile(&user_id).await;
        if self.shared.settle(generation, &user_id, profile) {
            info!(user_id = %user_id, "session settled");
        } else {
            debug!(user_id = %user_id, generation, "stale profile fetch discarded");
        }
    }

    /// Any failure yields `None`; a missing profile is a valid state.
    async fn fetch_profile(&self, user_id: &str) -> Option<Profile> {
        match tokio::time::timeout(self.profile_timeout, self.profiles.get_by_id(user_id)).await {
            Ok(Ok(Some(profile))) if profile.id == user_id => Some(profile),
            Ok(Ok(Some(profile))) => {
                warn!(user_id, profile_id = %profile.id, "profile id does not match session");
                None
            }
            Ok(Ok(None)) => {
                warn!(user_id, "no profile for user");
                None
            }
            Ok(Err(err)) => {
                warn!(user_id, error = %err, "profile fetch failed");
                None
            }
            Err(_) => {
                warn!(user_id, timeout = ?self.profile_timeout, "profile fetch timed out");
                None
            }
        }
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle for observing `AuthState` changes.
pub struct StateSubscription {
    rx: watch::Receiver<AuthState>,
}

impl StateSubscription {
    /// Latest state, without marking it seen.
    #[must_use]
    pub fn current(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    /// Wait for the next change. `None` once the session machine has shut
    /// down and every earlier change was seen.
    pub async fn changed(&mut self) -> Option<AuthState> {
        if self.rx.changed().await.is_err() {
            return None;
        }
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until the state satisfies `predicate` (checked immediately first).
    pub async fn wait_for(&mut self, predicate: impl FnMut(&AuthState) -> bool) -> Option<AuthState> {
        match self.rx.wait_for(predicate).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        }
    }

    /// Wait until loading has finished.
    pub async fn settled(&mut self) -> Option<AuthState> {
        self.wait_for(|state| !state.loading).await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
