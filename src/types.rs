//! Session, profile, and auth-state types shared by every module.
//!
//! DESIGN
//! ======
//! `Session` is issued by the identity backend and is opaque beyond its user
//! id, email, and issuance time. `Profile` is the application's own record
//! keyed by the same user id. `AuthState` pairs the two with a loading flag
//! and is owned exclusively by the session machine; everything else reads
//! clones of it.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// SESSION
// =============================================================================

/// Raw token material backing a session. `Debug` never prints secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Expiry as seconds since Unix epoch, when the backend reports one.
    pub expires_at: Option<i64>,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Proof of authentication issued by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(skip)]
    pub token: SessionToken,
}

/// User record returned by a sign-up call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Metadata attached to a new account at sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignUpMetadata {
    pub full_name: String,
}

impl SignUpMetadata {
    /// Use the display name when given, otherwise fall back to the email.
    #[must_use]
    pub fn new(email: &str, display_name: Option<&str>) -> Self {
        let full_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(email);
        Self { full_name: full_name.to_string() }
    }
}

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Application-level user record. Mirrors the `profiles` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Equals the owning session's `user_id`.
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Profile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// First and last name joined by a space, or the email when both are blank.
    #[must_use]
    pub fn display_name(&self) -> String {
        let parts = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        if parts.is_empty() { self.email.clone() } else { parts.join(" ") }
    }
}

// =============================================================================
// AUTH STATE
// =============================================================================

/// Current authentication state.
///
/// Resting states are `(None, None, false)` (signed out) and
/// `(Some, Some|None, false)` (signed in). `loading` is only true during
/// bootstrap or while the profile for a newly assigned user is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl AuthState {
    /// Initial state at application start.
    #[must_use]
    pub fn bootstrapping() -> Self {
        Self { session: None, profile: None, loading: true }
    }

    #[must_use]
    pub fn signed_out() -> Self {
        Self { session: None, profile: None, loading: false }
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_admin)
    }

    /// User id of the current session, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }
}

/// Read-only projection of `AuthState` handed to UI code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub session: Option<Session>,
    pub profile: Option<Profile>,
    pub loading: bool,
    pub is_admin: bool,
}

impl From<&AuthState> for AuthContext {
    fn from(state: &AuthState) -> Self {
        Self {
            session: state.session.clone(),
            profile: state.profile.clone(),
            loading: state.loading,
            is_admin: state.is_admin(),
        }
    }
}

// =============================================================================
// AUTH EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// Current session replayed to a new subscriber.
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Notification pushed by the identity backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    #[must_use]
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
