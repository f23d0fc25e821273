//! Error types and backend-error normalization.
//!
//! DESIGN
//! ======
//! Backends report failures as free text. Sign-in and sign-up translate that
//! text into a fixed `AuthErrorKind` by substring matching against an ordered
//! rule list: first match wins, no match keeps the original text as
//! `Unknown`. Normalized errors are returned as values so the UI can render
//! them inline; nothing past the session machine ever sees a raw backend error.

use serde::Serialize;

// =============================================================================
// BACKEND ERROR
// =============================================================================

/// Failure reported by an identity backend or profile store adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend answered and refused the request.
    #[error("backend rejected request: {message}")]
    Rejected {
        status: Option<u16>,
        /// Machine-readable error code, when the backend supplies one.
        code: Option<String>,
        message: String,
    },

    /// The request never completed (connection refused, DNS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// Anything else: malformed payloads, unexpected responses.
    #[error("unexpected backend error: {0}")]
    Unexpected(String),
}

impl BackendError {
    /// Convenience for a rejection carrying only a message.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected { status: None, code: None, message: message.into() }
    }
}

// =============================================================================
// AUTH ERROR
// =============================================================================

/// Normalized failure categories for sign-in and sign-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    InvalidCredentials,
    AccountNotFound,
    RateLimited,
    Network,
    RegistrationDisabled,
    InvalidEmail,
    AlreadyRegistered,
    WeakPassword,
    Unknown,
}

impl AuthErrorKind {
    /// Grepable code for logs and API payloads.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::AccountNotFound => "E_ACCOUNT_NOT_FOUND",
            Self::RateLimited => "E_RATE_LIMITED",
            Self::Network => "E_NETWORK",
            Self::RegistrationDisabled => "E_REGISTRATION_DISABLED",
            Self::InvalidEmail => "E_INVALID_EMAIL",
            Self::AlreadyRegistered => "E_ALREADY_REGISTERED",
            Self::WeakPassword => "E_WEAK_PASSWORD",
            Self::Unknown => "E_UNKNOWN",
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::Network)
    }

    /// Fixed user-facing message. `Unknown` callers supply their own text.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Invalid email or password. Please check your credentials.",
            Self::AccountNotFound => "No account found with this email address.",
            Self::RateLimited => "Too many requests. Please wait a few minutes before trying again.",
            Self::Network => "Network error. Please check your connection and try again.",
            Self::RegistrationDisabled => "Account registration is currently disabled.",
            Self::InvalidEmail => "Please enter a valid email address.",
            Self::AlreadyRegistered => "An account with this email already exists. Please sign in instead.",
            Self::WeakPassword => "Password must be at least 6 characters long.",
            Self::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

/// User-facing result of a failed sign-in or sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    /// Error carrying the kind's fixed message.
    #[must_use]
    pub fn from_kind(kind: AuthErrorKind) -> Self {
        Self { kind, message: kind.message().to_string() }
    }

    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        Self { kind: AuthErrorKind::Unknown, message: message.into() }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// One entry of an ordered classification list.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub kind: AuthErrorKind,
    pub needles: &'static [&'static str],
}

pub const SIGN_IN_RULES: &[Rule] = &[
    Rule {
        kind: AuthErrorKind::InvalidCredentials,
        needles: &["Invalid login credentials", "invalid_credentials", "Email not confirmed"],
    },
    Rule { kind: AuthErrorKind::AccountNotFound, needles: &["Email not found", "User not found"] },
    Rule { kind: AuthErrorKind::RateLimited, needles: &["Too many requests", "rate limit"] },
    Rule { kind: AuthErrorKind::Network, needles: &["Network", "network", "NetworkError"] },
    Rule { kind: AuthErrorKind::RegistrationDisabled, needles: &["signup_not_allowed"] },
    Rule { kind: AuthErrorKind::InvalidEmail, needles: &["Invalid email"] },
];

pub const SIGN_UP_RULES: &[Rule] = &[
    Rule { kind: AuthErrorKind::AlreadyRegistered, needles: &["User already registered"] },
    Rule { kind: AuthErrorKind::WeakPassword, needles: &["Password should be at least"] },
    Rule { kind: AuthErrorKind::InvalidEmail, needles: &["Invalid email"] },
    Rule { kind: AuthErrorKind::RegistrationDisabled, needles: &["signup_not_allowed"] },
    Rule { kind: AuthErrorKind::RateLimited, needles: &["Too many requests", "rate limit"] },
    Rule { kind: AuthErrorKind::Network, needles: &["Network", "network", "NetworkError"] },
];

pub const SIGN_IN_FALLBACK: &str = "Sign in failed. Please try again.";
pub const SIGN_UP_FALLBACK: &str = "Sign up failed. Please try again.";

pub const SIGN_UP_UNEXPECTED: &str = "An unexpected error occurred during sign up. Please try again.";

const CONNECTION_MESSAGE: &str = "Connection error. Please check your internet connection.";

/// Which operation a backend error came from; selects rules and fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    SignIn,
    SignUp,
}

impl AuthOperation {
    fn rules(self) -> &'static [Rule] {
        match self {
            Self::SignIn => SIGN_IN_RULES,
            Self::SignUp => SIGN_UP_RULES,
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            Self::SignIn => SIGN_IN_FALLBACK,
            Self::SignUp => SIGN_UP_FALLBACK,
        }
    }
}

/// First rule whose needle occurs in any of `haystacks`.
#[must_use]
pub fn match_rules(rules: &[Rule], haystacks: &[&str]) -> Option<AuthErrorKind> {
    rules
        .iter()
        .find(|rule| {
            rule.needles
                .iter()
                .any(|needle| haystacks.iter().any(|h| h.contains(needle)))
        })
        .map(|rule| rule.kind)
}

/// Normalize a backend failure for the given operation.
#[must_use]
pub fn classify(op: AuthOperation, err: &BackendError) -> AuthError {
    match err {
        BackendError::Rejected { code, message, .. } => {
            let haystacks = [message.as_str(), code.as_deref().unwrap_or_default()];
            match match_rules(op.rules(), &haystacks) {
                Some(kind) => AuthError::from_kind(kind),
                None if message.trim().is_empty() => AuthError::unknown(op.fallback()),
                None => AuthError::unknown(message.clone()),
            }
        }
        BackendError::Network(_) => AuthError::from_kind(AuthErrorKind::Network),
        BackendError::Unexpected(detail) => classify_unexpected(op, detail),
    }
}

/// Only sign-in looks for transport trouble in unexpected failures; sign-up
/// reports every one with its own fixed message.
fn classify_unexpected(op: AuthOperation, detail: &str) -> AuthError {
    match op {
        AuthOperation::SignIn if detail.contains("NetworkError") => AuthError::from_kind(AuthErrorKind::Network),
        AuthOperation::SignIn if detail.contains("fetch") => {
            AuthError { kind: AuthErrorKind::Network, message: CONNECTION_MESSAGE.to_string() }
        }
        AuthOperation::SignIn => AuthError::from_kind(AuthErrorKind::Unknown),
        AuthOperation::SignUp => AuthError::unknown(SIGN_UP_UNEXPECTED),
    }
}

// =============================================================================
// CONFIG ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
