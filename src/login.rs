//! Login form state.
//!
//! Holds what the login page needs between renders: field values, password
//! visibility, an in-flight flag, and the last normalized error. The form
//! never navigates; `redirect` tells the caller where a signed-in user goes.

use tracing::debug;

use crate::error::AuthError;
use crate::gate::{Redirect, landing_redirect};
use crate::session::SessionMachine;
use crate::types::AuthState;

pub const MISSING_FIELDS_MESSAGE: &str = "Email and password are required.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub show_password: bool,
    pub submitting: bool,
    /// Message to render inline, if the last submit failed.
    pub error: Option<String>,
}

impl LoginForm {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_password_visibility(&mut self) {
        self.show_password = !self.show_password;
    }

    /// Sign in with the current fields. The password is cleared on failure.
    ///
    /// # Errors
    ///
    /// Returns the normalized failure, which is also stored in `error`.
    pub async fn submit(&mut self, machine: &SessionMachine) -> Result<(), AuthError> {
        self.error = None;
        if self.email.trim().is_empty() || self.password.is_empty() {
            let err = AuthError::unknown(MISSING_FIELDS_MESSAGE);
            self.error = Some(err.message.clone());
            return Err(err);
        }

        self.submitting = true;
        let result = machine.sign_in(&self.email, &self.password).await;
        self.submitting = false;

        if let Err(err) = &result {
            debug!(code = err.code(), "login form rejected");
            self.error = Some(err.message.clone());
            self.password.clear();
        }
        result
    }

    /// Where to send the user if they are already signed in.
    #[must_use]
    pub fn redirect(&self, state: &AuthState) -> Option<Redirect> {
        landing_redirect(state)
    }
}

#[cfg(test)]
#[path = "login_test.rs"]
mod tests;
