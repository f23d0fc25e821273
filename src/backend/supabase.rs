//! Supabase adapter: GoTrue auth endpoints and PostgREST profile lookup.
//!
//! DESIGN
//! ======
//! The hosted service is stateless per request, so this client keeps the
//! current session in memory and raises the same events a browser SDK would:
//! `SignedIn` after password login or auto-confirmed sign-up, `TokenRefreshed`
//! after a refresh, `SignedOut` whenever the local session is dropped, and
//! `InitialSession` for every new subscriber.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become `BackendError::Rejected` carrying the service's
//! own message and error code so the session machine can classify them.
//! Transport failures become `BackendError::Network`.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::{AuthEventHub, AuthSubscription, IdentityBackend, ProfileStore};
use crate::config::SupabaseConfig;
use crate::error::BackendError;
use crate::types::{AuthEvent, AuthEventKind, AuthUser, Profile, Session, SessionToken, SignUpMetadata};

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> Session {
        let now = OffsetDateTime::now_utc();
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now.unix_timestamp() + secs));
        Session {
            user_id: self.user.id,
            email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            issued_at: now,
            token: SessionToken { access_token: self.access_token, refresh_token: self.refresh_token, expires_at },
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Identity backend and profile store for one Supabase project.
pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
    session: Mutex<Option<Session>>,
    hub: AuthEventHub,
}

impl SupabaseClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: SupabaseConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| BackendError::Unexpected(format!("http client build failed: {e}")))?;
        Ok(Self { http, config, session: Mutex::new(None), hub: AuthEventHub::new() })
    }

    #[must_use]
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    #[must_use]
    pub fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Exchange the refresh token for a new session and emit `TokenRefreshed`.
    ///
    /// A rejected refresh means the session is gone: the local copy is
    /// dropped and `SignedOut` is emitted before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the backend or transport failure.
    pub async fn refresh_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(current) = self.current_session() else {
            return Ok(None);
        };
        let Some(refresh_token) = current.token.refresh_token.clone() else {
            return Ok(Some(current));
        };

        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        match self.send(request).await {
            Ok(response) => {
                let token = decode::<TokenResponse>(response).await?;
                let session = token.into_session(&current.email);
                self.replace_session(Some(session.clone()), AuthEventKind::TokenRefreshed);
                debug!(user_id = %session.user_id, "session refreshed");
                Ok(Some(session))
            }
            Err(err @ BackendError::Rejected { .. }) => {
                warn!(error = %err, "refresh rejected; dropping session");
                self.replace_session(None, AuthEventKind::SignedOut);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    /// Access token of the current session, or the anon key.
    fn bearer(&self) -> String {
        self.current_session()
            .map_or_else(|| self.config.anon_key.clone(), |s| s.token.access_token)
    }

    fn replace_session(&self, session: Option<Session>, kind: AuthEventKind) {
        {
            let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            slot.clone_from(&session);
        }
        self.hub.emit(&AuthEvent::new(kind, session));
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, BackendError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(rejection(status.as_u16(), &body))
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::Unexpected(format!("response decode failed: {e}")))
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        BackendError::Network(err.to_string())
    } else {
        BackendError::Unexpected(err.to_string())
    }
}

/// Build a rejection from an error response body.
///
/// Message precedence: `msg`, `error_description`, `message`, `error`, then
/// the raw body. `error_code` wins for the code; older responses put it in
/// `error` next to an `error_description`.
fn rejection(status: u16, body: &str) -> BackendError {
    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_default();
    let code = parsed
        .error_code
        .clone()
        .or_else(|| parsed.error_description.as_ref().and(parsed.error.clone()));
    let message = [parsed.msg, parsed.error_description, parsed.message, parsed.error]
        .into_iter()
        .flatten()
        .find(|m| !m.trim().is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    BackendError::Rejected { status: Some(status), code, message }
}

#[async_trait::async_trait]
impl IdentityBackend for SupabaseClient {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Option<Session>, BackendError> {
        let request = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));
        let response = self.send(request).await?;
        let session = decode::<TokenResponse>(response).await?.into_session(email);
        info!(user_id = %session.user_id, "supabase sign in");
        self.replace_session(Some(session.clone()), AuthEventKind::SignedIn);
        Ok(Some(session))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignUpMetadata,
    ) -> Result<Option<AuthUser>, BackendError> {
        let request = self
            .http
            .post(self.auth_url("signup"))
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password, "data": metadata }));
        let response = self.send(request).await?;
        let body = decode::<serde_json::Value>(response).await?;

        // Auto-confirmed projects answer with a full session.
        if body.get("access_token").is_some() {
            let token = serde_json::from_value::<TokenResponse>(body)
                .map_err(|e| BackendError::Unexpected(format!("session decode failed: {e}")))?;
            let session = token.into_session(email);
            let user = AuthUser { id: session.user_id.clone(), email: session.email.clone() };
            info!(user_id = %user.id, "supabase sign up; session issued");
            self.replace_session(Some(session), AuthEventKind::SignedIn);
            return Ok(Some(user));
        }

        if body.get("id").is_none() {
            debug!("sign up accepted without user payload");
            return Ok(None);
        }
        let user = serde_json::from_value::<UserResponse>(body)
            .map_err(|e| BackendError::Unexpected(format!("user decode failed: {e}")))?;
        info!(user_id = %user.id, "supabase sign up; confirmation pending");
        Ok(Some(AuthUser { id: user.id, email: user.email.unwrap_or_else(|| email.to_string()) }))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.current_session();
        self.replace_session(None, AuthEventKind::SignedOut);
        let Some(previous) = previous else {
            return Ok(());
        };

        let request = self
            .http
            .post(self.auth_url("logout"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&previous.token.access_token);
        self.send(request).await?;
        info!(user_id = %previous.user_id, "supabase sign out");
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.current_session())
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        let initial = AuthEvent::new(AuthEventKind::InitialSession, self.current_session());
        self.hub.subscribe_with(Some(initial))
    }
}

#[async_trait::async_trait]
impl ProfileStore for SupabaseClient {
    async fn get_by_id(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        let request = self
            .http
            .get(self.rest_url(&self.config.profile_table))
            .query(&[("id", format!("eq.{user_id}")), ("select", "*".to_string())])
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer());
        let response = self.send(request).await?;
        let rows = decode::<Vec<Profile>>(response).await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
