//! Account menu and the capabilities behind it.
//!
//! Change password, favorites, and reports are reached through the
//! `AccountCapabilities` trait. `Unavailable` is the implementation used until
//! those features exist; it answers every call with `NotImplemented`.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::gate::Redirect;
use crate::session::SessionMachine;
use crate::types::{AuthState, Role};

// =============================================================================
// CAPABILITIES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountFeature {
    ChangePassword,
    Favorites,
    Reports,
}

impl AccountFeature {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ChangePassword => "Change Password",
            Self::Favorites => "Favorites",
            Self::Reports => "Report List",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("{label} is not available yet", label = .feature.label())]
    NotImplemented { feature: AccountFeature },
    #[error("sign in to use {label}", label = .feature.label())]
    SignedOut { feature: AccountFeature },
}

/// Account features beyond sign-in and sign-out.
#[async_trait::async_trait]
pub trait AccountCapabilities: Send + Sync {
    async fn change_password(&self, user_id: &str) -> Result<(), CapabilityError>;
    async fn favorites(&self, user_id: &str) -> Result<(), CapabilityError>;
    async fn reports(&self, user_id: &str) -> Result<(), CapabilityError>;
}

/// Capabilities that are not built yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

#[async_trait::async_trait]
impl AccountCapabilities for Unavailable {
    async fn change_password(&self, _user_id: &str) -> Result<(), CapabilityError> {
        Err(CapabilityError::NotImplemented { feature: AccountFeature::ChangePassword })
    }

    async fn favorites(&self, _user_id: &str) -> Result<(), CapabilityError> {
        Err(CapabilityError::NotImplemented { feature: AccountFeature::Favorites })
    }

    async fn reports(&self, _user_id: &str) -> Result<(), CapabilityError> {
        Err(CapabilityError::NotImplemented { feature: AccountFeature::Reports })
    }
}

// =============================================================================
// MENU
// =============================================================================

/// What the account info panel shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub email: String,
    pub display_name: String,
    pub role: Option<Role>,
}

impl AccountInfo {
    /// `None` when signed out. Profile fields win over session fields.
    #[must_use]
    pub fn from_state(state: &AuthState) -> Option<Self> {
        let session = state.session.as_ref()?;
        let profile = state.profile.as_ref();
        Some(Self {
            email: profile.map_or_else(|| session.email.clone(), |p| p.email.clone()),
            display_name: profile.map_or_else(|| session.email.clone(), crate::types::Profile::display_name),
            role: profile.map(|p| p.role),
        })
    }
}

pub struct AccountMenu {
    capabilities: Arc<dyn AccountCapabilities>,
    open: bool,
    showing_info: bool,
}

impl AccountMenu {
    #[must_use]
    pub fn new(capabilities: Arc<dyn AccountCapabilities>) -> Self {
        Self { capabilities, open: false, showing_info: false }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    #[must_use]
    pub fn is_showing_info(&self) -> bool {
        self.showing_info
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Open the account info panel and close the menu.
    pub fn show_account_info(&mut self, machine: &SessionMachine) -> Option<AccountInfo> {
        self.open = false;
        let info = AccountInfo::from_state(&machine.snapshot());
        self.showing_info = info.is_some();
        info
    }

    pub fn hide_account_info(&mut self) {
        self.showing_info = false;
    }

    /// Run a feature for the signed-in user. The menu closes either way.
    ///
    /// # Errors
    ///
    /// Returns `SignedOut` without a session, otherwise whatever the
    /// capability reports.
    pub async fn select(&mut self, feature: AccountFeature, machine: &SessionMachine) -> Result<(), CapabilityError> {
        self.open = false;
        let Some(user_id) = machine.snapshot().user_id().map(str::to_string) else {
            return Err(CapabilityError::SignedOut { feature });
        };
        match feature {
            AccountFeature::ChangePassword => self.capabilities.change_password(&user_id).await,
            AccountFeature::Favorites => self.capabilities.favorites(&user_id).await,
            AccountFeature::Reports => self.capabilities.reports(&user_id).await,
        }
    }

    /// Sign out and return where to navigate.
    pub async fn logout(&mut self, machine: &SessionMachine) -> Redirect {
        self.open = false;
        self.showing_info = false;
        machine.sign_out().await;
        info!("logged out from account menu");
        Redirect::Home
    }
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
