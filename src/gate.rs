//! Access gate: render or redirect decision for protected views.
//!
//! DESIGN
//! ======
//! `evaluate` is a pure function of auth state and policy. It never allows
//! while loading, so protected content cannot flash before the redirect
//! decision is known. `AccessGate` binds a policy to a state subscription and
//! re-evaluates on every change.

use serde::Serialize;

use crate::session::StateSubscription;
use crate::types::AuthState;

// =============================================================================
// POLICY / DECISION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    pub require_admin: bool,
}

impl AccessPolicy {
    pub const AUTHENTICATED: Self = Self { require_admin: false };
    pub const ADMIN: Self = Self { require_admin: true };
}

/// Navigation targets produced for the caller to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Redirect {
    Login,
    Dashboard,
    Admin,
    Home,
}

impl Redirect {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
            Self::Admin => "/admin",
            Self::Home => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum GateDecision {
    /// Auth state still resolving; show a neutral loading affordance.
    Wait,
    Allow,
    Redirect(Redirect),
}

/// Decide whether `state` may see a view guarded by `policy`.
#[must_use]
pub fn evaluate(state: &AuthState, policy: AccessPolicy) -> GateDecision {
    if state.loading {
        return GateDecision::Wait;
    }
    if state.session.is_none() {
        return GateDecision::Redirect(Redirect::Login);
    }
    if policy.require_admin && !state.is_admin() {
        return GateDecision::Redirect(Redirect::Dashboard);
    }
    GateDecision::Allow
}

/// Where the login page sends an already signed-in user.
#[must_use]
pub fn landing_redirect(state: &AuthState) -> Option<Redirect> {
    if state.loading || state.session.is_none() {
        return None;
    }
    Some(if state.is_admin() { Redirect::Admin } else { Redirect::Dashboard })
}

// =============================================================================
// REACTIVE GATE
// =============================================================================

/// A policy bound to live auth state.
pub struct AccessGate {
    subscription: StateSubscription,
    policy: AccessPolicy,
}

impl AccessGate {
    #[must_use]
    pub fn new(subscription: StateSubscription, policy: AccessPolicy) -> Self {
        Self { subscription, policy }
    }

    #[must_use]
    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    #[must_use]
    pub fn decision(&self) -> GateDecision {
        evaluate(&self.subscription.current(), self.policy)
    }

    #[must_use]
    pub fn should_render(&self) -> bool {
        self.decision() == GateDecision::Allow
    }

    /// Re-evaluate after the next state change. `None` once the session
    /// machine has shut down.
    pub async fn changed(&mut self) -> Option<GateDecision> {
        let state = self.subscription.changed().await?;
        Some(evaluate(&state, self.policy))
    }

    /// Wait for a decision other than `Wait`.
    pub async fn resolved(&mut self) -> Option<GateDecision> {
        let state = self.subscription.settled().await?;
        Some(evaluate(&state, self.policy))
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
