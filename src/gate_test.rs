use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::*;
use crate::backend::memory::{InMemoryIdentity, InMemoryProfiles};
use crate::session::SessionMachine;
use crate::types::Role;
use crate::types::test_helpers::{profile, session, signed_in};

fn random_state(rng: &mut impl Rng, loading: bool) -> AuthState {
    let session = rng.random::<bool>().then(|| session("u1"));
    let profile = match rng.random_range(0..3) {
        0 => None,
        1 => Some(profile("u1", Role::User)),
        _ => Some(profile("u1", Role::Admin)),
    };
    AuthState { session, profile, loading }
}

// =============================================================================
// evaluate
// =============================================================================

#[test]
fn never_allows_while_loading() {
    let mut rng = rand::rng();
    for _ in 0..500 {
        let state = random_state(&mut rng, true);
        for policy in [AccessPolicy::AUTHENTICATED, AccessPolicy::ADMIN] {
            assert_eq!(evaluate(&state, policy), GateDecision::Wait, "{state:?}");
        }
    }
}

#[test]
fn settled_states_never_wait() {
    let mut rng = rand::rng();
    for _ in 0..500 {
        let state = random_state(&mut rng, false);
        let decision = evaluate(&state, AccessPolicy::ADMIN);
        assert_ne!(decision, GateDecision::Wait);
        if decision == GateDecision::Allow {
            assert!(state.is_admin());
        }
    }
}

#[test]
fn signed_out_redirects_to_login() {
    assert_eq!(
        evaluate(&AuthState::signed_out(), AccessPolicy::AUTHENTICATED),
        GateDecision::Redirect(Redirect::Login)
    );
    assert_eq!(evaluate(&AuthState::signed_out(), AccessPolicy::ADMIN), GateDecision::Redirect(Redirect::Login));
}

#[test]
fn admin_policy_by_role() {
    let user = signed_in("u1", Some(Role::User));
    let admin = signed_in("u1", Some(Role::Admin));
    let no_profile = signed_in("u1", None);

    assert_eq!(evaluate(&user, AccessPolicy::AUTHENTICATED), GateDecision::Allow);
    assert_eq!(evaluate(&user, AccessPolicy::ADMIN), GateDecision::Redirect(Redirect::Dashboard));
    assert_eq!(evaluate(&admin, AccessPolicy::ADMIN), GateDecision::Allow);
    assert_eq!(evaluate(&no_profile, AccessPolicy::AUTHENTICATED), GateDecision::Allow);
    assert_eq!(evaluate(&no_profile, AccessPolicy::ADMIN), GateDecision::Redirect(Redirect::Dashboard));
}

#[test]
fn redirect_paths() {
    assert_eq!(Redirect::Login.path(), "/login");
    assert_eq!(Redirect::Dashboard.path(), "/dashboard");
    assert_eq!(Redirect::Admin.path(), "/admin");
    assert_eq!(Redirect::Home.path(), "/");
}

#[test]
fn decision_serializes_tagged() {
    let json = serde_json::to_value(GateDecision::Redirect(Redirect::Dashboard)).unwrap();
    assert_eq!(json, serde_json::json!({ "decision": "redirect", "target": "dashboard" }));
    let json = serde_json::to_value(GateDecision::Allow).unwrap();
    assert_eq!(json, serde_json::json!({ "decision": "allow" }));
}

// =============================================================================
// landing_redirect
// =============================================================================

#[test]
fn landing_redirect_by_role() {
    assert_eq!(landing_redirect(&signed_in("u1", Some(Role::Admin))), Some(Redirect::Admin));
    assert_eq!(landing_redirect(&signed_in("u1", Some(Role::User))), Some(Redirect::Dashboard));
    assert_eq!(landing_redirect(&signed_in("u1", None)), Some(Redirect::Dashboard));
    assert_eq!(landing_redirect(&AuthState::signed_out()), None);
    assert_eq!(landing_redirect(&AuthState::bootstrapping()), None);
}

// =============================================================================
// AccessGate
// =============================================================================

#[tokio::test]
async fn gate_follows_session_machine() {
    let backend = Arc::new(InMemoryIdentity::new());
    let profiles = Arc::new(InMemoryProfiles::new());
    let user_id = backend.add_account("ada@example.com", "secret1");
    profiles.provision(&user_id, "ada@example.com", Role::User);
    let machine = SessionMachine::start(backend, profiles);

    let mut gate = AccessGate::new(machine.subscribe(), AccessPolicy::AUTHENTICATED);
    assert_eq!(gate.decision(), GateDecision::Wait);
    assert!(!gate.should_render());
    assert_eq!(gate.resolved().await, Some(GateDecision::Redirect(Redirect::Login)));

    machine.sign_in("ada@example.com", "secret1").await.unwrap();
    let mut decision = gate.changed().await;
    while decision != Some(GateDecision::Allow) {
        assert_ne!(decision, None);
        decision = gate.changed().await;
    }
    assert!(gate.should_render());
}

#[tokio::test]
async fn gate_ends_with_machine() {
    let backend = Arc::new(InMemoryIdentity::new());
    let machine = SessionMachine::start(backend, Arc::new(InMemoryProfiles::new()));
    let mut gate = AccessGate::new(machine.subscribe(), AccessPolicy::ADMIN);
    assert_eq!(gate.policy(), AccessPolicy::ADMIN);
    gate.resolved().await;

    drop(machine);
    while let Some(decision) = gate.changed().await {
        assert_ne!(decision, GateDecision::Allow);
    }
    assert_eq!(gate.changed().await, None);
}

#[tokio::test]
async fn gate_ends_on_shutdown_while_machine_is_held() {
    let backend = Arc::new(InMemoryIdentity::new());
    let machine = SessionMachine::start(backend, Arc::new(InMemoryProfiles::new()));
    let mut gate = AccessGate::new(machine.subscribe(), AccessPolicy::AUTHENTICATED);
    gate.resolved().await;

    machine.shutdown();
    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while gate.changed().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
    assert_eq!(gate.decision(), GateDecision::Redirect(Redirect::Login));
    assert_eq!(machine.subscriber_count(), 0);
}

#[test]
fn session_without_profile_allows_authenticated() {
    let state = AuthState { session: Some(session("u9")), profile: None, loading: false };
    assert_eq!(evaluate(&state, AccessPolicy::AUTHENTICATED), GateDecision::Allow);
}
