//! End-to-end: backend event → profile fetch → settled state → gate.

use std::sync::Arc;

use auth_session::backend::memory::{InMemoryIdentity, InMemoryProfiles, MemoryOptions};
use auth_session::types::SessionToken;
use auth_session::{
    AccessGate, AccessPolicy, AuthEvent, AuthEventKind, AuthState, GateDecision, Redirect, Role, Session,
    SessionMachine, evaluate,
};
use time::OffsetDateTime;

fn session(user_id: &str) -> Session {
    Session {
        user_id: user_id.into(),
        email: format!("{user_id}@example.com"),
        issued_at: OffsetDateTime::now_utc(),
        token: SessionToken { access_token: "token".into(), refresh_token: None, expires_at: None },
    }
}

async fn settled_signed_in(machine: &SessionMachine) -> AuthState {
    machine
        .subscribe()
        .wait_for(|s| s.is_signed_in() && !s.loading)
        .await
        .unwrap()
}

#[tokio::test]
async fn signed_in_event_settles_and_gates_by_role() {
    let backend = Arc::new(InMemoryIdentity::with_options(MemoryOptions {
        replay_initial_session: false,
        ..MemoryOptions::default()
    }));
    let profiles = Arc::new(InMemoryProfiles::new());
    profiles.provision("u1", "u1@example.com", Role::User);
    let machine = SessionMachine::start(backend.clone(), profiles);
    machine.subscribe().settled().await.unwrap();

    backend.emit(&AuthEvent::new(AuthEventKind::SignedIn, Some(session("u1"))));
    let state = settled_signed_in(&machine).await;

    assert_eq!(state.user_id(), Some("u1"));
    assert_eq!(state.profile.as_ref().map(|p| p.role), Some(Role::User));
    assert!(!state.loading);
    assert_eq!(evaluate(&state, AccessPolicy { require_admin: false }), GateDecision::Allow);
    assert_eq!(
        evaluate(&state, AccessPolicy { require_admin: true }),
        GateDecision::Redirect(Redirect::Dashboard)
    );
}

#[tokio::test]
async fn credentials_to_admin_view_and_back_out() {
    let backend = Arc::new(InMemoryIdentity::new());
    let profiles = Arc::new(InMemoryProfiles::new());
    let user_id = backend.add_account("root@example.com", "hunter22");
    profiles.provision(&user_id, "root@example.com", Role::Admin);
    let machine = SessionMachine::start(backend, profiles);
    let mut gate = AccessGate::new(machine.subscribe(), AccessPolicy::ADMIN);

    assert_eq!(gate.resolved().await, Some(GateDecision::Redirect(Redirect::Login)));

    machine.sign_in("Root@Example.com", "hunter22").await.unwrap();
    let state = settled_signed_in(&machine).await;
    assert!(state.is_admin());
    assert!(machine.context().is_admin);
    assert!(gate.should_render());

    let pending = machine.sign_out();
    assert_eq!(gate.decision(), GateDecision::Redirect(Redirect::Login));
    pending.await;
    assert_eq!(machine.snapshot(), AuthState::signed_out());
}

#[tokio::test]
async fn sign_up_without_profile_row_is_signed_in_without_profile() {
    let backend = Arc::new(InMemoryIdentity::new());
    let machine = SessionMachine::start(backend, Arc::new(InMemoryProfiles::new()));
    machine.subscribe().settled().await.unwrap();

    machine.sign_up("new@example.com", "secret1", Some("New Person")).await.unwrap();
    let state = settled_signed_in(&machine).await;
    assert!(state.profile.is_none());
    assert_eq!(evaluate(&state, AccessPolicy::AUTHENTICATED), GateDecision::Allow);
    assert_eq!(evaluate(&state, AccessPolicy::ADMIN), GateDecision::Redirect(Redirect::Dashboard));
}
