//! Client-side session coordinator.
//!
//! ARCHITECTURE
//! ============
//! - `session`: the state machine that owns `AuthState` and keeps it in sync
//!   with an identity backend's events.
//! - `gate`: render/redirect decisions for protected views.
//! - `debounce`: coalescing of bursty calls into one delayed invocation.
//! - `backend`: the identity and profile seams, with Supabase and in-memory
//!   adapters.
//! - `login`, `account`: state for the login form and account menu.
//!
//! Navigation is never performed here; callers act on the `Redirect`s
//! returned by the gate, the login form, and the account menu.

pub mod account;
pub mod backend;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gate;
pub mod login;
pub mod session;
pub mod types;

pub use backend::{AuthEventHub, AuthSubscription, IdentityBackend, ProfileStore};
pub use config::{SessionConfig, SupabaseConfig};
pub use debounce::{Debounced, debounce};
pub use error::{AuthError, AuthErrorKind, BackendError, ConfigError};
pub use gate::{AccessGate, AccessPolicy, GateDecision, Redirect, evaluate};
pub use session::{SessionMachine, StateSubscription};
pub use types::{AuthContext, AuthEvent, AuthEventKind, AuthState, Profile, Role, Session};
