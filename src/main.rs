use std::sync::Arc;
use std::time::Duration;

use auth_session::backend::memory::{InMemoryIdentity, InMemoryProfiles};
use auth_session::backend::supabase::SupabaseClient;
use auth_session::config::env_lookup;
use auth_session::gate::landing_redirect;
use auth_session::{
    AccessPolicy, AuthContext, AuthError, BackendError, ConfigError, GateDecision, IdentityBackend, ProfileStore,
    SessionConfig, SessionMachine, StateSubscription, SupabaseConfig, evaluate,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How long `sign-up` waits for an auto-confirmed session to show up.
const SIGN_UP_SESSION_WAIT: Duration = Duration::from_secs(3);

/// Slack on top of the profile timeout for the `SignedIn` event to arrive.
const SIGN_IN_EVENT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend setup failed: {0}")]
    Backend(#[from] BackendError),
    #[error("{}: {}", .0.code(), .0)]
    Auth(#[from] AuthError),
    #[error("session machine stopped before auth state settled")]
    Stopped,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "auth-session", about = "Drive an auth session and print the resulting state")]
struct Cli {
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: Option<String>,

    /// Use a process-local backend instead of Supabase.
    #[arg(long, default_value_t = false)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and report the settled state.
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value_t = false)]
        require_admin: bool,
    },
    /// Register an account and report the resulting state.
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long, env = "AUTH_PASSWORD", hide_env_values = true)]
        password: String,
        /// Display name; defaults to the email.
        #[arg(long)]
        name: Option<String>,
    },
    /// Report the current state and gate decision.
    Check {
        #[arg(long, default_value_t = false)]
        require_admin: bool,
    },
}

#[derive(Serialize)]
struct Report {
    context: AuthContext,
    decision: GateDecision,
    landing: Option<&'static str>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    if dotenvy::dotenv().is_err() {
        debug!("no .env file loaded");
    }

    let cli = Cli::parse();
    let (backend, profiles) = build_backends(&cli)?;
    let session_config = SessionConfig::from_env()?;
    let sign_in_wait = session_config.profile_timeout + SIGN_IN_EVENT_GRACE;
    let machine = SessionMachine::start_with_config(backend, profiles, session_config);
    let mut states = machine.subscribe();
    states.settled().await.ok_or(CliError::Stopped)?;

    match cli.command {
        Command::SignIn { email, password, require_admin } => {
            machine.sign_in(&email, &password).await?;
            if !await_signed_in(&mut states, sign_in_wait).await? {
                warn!(wait = ?sign_in_wait, "sign in accepted but no session arrived");
            }
            print_report(&machine, AccessPolicy { require_admin })
        }
        Command::SignUp { email, password, name } => {
            machine.sign_up(&email, &password, name.as_deref()).await?;
            if !await_signed_in(&mut states, SIGN_UP_SESSION_WAIT).await? {
                info!("no session issued; the account may need confirmation");
            }
            print_report(&machine, AccessPolicy::AUTHENTICATED)
        }
        Command::Check { require_admin } => print_report(&machine, AccessPolicy { require_admin }),
    }
}

/// Wait up to `wait` for a settled signed-in state. `Ok(false)` on timeout.
async fn await_signed_in(states: &mut StateSubscription, wait: Duration) -> Result<bool, CliError> {
    let signed_in = states.wait_for(|s| s.is_signed_in() && !s.loading);
    match tokio::time::timeout(wait, signed_in).await {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Err(CliError::Stopped),
        Err(_) => Ok(false),
    }
}

fn build_backends(cli: &Cli) -> Result<(Arc<dyn IdentityBackend>, Arc<dyn ProfileStore>), CliError> {
    if cli.in_memory {
        info!("using in-memory backend");
        let backend: Arc<dyn IdentityBackend> = Arc::new(InMemoryIdentity::new());
        let profiles: Arc<dyn ProfileStore> = Arc::new(InMemoryProfiles::new());
        return Ok((backend, profiles));
    }

    let config = SupabaseConfig::from_lookup(|key| match key {
        "SUPABASE_URL" => cli.supabase_url.clone(),
        "SUPABASE_ANON_KEY" => cli.anon_key.clone(),
        _ => env_lookup(key),
    })?;
    info!(url = %config.url, table = %config.profile_table, "using supabase backend");
    let client = Arc::new(SupabaseClient::new(config)?);
    let backend: Arc<dyn IdentityBackend> = client.clone();
    let profiles: Arc<dyn ProfileStore> = client;
    Ok((backend, profiles))
}

fn print_report(machine: &SessionMachine, policy: AccessPolicy) -> Result<(), CliError> {
    let state = machine.snapshot();
    let report = Report {
        context: AuthContext::from(&state),
        decision: evaluate(&state, policy),
        landing: landing_redirect(&state).map(|r| r.path()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
