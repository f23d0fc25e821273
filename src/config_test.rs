use std::collections::HashMap;

use super::*;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect::<HashMap<_, _>>();
    move |key: &str| map.get(key).cloned()
}

// =============================================================================
// SessionConfig
// =============================================================================

#[test]
fn session_config_defaults() {
    let cfg = SessionConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg, SessionConfig::default());
    assert_eq!(cfg.profile_timeout, Duration::from_millis(DEFAULT_PROFILE_TIMEOUT_MS));
}

#[test]
fn session_config_parses_timeout() {
    let cfg = SessionConfig::from_lookup(lookup_from(&[("SESSION_PROFILE_TIMEOUT_MS", " 250 ")])).unwrap();
    assert_eq!(cfg.profile_timeout, Duration::from_millis(250));
}

#[test]
fn session_config_invalid_timeout_errors() {
    let err = SessionConfig::from_lookup(lookup_from(&[("SESSION_PROFILE_TIMEOUT_MS", "soon")])).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { var: "SESSION_PROFILE_TIMEOUT_MS", value: "soon".into() });
}

// =============================================================================
// SupabaseConfig
// =============================================================================

#[test]
fn supabase_config_requires_url() {
    let err = SupabaseConfig::from_lookup(lookup_from(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing("SUPABASE_URL"));
}

#[test]
fn supabase_config_requires_anon_key() {
    let err = SupabaseConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_ANON_KEY", "")]))
        .unwrap_err();
    assert_eq!(err, ConfigError::Missing("SUPABASE_ANON_KEY"));
}

#[test]
fn supabase_config_defaults_and_trims_url() {
    let cfg = SupabaseConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "https://x.supabase.co/"),
        ("SUPABASE_ANON_KEY", "anon"),
    ]))
    .unwrap();
    assert_eq!(cfg.url, "https://x.supabase.co");
    assert_eq!(cfg.profile_table, DEFAULT_PROFILE_TABLE);
    assert_eq!(
        cfg.timeouts,
        HttpTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );
}

#[test]
fn supabase_config_overrides() {
    let cfg = SupabaseConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "http://localhost:54321"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("SUPABASE_PROFILE_TABLE", "members"),
        ("SUPABASE_REQUEST_TIMEOUT_SECS", "5"),
        ("SUPABASE_CONNECT_TIMEOUT_SECS", "2"),
    ]))
    .unwrap();
    assert_eq!(cfg.profile_table, "members");
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 5, connect_secs: 2 });
}

#[test]
fn supabase_config_invalid_timeout_errors() {
    let err = SupabaseConfig::from_lookup(lookup_from(&[
        ("SUPABASE_URL", "http://localhost:54321"),
        ("SUPABASE_ANON_KEY", "anon"),
        ("SUPABASE_CONNECT_TIMEOUT_SECS", "-1"),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("SUPABASE_CONNECT_TIMEOUT_SECS"));
}

#[test]
fn supabase_config_debug_redacts_key() {
    let cfg = SupabaseConfig::new("http://localhost", "super-secret-anon");
    let debug = format!("{cfg:?}");
    assert!(!debug.contains("super-secret-anon"));
}
