//! Configuration parsed from environment variables.
//!
//! Every `from_env` has a `from_lookup` twin taking a key lookup closure so
//! parsing can be exercised without touching process environment.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PROFILE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PROFILE_TABLE: &str = "profiles";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// SESSION CONFIG
// =============================================================================

/// Tuning for the session machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Upper bound on a single profile fetch. Expiry counts as "no profile".
    pub profile_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { profile_timeout: Duration::from_millis(DEFAULT_PROFILE_TIMEOUT_MS) }
    }
}

impl SessionConfig {
    /// - `SESSION_PROFILE_TIMEOUT_MS`: default 10000
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not a valid number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// # Errors
    ///
    /// Same as [`SessionConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let ms = parse_or("SESSION_PROFILE_TIMEOUT_MS", &lookup, DEFAULT_PROFILE_TIMEOUT_MS)?;
        Ok(Self { profile_timeout: Duration::from_millis(ms) })
    }
}

// =============================================================================
// SUPABASE CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

/// Connection settings for a Supabase project.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project base URL without trailing slash.
    pub url: String,
    pub anon_key: String,
    pub profile_table: String,
    pub timeouts: HttpTimeouts,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("profile_table", &self.profile_table)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl SupabaseConfig {
    /// Config with default table and timeouts.
    #[must_use]
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            profile_table: DEFAULT_PROFILE_TABLE.to_string(),
            timeouts: HttpTimeouts {
                request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        }
    }

    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `SUPABASE_PROFILE_TABLE`: default `profiles`
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a number is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// # Errors
    ///
    /// Same as [`SupabaseConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = required("SUPABASE_URL", &lookup)?;
        let anon_key = required("SUPABASE_ANON_KEY", &lookup)?;
        let mut config = Self::new(&url, &anon_key);
        if let Some(table) = lookup("SUPABASE_PROFILE_TABLE").filter(|t| !t.trim().is_empty()) {
            config.profile_table = table.trim().to_string();
        }
        config.timeouts = HttpTimeouts {
            request_secs: parse_or("SUPABASE_REQUEST_TIMEOUT_SECS", &lookup, DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: parse_or("SUPABASE_CONNECT_TIMEOUT_SECS", &lookup, DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };
        Ok(config)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Process environment lookup used by every `from_env`.
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn required(key: &'static str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<T>(key: &'static str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
