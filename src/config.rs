//! Configuration parsed from environment variables.
//!
//! The project URL and anon key accept the bundler-prefixed names the web
//! build uses (`VITE_*`, `NEXT_PUBLIC_*`) so one `.env` serves both.

use std::time::Duration;

use crate::role::Role;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_NOTIFY_DURATION_MS: u64 = 2000;

const URL_VARS: [&str; 3] = ["SUPABASE_URL", "VITE_SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
const ANON_KEY_VARS: [&str; 3] = ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];
const SERVICE_ROLE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// One or more required variables are unset. Each entry lists the
    /// accepted names for one setting.
    #[error("missing environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

impl HttpTimeouts {
    /// Reads `ROLEGATE_REQUEST_TIMEOUT_SECS` and `ROLEGATE_CONNECT_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            request_secs: env_parse("ROLEGATE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse("ROLEGATE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        })
    }
}

/// Connection settings for the hosted provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Project base URL without a trailing slash.
    pub url: String,
    pub anon_key: String,
    /// Privileged key. Only the seeding workflow needs it.
    pub service_role_key: Option<String>,
    pub timeouts: HttpTimeouts,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "<redacted>"))
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_owned(),
            anon_key: anon_key.into(),
            service_role_key: None,
            timeouts: HttpTimeouts::default(),
        }
    }

    /// Build provider config from environment variables.
    ///
    /// Required (first set name wins):
    /// - `SUPABASE_URL` | `VITE_SUPABASE_URL` | `NEXT_PUBLIC_SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY` | `VITE_SUPABASE_ANON_KEY` | `NEXT_PUBLIC_SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `SUPABASE_SERVICE_ROLE_KEY`
    /// - `ROLEGATE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ROLEGATE_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming every unset required setting,
    /// or [`ConfigError::Invalid`] for an unparsable timeout.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = first_env(&URL_VARS);
        let anon_key = first_env(&ANON_KEY_VARS);

        let (url, anon_key) = match (url, anon_key) {
            (Some(url), Some(key)) => (url, key),
            (url, key) => {
                let mut missing = Vec::new();
                if url.is_none() {
                    missing.push(URL_VARS.join(" or "));
                }
                if key.is_none() {
                    missing.push(ANON_KEY_VARS.join(" or "));
                }
                return Err(ConfigError::Missing(missing));
            }
        };

        let timeouts = HttpTimeouts::from_env()?;

        Ok(Self {
            url: url.trim_end_matches('/').to_owned(),
            anon_key,
            service_role_key: non_empty_env(SERVICE_ROLE_KEY_VAR),
            timeouts,
        })
    }

    /// Require the service-role key, as the seeding workflow does.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no service-role key is configured.
    pub fn require_service_role(&self) -> Result<&str, ConfigError> {
        self.service_role_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(vec![SERVICE_ROLE_KEY_VAR.to_owned()]))
    }
}

/// Session store policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Role granted when the role lookup misses, fails, or returns an
    /// unknown value. Least privilege unless a deployment opts otherwise.
    pub fallback_role: Role,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { fallback_role: Role::User }
    }
}

impl SessionConfig {
    /// Reads `ROLEGATE_FALLBACK_ROLE` (default `user`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the value is not a known role.
    pub fn from_env() -> Result<Self, ConfigError> {
        let fallback_role = match non_empty_env("ROLEGATE_FALLBACK_ROLE") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "ROLEGATE_FALLBACK_ROLE".into(), value: raw })?,
            None => Role::User,
        };
        Ok(Self { fallback_role })
    }
}

/// Notification queue tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Lifetime of a notification enqueued without an explicit duration.
    pub default_duration: Duration,
    /// Maximum live notifications; the oldest are dropped beyond it.
    /// `None` leaves the queue unbounded.
    pub max_len: Option<usize>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { default_duration: Duration::from_millis(DEFAULT_NOTIFY_DURATION_MS), max_len: None }
    }
}

impl NotifyConfig {
    /// Reads `ROLEGATE_NOTIFY_DURATION_MS` (default 2000) and
    /// `ROLEGATE_NOTIFY_MAX_LEN` (default unbounded; `0` also means unbounded).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparsable numbers.
    pub fn from_env() -> Result<Self, ConfigError> {
        let duration_ms = env_parse("ROLEGATE_NOTIFY_DURATION_MS", DEFAULT_NOTIFY_DURATION_MS)?;
        let max_len = env_parse("ROLEGATE_NOTIFY_MAX_LEN", 0usize)?;
        Ok(Self {
            default_duration: Duration::from_millis(duration_ms),
            max_len: (max_len > 0).then_some(max_len),
        })
    }
}

/// Everything the CLI needs, loaded in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub session: SessionConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// # Errors
    ///
    /// Propagates the first [`ConfigError`] from any section.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            provider: ProviderConfig::from_env()?,
            session: SessionConfig::from_env()?,
            notify: NotifyConfig::from_env()?,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_env(key))
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match non_empty_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { var: key.to_owned(), value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
