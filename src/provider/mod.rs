//! Provider seam: the hosted auth and data service the stores delegate to.
//!
//! DESIGN
//! ======
//! The stores depend on [`AuthProvider`] (browser-facing surface) and the
//! seeding workflow on [`RoleAdmin`] (service-role surface). Both are async
//! traits held as `Arc<dyn _>` so tests substitute hand-written mocks.
//! [`supabase::SupabaseClient`] implements both over REST.
//!
//! Session transitions are published on a `broadcast` channel. A receiver is
//! the subscription: dropping it unsubscribes.

pub mod supabase;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::role::Role;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by provider calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request could not be sent or the response not read.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Response { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("provider response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The operation needs an active session and there is none.
    #[error("no active session")]
    NoSession,

    /// The role table holds a value outside the known roles.
    #[error("unknown role value: {0:?}")]
    InvalidRole(String),

    /// An admin operation was attempted without a service-role key.
    #[error("service role key not configured")]
    MissingServiceKey,
}

impl ProviderError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Response { status: 429 | 500..=599, .. })
    }

    /// Whether the provider rejected the caller's credentials or token.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Response { status: 400 | 401 | 403 | 422, .. })
    }
}

// =============================================================================
// SESSION TYPES
// =============================================================================

/// Identity as the provider reports it, before a role is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// An active authentication issued by the provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: ProviderUser,
}

impl Session {
    /// True once the access token expires at or before `now` (unix seconds).
    /// A session without an expiry never expires.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Kind of session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One notification from the provider's session-change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Authentication and role lookup used by the session store.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// One-shot query for the session the provider currently holds.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider cannot be reached.
    async fn current_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to session transitions, whatever caused them.
    fn on_session_change(&self) -> broadcast::Receiver<SessionChange>;

    /// Verify credentials and establish a session.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Response`] when credentials are rejected, or
    /// a transport error.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError>;

    /// Terminate the current session.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider call fails.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Look up the role granted to `user_id`. `Ok(None)` when no record exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] on transport failure or an unknown role value.
    async fn query_role_by_user_id(&self, user_id: Uuid) -> Result<Option<Role>, ProviderError>;
}

/// Privileged account and role management, used only for seeding.
#[async_trait::async_trait]
pub trait RoleAdmin: Send + Sync {
    /// List every account in the project.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the listing fails.
    async fn list_users(&self) -> Result<Vec<ProviderUser>, ProviderError>;

    /// Create an account with a pre-confirmed email.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the account cannot be created.
    async fn create_user(&self, email: &str, password: &str) -> Result<ProviderUser, ProviderError>;

    /// Set the role for `user_id`, replacing an existing grant.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the write fails.
    async fn upsert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError>;

    /// Insert a role grant for `user_id`; fails if one already exists.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the write fails.
    async fn insert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError>;
}
