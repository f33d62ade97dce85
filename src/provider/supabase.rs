//! Supabase REST client for the GoTrue auth endpoints and the PostgREST role table.
//!
//! Thin HTTP wrapper. Pure parsing in the `parse_*` functions for
//! testability. The session lives in memory only; nothing is persisted.
//!
//! ERROR HANDLING
//! ==============
//! Non-success statuses become [`ProviderError::Response`] carrying the
//! provider's own message (`error_description`, `msg`, `message`, `error`,
//! or the raw body) so callers can show it to the user unchanged.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AuthProvider, ProviderError, ProviderUser, RoleAdmin, Session, SessionChange, SessionEvent};
use crate::config::ProviderConfig;
use crate::role::Role;

const SESSION_CHANNEL_CAPACITY: usize = 16;
const ADMIN_PAGE_SIZE: usize = 200;
const ROLE_TABLE: &str = "user_roles";
/// Refresh this many seconds before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 30;

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    service_role_key: Option<String>,
    session: RwLock<Option<Session>>,
    changes: broadcast::Sender<SessionChange>,
}

impl SupabaseClient {
    /// Build a client from provider config.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::HttpClientBuild`] if the HTTP client fails to build.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;
        let (changes, _) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_owned(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
            session: RwLock::new(None),
            changes,
        })
    }

    /// Project base URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exchange the current refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::NoSession`] without an active session, or the
    /// provider's error if the refresh is rejected.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .session_snapshot()
            .map(|s| s.refresh_token)
            .ok_or(ProviderError::NoSession)?;

        let request = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=refresh_token", self.url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let body = send(request).await?;
        let session = parse_token_response(&body, unix_now())?;

        self.store_session(Some(session.clone()));
        self.emit(SessionEvent::TokenRefreshed, Some(session.clone()));
        debug!(user_id = %session.user.id, "session refreshed");
        Ok(session)
    }

    fn session_snapshot(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn emit(&self, event: SessionEvent, session: Option<Session>) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.changes.send(SessionChange { event, session });
    }

    /// Bearer for user-scoped requests: the session token when signed in,
    /// else the anon key.
    fn user_bearer(&self) -> String {
        self.session_snapshot()
            .map_or_else(|| self.anon_key.clone(), |s| s.access_token)
    }

    fn service_key(&self) -> Result<&str, ProviderError> {
        self.service_role_key
            .as_deref()
            .ok_or(ProviderError::MissingServiceKey)
    }

    fn admin_request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ProviderError> {
        let key = self.service_key()?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.url))
            .header("apikey", key)
            .bearer_auth(key))
    }
}

#[async_trait::async_trait]
impl AuthProvider for SupabaseClient {
    async fn current_session(&self) -> Result<Option<Session>, ProviderError> {
        let Some(session) = self.session_snapshot() else {
            return Ok(None);
        };
        if !session.is_expired(unix_now().saturating_add(EXPIRY_MARGIN_SECS)) {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user.id, "access token expired; refreshing");
        match self.refresh_session().await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "refresh rejected; clearing local session");
                self.store_session(None);
                self.emit(SessionEvent::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, ProviderError> {
        let request = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=password", self.url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": password }));
        let body = send(request).await?;
        let session = parse_token_response(&body, unix_now())?;

        self.store_session(Some(session.clone()));
        self.emit(SessionEvent::SignedIn, Some(session.clone()));
        info!(user_id = %session.user.id, "signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        if let Some(session) = self.session_snapshot() {
            let request = self
                .http
                .post(format!("{}/auth/v1/logout", self.url))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token);
            match send(request).await {
                Ok(_) => {}
                // The token is already invalid server-side; finish locally.
                Err(ProviderError::Response { status: 401 | 404, message }) => {
                    warn!(%message, "logout rejected token; clearing local session");
                }
                Err(e) => return Err(e),
            }
        }

        self.store_session(None);
        self.emit(SessionEvent::SignedOut, None);
        info!("signed out");
        Ok(())
    }

    async fn query_role_by_user_id(&self, user_id: Uuid) -> Result<Option<Role>, ProviderError> {
        let request = self
            .http
            .get(role_lookup_url(&self.url, user_id))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.user_bearer());
        let body = send(request).await?;
        parse_role_rows(&body)
    }
}

#[async_trait::async_trait]
impl RoleAdmin for SupabaseClient {
    async fn list_users(&self) -> Result<Vec<ProviderUser>, ProviderError> {
        let mut users = Vec::new();
        let mut page = 1usize;
        loop {
            let path = format!("/auth/v1/admin/users?page={page}&per_page={ADMIN_PAGE_SIZE}");
            let body = send(self.admin_request(reqwest::Method::GET, &path)?).await?;
            let batch = parse_user_page(&body)?;
            let done = batch.len() < ADMIN_PAGE_SIZE;
            users.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<ProviderUser, ProviderError> {
        let request = self
            .admin_request(reqwest::Method::POST, "/auth/v1/admin/users")?
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "email_confirm": true,
            }));
        let body = send(request).await?;
        parse_user(&body)
    }

    async fn upsert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError> {
        let path = format!("/rest/v1/{ROLE_TABLE}?on_conflict=user_id");
        let request = self
            .admin_request(reqwest::Method::POST, &path)?
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&role_row(user_id, role));
        send(request).await?;
        Ok(())
    }

    async fn insert_role(&self, user_id: Uuid, role: Role) -> Result<(), ProviderError> {
        let path = format!("/rest/v1/{ROLE_TABLE}");
        let request = self
            .admin_request(reqwest::Method::POST, &path)?
            .header("Prefer", "return=minimal")
            .json(&role_row(user_id, role));
        send(request).await?;
        Ok(())
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

async fn send(request: reqwest::RequestBuilder) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))?;

    if !status.is_success() {
        return Err(ProviderError::Response { status: status.as_u16(), message: parse_error_message(&text) });
    }
    Ok(text)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn role_lookup_url(base: &str, user_id: Uuid) -> String {
    format!("{base}/rest/v1/{ROLE_TABLE}?select=role&user_id=eq.{user_id}")
}

fn role_row(user_id: Uuid, role: Role) -> serde_json::Value {
    serde_json::json!({ "user_id": user_id, "role": role })
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

#[derive(serde::Deserialize)]
struct RoleRow {
    role: String,
}

#[derive(serde::Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

// =============================================================================
// PARSING
// =============================================================================

fn parse_token_response(json: &str, now: i64) -> Result<Session, ProviderError> {
    let token: TokenResponse = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let expires_at = token
        .expires_at
        .or_else(|| token.expires_in.map(|secs| now.saturating_add(secs)));
    Ok(Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        user: token.user,
    })
}

fn parse_role_rows(json: &str) -> Result<Option<Role>, ProviderError> {
    let rows: Vec<RoleRow> = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    match rows.into_iter().next() {
        Some(row) => row
            .role
            .parse()
            .map(Some)
            .map_err(|_| ProviderError::InvalidRole(row.role)),
        None => Ok(None),
    }
}

fn parse_user_page(json: &str) -> Result<Vec<ProviderUser>, ProviderError> {
    let page: UserPage = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(page.users)
}

/// Admin create returns the user object, older GoTrue versions wrap it in `{"user": ...}`.
fn parse_user(json: &str) -> Result<ProviderUser, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    let user = match value.get("user") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    serde_json::from_value(user).map_err(|e| ProviderError::Parse(e.to_string()))
}

fn parse_error_message(body: &str) -> String {
    const KEYS: [&str; 4] = ["error_description", "msg", "message", "error"];

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in KEYS {
            if let Some(message) = value.get(key).and_then(serde_json::Value::as_str) {
                return message.to_owned();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { "empty response".to_owned() } else { trimmed.to_owned() }
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
