//! Session/role store: who is signed in, and with what role.
//!
//! ARCHITECTURE
//! ============
//! The store keeps one authoritative [`SessionState`] in a `watch` channel.
//! It resolves identity from the provider's session and a role lookup, and
//! republishes on every session transition: startup, provider events, and
//! its own sign-in/sign-out.
//!
//! ORDERING
//! ========
//! Each resolution takes a ticket from a monotonic counter when it starts.
//! Publishing is a compare-and-set on the channel: a result is applied only
//! if its ticket is newer than the published revision. A slow lookup for an
//! older event can finish last and still never overwrite a newer one.
//!
//! ERROR HANDLING
//! ==============
//! Sign-in/sign-out failures propagate to the caller and leave the identity
//! untouched. Role lookup failures never propagate: they resolve to the
//! configured fallback role.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::provider::{AuthProvider, ProviderError, ProviderUser, Session, SessionChange};
use crate::role::Role;

// =============================================================================
// TYPES
// =============================================================================

/// The signed-in user with their resolved role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    /// Empty when the provider reports no email.
    pub email: String,
    pub role: Role,
}

/// Snapshot published to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// True until the first resolution is published, never again after.
    pub loading: bool,
    /// Ticket of the published resolution; 0 before the first.
    pub revision: u64,
}

impl SessionState {
    fn initial() -> Self {
        Self { identity: None, loading: true, revision: 0 }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|i| i.role)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in failed: {0}")]
    SignIn(#[source] ProviderError),
    #[error("sign-out failed: {0}")]
    SignOut(#[source] ProviderError),
}

impl AuthError {
    /// True when the provider rejected the credentials, as opposed to the
    /// call failing in transit.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        match self {
            Self::SignIn(e) => e.is_rejection(),
            Self::SignOut(_) => false,
        }
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Session/role store. Construct once with [`SessionStore::start`] and hand
/// references to whatever needs the identity.
pub struct SessionStore {
    inner: Arc<StoreInner>,
    listener: Option<JoinHandle<()>>,
}

struct StoreInner {
    provider: Arc<dyn AuthProvider>,
    fallback_role: Role,
    state: watch::Sender<SessionState>,
    next_ticket: AtomicU64,
    closed: AtomicBool,
}

impl SessionStore {
    /// Subscribe to the provider's session changes and resolve the current
    /// session in the background. The store is `loading` until that first
    /// resolution lands.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(provider: Arc<dyn AuthProvider>, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        let inner = Arc::new(StoreInner {
            provider,
            fallback_role: config.fallback_role,
            state,
            next_ticket: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        // Ticket the startup query before subscribing so every event
        // observed afterwards outranks it.
        let startup = inner.issue_ticket();
        let changes = inner.provider.on_session_change();
        let listener = tokio::spawn(listen(Arc::clone(&inner), changes));

        let initial = Arc::clone(&inner);
        tokio::spawn(async move {
            initial.reconcile_current(startup).await;
        });

        Self { inner, listener: Some(listener) }
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().identity.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Receiver that observes every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the first resolution has been published.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| !s.loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        }
    }

    /// Verify credentials with the provider and publish the resulting
    /// identity. When this returns `Ok`, the store reflects this sign-in or
    /// a newer transition.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignIn`] if the provider rejects the credentials
    /// or cannot be reached. The published identity is unchanged.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let session = self
            .inner
            .provider
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "sign-in rejected");
                AuthError::SignIn(e)
            })?;

        let ticket = self.inner.issue_ticket();
        let identity = self.inner.resolve(&session.user).await;
        self.inner.publish(ticket, Some(identity.clone()));
        info!(user_id = %identity.id, role = %identity.role, "session established");
        Ok(identity)
    }

    /// End the session with the provider and publish the anonymous state.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignOut`] if the provider call fails. The
    /// published identity is unchanged.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.inner.provider.sign_out().await.map_err(|e| {
            warn!(error = %e, "sign-out failed");
            AuthError::SignOut(e)
        })?;

        let ticket = self.inner.issue_ticket();
        self.inner.publish(ticket, None);
        info!("session cleared");
        Ok(())
    }

    /// Release the provider subscription and stop publishing. In-flight
    /// provider calls run to completion; their results are discarded.
    ///
    /// A store shut down before its first resolution settles as anonymous
    /// so that [`SessionStore::ready`] and subscribers waiting on `loading`
    /// wake up.
    pub fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.state.send_if_modified(|state| {
            let was_loading = state.loading;
            state.loading = false;
            was_loading
        });
        debug!("session store shut down");
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl StoreInner {
    fn issue_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Attach a role to a provider identity, falling back on miss or error.
    async fn resolve(&self, user: &ProviderUser) -> Identity {
        let role = match self.provider.query_role_by_user_id(user.id).await {
            Ok(Some(role)) => role,
            Ok(None) => {
                debug!(user_id = %user.id, fallback = %self.fallback_role, "no role record");
                self.fallback_role
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, fallback = %self.fallback_role, "role lookup failed");
                self.fallback_role
            }
        };
        Identity { id: user.id, email: user.email.clone().unwrap_or_default(), role }
    }

    async fn reconcile(&self, ticket: u64, session: Option<Session>) {
        let identity = match session {
            Some(session) => Some(self.resolve(&session.user).await),
            None => None,
        };
        self.publish(ticket, identity);
    }

    async fn reconcile_current(&self, ticket: u64) {
        let session = match self.provider.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "session query failed; treating as signed out");
                None
            }
        };
        self.reconcile(ticket, session).await;
    }

    /// Apply `identity` if `ticket` is newer than what is published.
    /// Either way the published revision is at least `ticket` afterwards,
    /// unless the store is closed.
    fn publish(&self, ticket: u64, identity: Option<Identity>) -> bool {
        let applied = self.state.send_if_modified(|state| {
            if self.is_closed() || ticket <= state.revision {
                return false;
            }
            state.identity = identity;
            state.loading = false;
            state.revision = ticket;
            true
        });
        if applied {
            debug!(ticket, "session state published");
        } else {
            debug!(ticket, "stale session resolution discarded");
        }
        applied
    }
}

/// Provider subscription loop. Tickets are issued in receive order; each
/// resolution then runs on its own task.
async fn listen(inner: Arc<StoreInner>, mut changes: broadcast::Receiver<SessionChange>) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                let ticket = inner.issue_ticket();
                debug!(ticket, event = ?change.event, "session change");
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    inner.reconcile(ticket, change.session).await;
                });
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "session changes lagged; re-reading current session");
                let ticket = inner.issue_ticket();
                let inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    inner.reconcile_current(ticket).await;
                });
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("session change stream closed");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
