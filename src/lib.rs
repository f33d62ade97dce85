//! # rolegate
//!
//! Client-side session and notification state for a role-based web
//! application backed by a hosted auth/database provider (Supabase).
//!
//! This crate contains the session/role store, the transient notification
//! queue, the provider seam with its REST implementation, role-driven
//! dashboard selection, and the account-seeding workflow used by the CLI.
//!
//! DESIGN
//! ======
//! Both stores are constructed explicitly and passed to whatever needs them.
//! Consumers read `tokio::sync::watch` snapshots and call the store's
//! operations; nothing else mutates store state.

pub mod config;
pub mod dashboard;
pub mod notify;
pub mod provider;
pub mod role;
pub mod seed;
pub mod session;

pub use config::{AppConfig, ConfigError, HttpTimeouts, NotifyConfig, ProviderConfig, SessionConfig};
pub use notify::{Notice, Notification, NotificationId, NotificationQueue, Severity};
pub use provider::{AuthProvider, ProviderError, ProviderUser, RoleAdmin, Session, SessionChange, SessionEvent};
pub use role::Role;
pub use session::{AuthError, Identity, SessionState, SessionStore};
