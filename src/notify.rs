//! Notification queue of transient, severity-tagged messages for the user.
//!
//! DESIGN
//! ======
//! Entries live in a `watch` channel in insertion order (newest last) so a
//! display layer can render snapshots. Every entry with a non-zero
//! duration owns one Tokio timer task that removes it at its deadline.
//! Timer tasks hold only a weak reference to the queue.
//!
//! Manual dismissal aborts the entry's timer. Removal of an absent id is a
//! no-op, so a timer that loses a race with `dismiss` changes nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

use crate::config::NotifyConfig;

/// Vertical offset between stacked notifications, in pixels.
pub const STACK_OFFSET_PX: u32 = 10;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live entry in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub severity: Severity,
    pub message: String,
    /// Icon name or glyph the display layer renders next to the message.
    pub icon: Option<String>,
    /// Lifetime in milliseconds; 0 means it stays until dismissed.
    pub duration_ms: u64,
}

impl Notification {
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    #[must_use]
    pub fn is_sticky(&self) -> bool {
        self.duration_ms == 0
    }

    /// Stacking offset for the entry at `index` in display order.
    #[must_use]
    pub fn offset_px(index: usize) -> u32 {
        u32::try_from(index).unwrap_or(u32::MAX).saturating_mul(STACK_OFFSET_PX)
    }
}

/// Builder for a notification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    severity: Severity,
    message: String,
    icon: Option<String>,
    duration: Option<Duration>,
}

impl Notice {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { severity, message: message.into(), icon: None, duration: None }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Severity::Success, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Override the queue's default lifetime. `Duration::ZERO` keeps the
    /// entry until it is dismissed.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

// =============================================================================
// QUEUE
// =============================================================================

/// Cloneable handle to one shared queue. Must be used within a Tokio runtime.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    config: NotifyConfig,
    entries: watch::Sender<Vec<Notification>>,
    timers: Mutex<HashMap<NotificationId, AbortHandle>>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new(config: NotifyConfig) -> Self {
        let (entries, _) = watch::channel(Vec::new());
        Self { inner: Arc::new(QueueInner { config, entries, timers: Mutex::new(HashMap::new()) }) }
    }

    /// Append a notification and start its countdown.
    pub fn enqueue(
        &self,
        severity: Severity,
        message: impl Into<String>,
        icon: Option<String>,
        duration: Option<Duration>,
    ) -> NotificationId {
        let duration = duration.unwrap_or(self.inner.config.default_duration);
        let notification = Notification {
            id: NotificationId::generate(),
            severity,
            message: message.into(),
            icon,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };
        let id = notification.id;

        let mut evicted = Vec::new();
        let max_len = self.inner.config.max_len;
        self.inner.entries.send_modify(|entries| {
            entries.push(notification);
            if let Some(max) = max_len {
                let excess = entries.len().saturating_sub(max);
                evicted.extend(entries.drain(..excess).map(|n| n.id));
            }
        });
        debug!(notification_id = %id, %severity, ?duration, "notification enqueued");

        if !evicted.is_empty() {
            let mut timers = self.inner.lock_timers();
            for old in &evicted {
                if let Some(timer) = timers.remove(old) {
                    timer.abort();
                }
            }
            debug!(count = evicted.len(), "queue bound reached; oldest notifications dropped");
        }

        if !duration.is_zero() && !evicted.contains(&id) {
            self.start_timer(id, duration);
        }
        id
    }

    /// Enqueue a prepared [`Notice`].
    pub fn notify(&self, notice: Notice) -> NotificationId {
        self.enqueue(notice.severity, notice.message, notice.icon, notice.duration)
    }

    pub fn success(&self, message: impl Into<String>) -> NotificationId {
        self.notify(Notice::success(message))
    }

    pub fn error(&self, message: impl Into<String>) -> NotificationId {
        self.notify(Notice::error(message))
    }

    pub fn warning(&self, message: impl Into<String>) -> NotificationId {
        self.notify(Notice::warning(message))
    }

    pub fn info(&self, message: impl Into<String>) -> NotificationId {
        self.notify(Notice::info(message))
    }

    /// Remove `id` now and cancel its timer. Returns false if it was not live.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        if let Some(timer) = self.inner.lock_timers().remove(&id) {
            timer.abort();
        }
        let removed = self.inner.remove_entry(id);
        if removed {
            debug!(notification_id = %id, "notification dismissed");
        }
        removed
    }

    /// Remove every entry and cancel every timer.
    pub fn clear(&self) {
        for (_, timer) in self.inner.lock_timers().drain() {
            timer.abort();
        }
        self.inner.entries.send_if_modified(|entries| {
            let changed = !entries.is_empty();
            entries.clear();
            changed
        });
    }

    /// Live entries in display order.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.entries.borrow().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Number of countdowns still running.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.lock_timers().len()
    }

    /// Receiver notified whenever the set of live entries changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.entries.subscribe()
    }

    fn start_timer(&self, id: NotificationId, duration: Duration) {
        let queue: Weak<QueueInner> = Arc::downgrade(&self.inner);
        // Hold the map while spawning so the timer cannot look for its
        // handle before it is registered.
        let mut timers = self.inner.lock_timers();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(queue) = queue.upgrade() {
                queue.expire(id);
            }
        });
        timers.insert(id, task.abort_handle());
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(NotifyConfig::default())
    }
}

impl QueueInner {
    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<NotificationId, AbortHandle>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_entry(&self, id: NotificationId) -> bool {
        self.entries.send_if_modified(|entries| {
            let before = entries.len();
            entries.retain(|n| n.id != id);
            entries.len() != before
        })
    }

    fn expire(&self, id: NotificationId) {
        self.lock_timers().remove(&id);
        if self.remove_entry(id) {
            debug!(notification_id = %id, "notification expired");
        }
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, timer) in timers.drain() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "notify_test.rs"]
mod tests;
