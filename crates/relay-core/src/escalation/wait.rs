//! Correlation-keyed wait handles
//!
//! A wait is a one-shot channel registered under a correlation id with a
//! deadline. The first resolution before the deadline is delivered; later or
//! duplicate resolutions are reported and dropped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};
use ulid::Ulid;

/// Longest wait accepted; longer timeouts are clamped
pub const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A human decision on an escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the escalated action may proceed
    pub approved: bool,
    /// Free-form decision text
    pub decision: String,
    /// Who decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
}

impl Decision {
    /// Approve
    #[must_use]
    pub fn approve(decision: impl Into<String>) -> Self {
        Self {
            approved: true,
            decision: decision.into(),
            decided_by: None,
        }
    }

    /// Reject
    #[must_use]
    pub fn reject(decision: impl Into<String>) -> Self {
        Self {
            approved: false,
            ..Self::approve(decision)
        }
    }

    /// With decider
    #[inline]
    #[must_use]
    pub fn by(mut self, decided_by: impl Into<String>) -> Self {
        self.decided_by = Some(decided_by.into());
        self
    }
}

/// What happened to a submitted decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// Handed to the waiter
    Delivered,
    /// No wait under this id, or it was already resolved
    Unknown,
    /// The deadline had passed
    Expired,
}

/// How a wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A decision arrived in time
    Decided(Decision),
    /// The deadline passed first
    TimedOut,
}

#[derive(Debug)]
struct PendingWait {
    deadline: Instant,
    sender: oneshot::Sender<Decision>,
}

/// Outstanding waits keyed by correlation id
#[derive(Debug, Default)]
pub struct WaitRegistry {
    pending: DashMap<String, PendingWait>,
}

impl WaitRegistry {
    /// Create new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait and return its handle
    ///
    /// The correlation id is `{prefix}-{ulid}`.
    pub fn create(self: &Arc<Self>, prefix: &str, timeout: Duration) -> WaitHandle {
        let correlation_id = format!("{prefix}-{}", Ulid::new());
        let timeout = timeout.min(MAX_WAIT);
        let deadline = Instant::now() + timeout;
        let deadline_utc = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta));

        let (sender, receiver) = oneshot::channel();
        self.pending
            .insert(correlation_id.clone(), PendingWait { deadline, sender });
        debug!(correlation_id = %correlation_id, timeout_secs = timeout.as_secs(), "Wait registered");

        WaitHandle {
            correlation_id,
            deadline,
            deadline_utc,
            receiver: Some(receiver),
            registry: Arc::clone(self),
        }
    }

    /// Deliver a decision to a waiting handle
    ///
    /// The entry is removed whatever the outcome, so a second call for the
    /// same id reports [`ResolveOutcome::Unknown`].
    pub fn resolve(&self, correlation_id: &str, decision: Decision) -> ResolveOutcome {
        let Some((_, pending)) = self.pending.remove(correlation_id) else {
            warn!(correlation_id = %correlation_id, "Decision for unknown or resolved wait ignored");
            return ResolveOutcome::Unknown;
        };
        if Instant::now() >= pending.deadline {
            warn!(correlation_id = %correlation_id, "Late decision ignored");
            return ResolveOutcome::Expired;
        }
        match pending.sender.send(decision) {
            Ok(()) => {
                debug!(correlation_id = %correlation_id, "Decision delivered");
                ResolveOutcome::Delivered
            }
            Err(_) => ResolveOutcome::Unknown,
        }
    }

    /// Outstanding correlation ids, sorted
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Whether a wait is outstanding
    #[must_use]
    pub fn contains(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Number of outstanding waits
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no wait is outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn discard(&self, correlation_id: &str) {
        self.pending.remove(correlation_id);
    }
}

/// Waiter side of a registered wait
///
/// Dropping the handle discards the wait.
#[derive(Debug)]
pub struct WaitHandle {
    correlation_id: String,
    deadline: Instant,
    deadline_utc: Option<DateTime<Utc>>,
    receiver: Option<oneshot::Receiver<Decision>>,
    registry: Arc<WaitRegistry>,
}

impl WaitHandle {
    /// Correlation id to hand to the decider
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Monotonic deadline
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wall-clock deadline, if representable
    #[must_use]
    pub fn deadline_utc(&self) -> Option<DateTime<Utc>> {
        self.deadline_utc
    }

    /// Block until a decision arrives or the deadline passes
    pub async fn wait(mut self) -> WaitOutcome {
        let Some(receiver) = self.receiver.take() else {
            return WaitOutcome::TimedOut;
        };
        match tokio::time::timeout_at(self.deadline, receiver).await {
            Ok(Ok(decision)) => WaitOutcome::Decided(decision),
            Ok(Err(_)) | Err(_) => {
                debug!(correlation_id = %self.correlation_id, "Wait timed out");
                WaitOutcome::TimedOut
            }
        }
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        self.registry.discard(&self.correlation_id);
    }
}
