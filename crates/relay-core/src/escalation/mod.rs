//! Escalation Coordinator
//!
//! Hands a failure to humans and waits for their decision:
//!
//! ```text
//! Created -> Notifying -> Waiting -> Decided
//!                                 -> TimedOut
//! ```
//!
//! Notifications are fire-and-forget: a failed delivery is logged and the
//! wait proceeds. A timeout is a terminal outcome, not an error.

mod wait;

pub use wait::{Decision, ResolveOutcome, WaitHandle, WaitOutcome, WaitRegistry, MAX_WAIT};

use crate::config::EscalationConfig;
use crate::error::RelayError;
use crate::notify::{Dispatcher, NotificationPriority, NotificationRequest, NotificationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Decision text reported when nobody answered in time
pub const TIMEOUT_DECISION: &str = "escalation timed out";

/// Escalation severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Info,
    /// Needs attention
    Warning,
    /// Something failed
    #[default]
    Error,
    /// Something failed badly
    Critical,
}

impl Severity {
    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Notification priority for this severity
    #[must_use]
    pub fn priority(self) -> NotificationPriority {
        match self {
            Self::Critical => NotificationPriority::Critical,
            _ => NotificationPriority::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    /// Record built
    Created,
    /// Notifications being sent
    Notifying,
    /// Blocked on a decision
    Waiting,
    /// A decision arrived
    Decided,
    /// The deadline passed
    TimedOut,
}

/// A request for human judgment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escalation {
    /// Pipeline run that escalated
    pub run_id: String,
    /// What was being attempted
    pub task_description: String,
    /// Why it needs a human
    pub reason: String,
    /// Severity
    #[serde(default)]
    pub severity: Severity,
    /// Notify the marketer audience
    #[serde(default = "yes")]
    pub notify_marketer: bool,
    /// Notify the admin audience
    #[serde(default = "yes")]
    pub notify_admin: bool,
    /// Extra structured context
    #[serde(default)]
    pub context: Map<String, Value>,
}

fn yes() -> bool {
    true
}

impl Escalation {
    /// Create new escalation notifying both audiences
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        task_description: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            task_description: task_description.into(),
            reason: reason.into(),
            severity: Severity::default(),
            notify_marketer: true,
            notify_admin: true,
            context: Map::new(),
        }
    }

    /// Build from an engine error
    ///
    /// The reason is the error message; the context carries the error kind
    /// and, for exhausted chains, the attempted services.
    #[must_use]
    pub fn from_error(
        run_id: impl Into<String>,
        task_description: impl Into<String>,
        error: &RelayError,
    ) -> Self {
        let mut escalation = Self::new(run_id, task_description, error.to_string())
            .with_context("error_kind", json!(error.kind()));
        if let Some(agent_id) = error.agent_id() {
            escalation = escalation.with_context("agent_id", json!(agent_id));
        }
        if let RelayError::AllServicesFailed {
            attempted_services, ..
        } = error
        {
            escalation = escalation.with_context("attempted_services", json!(attempted_services));
        }
        escalation
    }

    /// With severity
    #[inline]
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// With audiences
    #[inline]
    #[must_use]
    pub fn with_audiences(mut self, marketer: bool, admin: bool) -> Self {
        self.notify_marketer = marketer;
        self.notify_admin = admin;
        self
    }

    /// With context entry
    #[inline]
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    fn body(&self, correlation_id: &str) -> String {
        [
            format!("Task: {}", self.task_description),
            format!("Reason: {}", self.reason),
            format!("Severity: {}", self.severity),
            format!("Run ID: {}", self.run_id),
            format!("Correlation ID: {correlation_id}"),
            String::new(),
            "Reply with a decision for this correlation id to approve or reject the action."
                .to_string(),
        ]
        .join("\n")
    }
}

/// Final result of an escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    /// Whether the action may proceed
    pub approved: bool,
    /// Decision text
    pub decision: String,
    /// Who decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    /// Whether the deadline passed without a decision
    pub timed_out: bool,
    /// Correlation id of the wait
    pub correlation_id: String,
}

impl EscalationOutcome {
    /// Terminal state this outcome represents
    #[must_use]
    pub fn state(&self) -> EscalationState {
        if self.timed_out {
            EscalationState::TimedOut
        } else {
            EscalationState::Decided
        }
    }
}

/// An escalation whose notifications are out and whose wait is registered
#[derive(Debug)]
pub struct PendingEscalation {
    run_id: String,
    handle: WaitHandle,
    notifications: Vec<JoinHandle<NotificationResult>>,
}

impl PendingEscalation {
    /// Correlation id deciders must quote
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        self.handle.correlation_id()
    }

    /// Wall-clock deadline, if representable
    #[must_use]
    pub fn deadline_utc(&self) -> Option<DateTime<Utc>> {
        self.handle.deadline_utc()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> EscalationState {
        EscalationState::Waiting
    }

    /// Await the delivery results of the notifications sent so far
    ///
    /// Draining the results does not affect the wait.
    pub async fn notifications_settled(&mut self) -> Vec<NotificationResult> {
        let handles = std::mem::take(&mut self.notifications);
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(
                handle
                    .await
                    .unwrap_or_else(|err| NotificationResult::failed(err.to_string())),
            );
        }
        results
    }

    /// Block until a decision arrives or the deadline passes
    pub async fn wait(self) -> EscalationOutcome {
        let Self { run_id, handle, .. } = self;
        let correlation_id = handle.correlation_id().to_string();

        match handle.wait().await {
            WaitOutcome::Decided(decision) => {
                info!(
                    run_id = %run_id,
                    correlation_id = %correlation_id,
                    approved = decision.approved,
                    decided_by = ?decision.decided_by,
                    state = ?EscalationState::Decided,
                    "Human decision received"
                );
                EscalationOutcome {
                    approved: decision.approved,
                    decision: decision.decision,
                    decided_by: decision.decided_by,
                    timed_out: false,
                    correlation_id,
                }
            }
            WaitOutcome::TimedOut => {
                warn!(
                    run_id = %run_id,
                    correlation_id = %correlation_id,
                    state = ?EscalationState::TimedOut,
                    "Escalation timed out"
                );
                EscalationOutcome {
                    approved: false,
                    decision: TIMEOUT_DECISION.to_string(),
                    decided_by: None,
                    timed_out: true,
                    correlation_id,
                }
            }
        }
    }
}

/// Sends escalation notifications and manages decision waits
#[derive(Debug, Clone)]
pub struct EscalationCoordinator {
    dispatcher: Arc<Dispatcher>,
    waits: Arc<WaitRegistry>,
    config: EscalationConfig,
}

impl EscalationCoordinator {
    /// Create new coordinator
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, waits: Arc<WaitRegistry>, config: EscalationConfig) -> Self {
        Self {
            dispatcher,
            waits,
            config,
        }
    }

    /// Wait registry deciders resolve against
    #[must_use]
    pub fn waits(&self) -> &Arc<WaitRegistry> {
        &self.waits
    }

    /// Submit a decision for a pending escalation
    pub fn resolve(&self, correlation_id: &str, decision: Decision) -> ResolveOutcome {
        self.waits.resolve(correlation_id, decision)
    }

    /// Notification requests an escalation produces
    #[must_use]
    pub fn notifications_for(&self, escalation: &Escalation, correlation_id: &str) -> Vec<NotificationRequest> {
        let body = escalation.body(correlation_id);
        let priority = escalation.severity.priority();
        let mut requests = Vec::with_capacity(2);

        if escalation.notify_marketer {
            requests.push(NotificationRequest::new(
                self.config.marketer_channel,
                self.config.marketer_recipient.clone(),
                format!("Action Required: {}", escalation.task_description),
                body.clone(),
            ));
        }
        if escalation.notify_admin {
            requests.push(NotificationRequest::new(
                self.config.admin_channel,
                self.config.admin_recipient.clone(),
                format!(
                    "[{}] Agent Escalation: {}",
                    escalation.severity.as_str().to_uppercase(),
                    escalation.task_description
                ),
                body,
            ));
        }

        requests
            .into_iter()
            .map(|request| {
                request
                    .with_priority(priority)
                    .with_metadata("correlation_id", json!(correlation_id))
                    .with_metadata("run_id", json!(escalation.run_id))
                    .with_metadata("severity", json!(escalation.severity))
            })
            .collect()
    }

    /// Register the wait and send notifications
    ///
    /// The wait is registered before anything is sent, so a decision can
    /// never arrive for an id that does not exist yet. Must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn begin(&self, escalation: &Escalation, timeout: Option<Duration>) -> PendingEscalation {
        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        info!(
            run_id = %escalation.run_id,
            reason = %escalation.reason,
            severity = %escalation.severity,
            state = ?EscalationState::Created,
            "Human escalation triggered"
        );

        let handle = self
            .waits
            .create(&format!("escalation-{}", escalation.run_id), timeout);
        let correlation_id = handle.correlation_id().to_string();

        let requests = self.notifications_for(escalation, &correlation_id);
        info!(
            run_id = %escalation.run_id,
            correlation_id = %correlation_id,
            notifications = requests.len(),
            state = ?EscalationState::Notifying,
            "Sending escalation notifications"
        );
        let notifications = requests
            .into_iter()
            .map(|request| {
                let dispatcher = Arc::clone(&self.dispatcher);
                tokio::spawn(async move { dispatcher.dispatch(&request).await })
            })
            .collect();

        info!(
            run_id = %escalation.run_id,
            correlation_id = %correlation_id,
            timeout_secs = timeout.as_secs(),
            deadline = ?handle.deadline_utc(),
            state = ?EscalationState::Waiting,
            "Waiting for human decision"
        );

        PendingEscalation {
            run_id: escalation.run_id.clone(),
            handle,
            notifications,
        }
    }

    /// Notify and block until a decision or the deadline
    pub async fn escalate(&self, escalation: &Escalation, timeout: Option<Duration>) -> EscalationOutcome {
        self.begin(escalation, timeout).wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationChannel;

    fn coordinator() -> EscalationCoordinator {
        EscalationCoordinator::new(
            Arc::new(Dispatcher::new()),
            Arc::new(WaitRegistry::new()),
            EscalationConfig::default(),
        )
    }

    #[test]
    fn from_error_carries_chain() {
        let err = RelayError::AllServicesFailed {
            agent_id: "cognition".to_string(),
            attempted_services: vec!["a".to_string(), "b".to_string()],
            failures: vec![],
        };
        let escalation = Escalation::from_error("run-1", "plan campaign", &err);
        assert_eq!(escalation.severity, Severity::Error);
        assert!(escalation.notify_marketer && escalation.notify_admin);
        assert_eq!(escalation.context["error_kind"], "all_services_failed");
        assert_eq!(escalation.context["attempted_services"], json!(["a", "b"]));
        assert!(escalation.reason.contains("cognition"));
    }

    #[test]
    fn notification_formats() {
        let escalation = Escalation::new("run-1", "send newsletter", "quota").with_severity(Severity::Critical);
        let requests = coordinator().notifications_for(&escalation, "escalation-run-1-X");
        assert_eq!(requests.len(), 2);

        assert_eq!(requests[0].channel, NotificationChannel::Chat);
        assert_eq!(requests[0].recipient, "#marketing-alerts");
        assert_eq!(requests[0].subject, "Action Required: send newsletter");
        assert_eq!(requests[0].priority, NotificationPriority::Critical);

        assert_eq!(requests[1].channel, NotificationChannel::Email);
        assert_eq!(requests[1].subject, "[CRITICAL] Agent Escalation: send newsletter");
        assert!(requests[1].body.contains("Correlation ID: escalation-run-1-X"));
        assert_eq!(requests[1].metadata["correlation_id"], "escalation-run-1-X");
    }

    #[test]
    fn non_critical_is_warning_priority() {
        let escalation = Escalation::new("r", "t", "x")
            .with_severity(Severity::Info)
            .with_audiences(false, true);
        let requests = coordinator().notifications_for(&escalation, "id");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].priority, NotificationPriority::Warning);
        assert!(requests[0].subject.starts_with("[INFO]"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_an_outcome() {
        let outcome = coordinator()
            .escalate(&Escalation::new("r", "t", "x"), Some(Duration::from_secs(30)))
            .await;
        assert!(outcome.timed_out);
        assert!(!outcome.approved);
        assert_eq!(outcome.decision, TIMEOUT_DECISION);
        assert_eq!(outcome.state(), EscalationState::TimedOut);
    }
}
