//! Relay Core - execution and scheduling engine
//!
//! Coordinates pipeline stages that call remote reasoning services:
//! - Routes service aliases to provider clients
//! - Invokes fallback chains until one service succeeds
//! - Validates and dispatches plugin subtasks
//! - Groups dependent subtasks into parallel levels
//! - Escalates exhausted chains to humans and waits for a decision
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_core::prelude::*;
//!
//! # async fn example(router: Arc<Router>, dispatcher: Arc<Dispatcher>) {
//! let engine = Engine::new(RelayConfig::default(), router, dispatcher);
//!
//! let plan = vec![
//!     Subtask::new("a", "collect metrics"),
//!     Subtask::new("b", "summarize").depends_on("a"),
//! ];
//! let report = engine.run_plan(&plan, &ExecutionContext::new("session-1")).await;
//! println!("{} succeeded, {} failed", report.succeeded, report.failed);
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod invoker;
pub mod notify;
pub mod plugin;
pub mod registry;
pub mod router;
pub mod schema;
pub mod scheduler;
pub mod types;

// Re-exports for convenience
pub use config::{EscalationConfig, RelayConfig, SchedulerConfig, ServicesConfig};
pub use engine::Engine;
pub use error::{ConfigError, RelayError, SchemaViolation, ServiceError, ServiceFailure};
pub use escalation::{
    Decision, Escalation, EscalationCoordinator, EscalationOutcome, EscalationState,
    PendingEscalation, ResolveOutcome, Severity, WaitHandle, WaitOutcome, WaitRegistry,
};
pub use invoker::FallbackInvoker;
pub use notify::{
    ChannelAdapter, Dispatcher, NotificationChannel, NotificationPriority, NotificationRequest,
    NotificationResult,
};
pub use plugin::{PluginDescriptor, PluginRunner, PluginSummary, ServicePlugin};
pub use registry::PluginRegistry;
pub use router::{Complexity, Router, ServiceClient, ServiceHandle, ServiceResponse};
pub use schema::Schema;
pub use scheduler::{
    group, group_with_report, BatchExecutor, BatchReport, DispatchRoute, ExecutionLevel,
    FailureKind, LevelPlan, SubtaskOutcome,
};
pub use types::{
    ExecutionContext, InvocationResult, Priority, ServiceAssignment, ServiceRequest, Subtask,
    NO_SERVICE, UNASSIGNED_TARGET,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Relay Core
    pub use crate::{
        Decision, Dispatcher, Engine, Escalation, ExecutionContext, FallbackInvoker,
        InvocationResult, PluginDescriptor, PluginRegistry, PluginRunner, RelayConfig, RelayError,
        Router, ServiceClient, ServiceRequest, Subtask,
    };
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
