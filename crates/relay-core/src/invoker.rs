//! Fallback Invoker
//!
//! Tries an ordered list of service ids until one succeeds. Each id is
//! attempted at most once per call; an exhausted list is the only failure
//! that triggers escalation.

use crate::error::{RelayError, ServiceError, ServiceFailure};
use crate::router::{Router, ServiceResponse};
use crate::types::{InvocationResult, ServiceRequest};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Runs a request down a fallback chain
#[derive(Debug, Clone)]
pub struct FallbackInvoker {
    router: Arc<Router>,
    attempt_timeout: Option<Duration>,
}

impl FallbackInvoker {
    /// Create new invoker
    #[inline]
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            attempt_timeout: None,
        }
    }

    /// With per-attempt deadline
    ///
    /// An attempt that runs past the deadline counts as a failure and the
    /// chain advances.
    #[inline]
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Router used for resolution
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Invoke the chain for `role`
    ///
    /// # Arguments
    /// * `role` - Agent role or plugin id, used for logging and errors
    /// * `service_ids` - Chain to try, in order
    /// * `request` - Request sent unchanged to every attempt
    ///
    /// # Errors
    /// Returns [`RelayError::AllServicesFailed`] when every entry fails or
    /// the chain is empty. `attempted_services` is the full input list.
    pub async fn invoke<S: AsRef<str>>(
        &self,
        role: &str,
        service_ids: &[S],
        request: &ServiceRequest,
    ) -> Result<InvocationResult, RelayError> {
        let attempted: Vec<String> = service_ids.iter().map(|s| s.as_ref().to_string()).collect();
        if attempted.is_empty() {
            warn!(role = %role, "Invocation with empty service chain");
            return Err(RelayError::AllServicesFailed {
                agent_id: role.to_string(),
                attempted_services: attempted,
                failures: Vec::new(),
            });
        }

        // A step budget only makes sense when the service may use capabilities.
        let request = if request.capabilities.is_empty() && request.max_steps.is_some() {
            Cow::Owned(ServiceRequest {
                max_steps: None,
                ..request.clone()
            })
        } else {
            Cow::Borrowed(request)
        };

        let mut failures = Vec::with_capacity(attempted.len());
        for service_id in &attempted {
            info!(role = %role, service = %service_id, "Trying service");
            let started = Instant::now();

            match self.attempt(service_id, &request).await {
                Ok(response) => {
                    let elapsed = started.elapsed();
                    info!(
                        role = %role,
                        service = %service_id,
                        tokens = ?response.tokens_used,
                        steps = ?response.step_count,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Service succeeded"
                    );
                    return Ok(InvocationResult::succeeded(service_id.clone(), response.output)
                        .with_tokens(response.tokens_used)
                        .with_steps(Some(response.step_count.unwrap_or(1)))
                        .with_duration(elapsed));
                }
                Err(err) => {
                    warn!(role = %role, service = %service_id, error = %err, "Service failed");
                    failures.push(ServiceFailure {
                        service_id: service_id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        error!(role = %role, attempts = failures.len(), "All services exhausted");
        Err(RelayError::AllServicesFailed {
            agent_id: role.to_string(),
            attempted_services: attempted,
            failures,
        })
    }

    /// Invoke the router's chain for `role`
    ///
    /// # Errors
    /// As [`FallbackInvoker::invoke`].
    pub async fn invoke_for_role(
        &self,
        role: &str,
        request: &ServiceRequest,
    ) -> Result<InvocationResult, RelayError> {
        let chain = self.router.chain_for_role(role);
        self.invoke(role, &chain, request).await
    }

    async fn attempt(
        &self,
        service_id: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        let handle = self.router.resolve(service_id);
        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.call(request))
                .await
                .map_err(|_| ServiceError::Timeout(limit))?,
            None => handle.call(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{ServiceClient, ServiceResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Always {
        ok: bool,
        calls: AtomicUsize,
    }

    impl Always {
        fn new(ok: bool) -> Arc<Self> {
            Arc::new(Self {
                ok,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ServiceClient for Always {
        async fn complete(
            &self,
            model: &str,
            request: &ServiceRequest,
        ) -> Result<ServiceResponse, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(ServiceResponse::new(json!({ "model": model, "steps": request.max_steps })).with_tokens(7))
            } else {
                Err(ServiceError::Transport(format!("{model} unreachable")))
            }
        }
    }

    #[tokio::test]
    async fn first_success_wins() {
        let svc1 = Always::new(false);
        let svc2 = Always::new(true);
        let svc3 = Always::new(true);
        let router = Router::default()
            .with_provider("svc1", svc1.clone())
            .with_provider("svc2", svc2.clone())
            .with_provider("svc3", svc3.clone());
        let invoker = FallbackInvoker::new(Arc::new(router));

        let result = invoker
            .invoke("agency", &["svc1", "svc2", "svc3"], &ServiceRequest::new("go"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.service_used, "svc2");
        assert_eq!(result.tokens_used, Some(7));
        assert_eq!(result.step_count, Some(1));
        assert!(result.duration_ms.is_some());
        assert_eq!(svc1.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc3.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_makes_no_call() {
        let invoker = FallbackInvoker::new(Arc::new(Router::default()));
        let empty: [&str; 0] = [];
        let err = invoker
            .invoke("agency", &empty, &ServiceRequest::new("go"))
            .await
            .unwrap_err();
        match err {
            RelayError::AllServicesFailed {
                attempted_services,
                failures,
                ..
            } => {
                assert!(attempted_services.is_empty());
                assert!(failures.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_services_exhaust_chain() {
        let invoker = FallbackInvoker::new(Arc::new(Router::default()));
        let err = invoker
            .invoke("cognition", &["x:1", "y:2"], &ServiceRequest::new("go"))
            .await
            .unwrap_err();
        match err {
            RelayError::AllServicesFailed {
                agent_id,
                attempted_services,
                failures,
            } => {
                assert_eq!(agent_id, "cognition");
                assert_eq!(attempted_services, vec!["x:1", "y:2"]);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].service_id, "x:1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn step_budget_dropped_without_capabilities() {
        let ok = Always::new(true);
        let router = Router::default().with_provider("svc", ok);
        let invoker = FallbackInvoker::new(Arc::new(router));

        let bare = invoker
            .invoke("agency", &["svc"], &ServiceRequest::new("go").with_max_steps(5))
            .await
            .unwrap();
        assert!(bare.output["steps"].is_null());

        let tooled = invoker
            .invoke(
                "agency",
                &["svc"],
                &ServiceRequest::new("go")
                    .with_capabilities(["search"])
                    .with_max_steps(5),
            )
            .await
            .unwrap();
        assert_eq!(tooled.output["steps"], 5);
    }
}
