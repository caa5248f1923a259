//! Testing utilities for Relay workspace
//!
//! Shared fixtures: scripted service clients, stub plugins, recording
//! channel adapters and subtask plans.

#![allow(missing_docs)]

use async_trait::async_trait;
use relay_core::{
    ChannelAdapter, ExecutionContext, InvocationResult, NotificationChannel, NotificationRequest,
    NotificationResult, PluginRunner, RelayError, ServiceClient, ServiceError, ServiceRequest,
    ServiceResponse, Subtask,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted client does on every call
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(Value),
    Fail(ServiceError),
    Delay(Duration, Box<Script>),
}

/// Service client with fixed behavior that records its calls
#[derive(Debug)]
pub struct ScriptedClient {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<(String, ServiceRequest)>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(output: Value) -> Arc<Self> {
        Self::new(Script::Succeed(output))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(Script::Fail(ServiceError::Transport(message.to_string())))
    }

    pub fn delayed(delay: Duration, then: Script) -> Arc<Self> {
        Self::new(Script::Delay(delay, Box::new(then)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, ServiceRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServiceClient for ScriptedClient {
    async fn complete(
        &self,
        model: &str,
        request: &ServiceRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));

        let mut script = &self.script;
        loop {
            match script {
                Script::Succeed(output) => {
                    return Ok(ServiceResponse::new(output.clone()).with_tokens(10))
                }
                Script::Fail(err) => return Err(err.clone()),
                Script::Delay(delay, then) => {
                    tokio::time::sleep(*delay).await;
                    script = then;
                }
            }
        }
    }
}

/// Plugin runner that echoes its input and tracks concurrency
#[derive(Debug, Default)]
pub struct CountingPlugin {
    delay: Option<Duration>,
    fail: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<Value>>,
}

impl CountingPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    /// Runner whose every run errors with `PluginFailed`
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PluginRunner for CountingPlugin {
    async fn run(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<InvocationResult, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.seen.lock().unwrap().push(input.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(RelayError::PluginFailed {
                agent_id: "counting".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(InvocationResult::succeeded(
            "stub",
            json!({ "input": input, "run_id": ctx.run_id }),
        ))
    }
}

/// Channel adapter that records every request
#[derive(Debug)]
pub struct RecordingChannel {
    channel: NotificationChannel,
    configured: bool,
    fail: bool,
    sent: Mutex<Vec<NotificationRequest>>,
}

impl RecordingChannel {
    pub fn new(channel: NotificationChannel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            configured: true,
            fail: false,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(channel: NotificationChannel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            configured: true,
            fail: true,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn channel(&self) -> NotificationChannel {
        self.channel
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, request: &NotificationRequest) -> NotificationResult {
        self.sent.lock().unwrap().push(request.clone());
        if self.fail {
            NotificationResult::failed("scripted delivery failure")
        } else {
            NotificationResult::sent(Some(format!("msg-{}", self.sent.lock().unwrap().len())))
        }
    }
}

/// Subtask with dependencies
pub fn subtask(id: &str, deps: &[&str]) -> Subtask {
    deps.iter()
        .fold(Subtask::new(id, format!("subtask {id}")), |task, dep| {
            task.depends_on(*dep)
        })
}

/// a -> {b, c} -> d
pub fn diamond_plan() -> Vec<Subtask> {
    vec![
        subtask("a", &[]),
        subtask("b", &["a"]),
        subtask("c", &["a"]),
        subtask("d", &["b", "c"]),
    ]
}
