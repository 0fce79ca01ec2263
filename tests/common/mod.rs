#![allow(dead_code)]

use async_trait::async_trait;
use fleetcmd::errors::FleetErrorKind;
use fleetcmd::services::dispatch::{ExecutionResult, HostFailure, RemoteExecutor};
use fleetcmd::services::hosts::Host;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub static ENV_LOCK: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

#[derive(Clone, Debug)]
pub enum Behavior {
    Output(String),
    Fail(FleetErrorKind),
    Panic,
}

#[derive(Clone, Debug)]
struct Plan {
    latency: Duration,
    behavior: Behavior,
}

/// In-memory executor: per-host latency and outcome, with concurrency tracking.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    plans: Arc<Mutex<HashMap<String, Plan>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(self, host: &str, latency_ms: u64, behavior: Behavior) -> Self {
        self.plans.lock().expect("plans").insert(
            Host::normalize(host).to_string(),
            Plan {
                latency: Duration::from_millis(latency_ms),
                behavior,
            },
        );
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn execute(&self, host: &Host, command: &str) -> ExecutionResult {
        self.calls.lock().expect("calls").push(host.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let plan = self
            .plans
            .lock()
            .expect("plans")
            .get(host.as_str())
            .cloned()
            .unwrap_or(Plan {
                latency: Duration::from_millis(5),
                behavior: Behavior::Output(format!("ran {}", command)),
            });
        tokio::time::sleep(plan.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match plan.behavior {
            Behavior::Output(text) => ExecutionResult::success(host.clone(), &text),
            Behavior::Fail(kind) => ExecutionResult::failed(
                host.clone(),
                HostFailure::new(kind, format!("simulated {:?}", kind)),
            ),
            Behavior::Panic => panic!("simulated executor panic"),
        }
    }
}
