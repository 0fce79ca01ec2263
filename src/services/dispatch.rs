use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::errors::{FleetError, FleetErrorKind};
use crate::services::gate::ConcurrencyGate;
use crate::services::hosts::Host;
use crate::services::logger::Logger;

/// Runs one command on one host. Every failure is reported inside the
/// returned result; implementations never fail the whole run themselves.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &Host, command: &str) -> ExecutionResult;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFailure {
    pub kind: FleetErrorKind,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl HostFailure {
    pub fn new(kind: FleetErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            exit_code: None,
            stderr: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Attaches trimmed stderr; blank stderr is dropped.
    pub fn with_stderr(mut self, stderr: &str) -> Self {
        let trimmed = stderr.trim();
        if !trimmed.is_empty() {
            self.stderr = Some(trimmed.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub host: Host,
    pub output: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<HostFailure>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(host: Host, output: &str) -> Self {
        Self {
            host,
            output: output.trim().to_string(),
            succeeded: true,
            failure: None,
            duration_ms: 0,
        }
    }

    pub fn failed(host: Host, failure: HostFailure) -> Self {
        Self {
            host,
            output: String::new(),
            succeeded: false,
            failure: Some(failure),
            duration_ms: 0,
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        let failure = self.failure.as_ref()?;
        Some(match failure.stderr.as_deref() {
            Some(stderr) => format!("{}\n{}", failure.detail, stderr),
            None => failure.detail.clone(),
        })
    }

    pub fn failure_kind(&self) -> Option<FleetErrorKind> {
        self.failure.as_ref().map(|failure| failure.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Completion order, not submission order.
    pub results: Vec<ExecutionResult>,
    pub peak_in_flight: usize,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let succeeded = self.results.iter().filter(|r| r.succeeded).count();
        RunSummary {
            total: self.results.len(),
            succeeded,
            failed: self.results.len() - succeeded,
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| r.succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.iter().filter(|r| !r.succeeded)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub workers: usize,
    /// Abort the whole run on the first wait failure instead of recording it.
    pub fail_fast: bool,
}

type Observer = Arc<dyn Fn(&ExecutionResult) + Send + Sync>;

/// Fans a command out to many hosts through a [`ConcurrencyGate`] and
/// collects one [`ExecutionResult`] per host.
#[derive(Clone)]
pub struct Dispatcher {
    logger: Logger,
    executor: Arc<dyn RemoteExecutor>,
    options: DispatchOptions,
    observer: Option<Observer>,
}

impl Dispatcher {
    pub fn new(logger: Logger, executor: Arc<dyn RemoteExecutor>, options: DispatchOptions) -> Self {
        Self {
            logger: logger.child("dispatch"),
            executor,
            options,
            observer: None,
        }
    }

    /// Called on the collecting task for each result as it arrives.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ExecutionResult) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Like [`Dispatcher::run_until`], cancelled by Ctrl-C.
    pub async fn run(&self, hosts: Vec<Host>, command: &str) -> Result<RunReport, FleetError> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        self.run_until(hosts, command, interrupt).await
    }

    pub async fn run_until<F>(
        &self,
        hosts: Vec<Host>,
        command: &str,
        shutdown: F,
    ) -> Result<RunReport, FleetError>
    where
        F: Future<Output = ()>,
    {
        let total = hosts.len();
        let gate = ConcurrencyGate::new(self.options.workers);
        let command: Arc<str> = Arc::from(command);
        let (tx, mut rx) = mpsc::unbounded_channel::<ExecutionResult>();
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(total);

        let mut pending = hosts.into_iter();
        let mut next = pending.next();
        // The collector finishes once this sender and every task's clone are gone.
        let mut sender = next.as_ref().map(|_| tx);

        self.logger.debug(
            "dispatch started",
            Some(&serde_json::json!({ "hosts": total, "workers": gate.limit() })),
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tasks.abort_all();
                    gate.close();
                    return Err(FleetError::interrupted(format!(
                        "Run interrupted with {} of {} hosts finished",
                        results.len(),
                        total
                    )));
                }
                received = rx.recv() => {
                    let Some(result) = received else {
                        break;
                    };
                    if let Some(observer) = self.observer.as_ref() {
                        observer(&result);
                    }
                    if self.options.fail_fast && result.failure_kind() == Some(FleetErrorKind::Wait) {
                        tasks.abort_all();
                        gate.close();
                        let detail = result.error_detail().unwrap_or_default();
                        return Err(FleetError::wait(detail).with_host(result.host.as_str()));
                    }
                    results.push(result);
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                admitted = gate.admit(), if next.is_some() => {
                    let slot = admitted?;
                    let (Some(host), Some(reply_to)) = (next.take(), sender.clone()) else {
                        continue;
                    };
                    self.logger.debug(
                        &format!("{} admitted", host),
                        Some(&serde_json::json!({ "in_flight": slot.admitted_at() })),
                    );
                    let executor = self.executor.clone();
                    let command = command.clone();
                    let logger = self.logger.clone();
                    let gate_view = gate.clone();
                    tasks.spawn(async move {
                        let mut reply = Reply::new(host.clone(), reply_to);
                        let started = Instant::now();
                        let mut result = executor.execute(&host, &command).await;
                        result.duration_ms = started.elapsed().as_millis() as u64;
                        drop(slot);
                        logger.debug(
                            &format!("{} released", host),
                            Some(&serde_json::json!({ "in_flight": gate_view.in_flight() })),
                        );
                        reply.send(result);
                    });
                    next = pending.next();
                    if next.is_none() {
                        sender = None;
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}

        let report = RunReport {
            results,
            peak_in_flight: gate.peak(),
        };
        let summary = report.summary();
        self.logger.debug(
            "dispatch finished",
            Some(&serde_json::json!({
                "total": summary.total,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "peak_in_flight": report.peak_in_flight,
            })),
        );
        Ok(report)
    }
}

/// Guarantees one result per host: if the task unwinds before sending,
/// an internal failure is sent on drop instead.
struct Reply {
    host: Host,
    sender: Option<mpsc::UnboundedSender<ExecutionResult>>,
}

impl Reply {
    fn new(host: Host, sender: mpsc::UnboundedSender<ExecutionResult>) -> Self {
        Self {
            host,
            sender: Some(sender),
        }
    }

    fn send(&mut self, result: ExecutionResult) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(result);
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let failure = HostFailure::new(
                FleetErrorKind::Internal,
                "Execution task ended without a result",
            );
            let _ = sender.send(ExecutionResult::failed(self.host.clone(), failure));
        }
    }
}
