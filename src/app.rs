use std::sync::Arc;

use crate::cli::{Cli, FleetCommand};
use crate::errors::FleetError;
use crate::managers::ssh::SshExecutor;
use crate::services::aggregate::{aggregate_largest, LargestReport, SizePolicy};
use crate::services::auth::AuthContext;
use crate::services::config::FleetConfig;
use crate::services::dispatch::{DispatchOptions, Dispatcher, RemoteExecutor, RunReport, RunSummary};
use crate::services::hosts::Host;
use crate::services::logger::Logger;
use crate::utils::shell::{largest_files_command, wrap_login_shell};
use crate::utils::ui;

/// What a finished run reports back to `main`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub report: RunReport,
    pub largest: Option<LargestReport>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.summary.failed == 0 {
            0
        } else {
            2
        }
    }
}

/// A resolved plan for one invocation, independent of how hosts are reached.
#[derive(Debug, Clone)]
pub enum Job {
    Command {
        hosts: Vec<Host>,
        command: String,
        json: bool,
    },
    Largest {
        hosts: Vec<Host>,
        command: String,
        size_policy: SizePolicy,
        json: bool,
    },
}

impl Job {
    pub fn from_cli(command: &FleetCommand) -> Result<Self, FleetError> {
        match command {
            FleetCommand::Sshcmd { nodes, cmd, json } => {
                if cmd.trim().is_empty() {
                    return Err(FleetError::invalid_args("--cmd must not be empty"));
                }
                Ok(Job::Command {
                    hosts: nodes.hosts()?,
                    command: wrap_login_shell(cmd, false),
                    json: *json,
                })
            }
            FleetCommand::LargestWithNodes {
                nodes,
                sudo,
                top,
                size_policy,
                json,
            } => {
                if *top == 0 {
                    return Err(FleetError::invalid_args("--top must be at least 1"));
                }
                Ok(Job::Largest {
                    hosts: nodes.hosts()?,
                    command: wrap_login_shell(&largest_files_command(*top), *sudo),
                    size_policy: *size_policy,
                    json: *json,
                })
            }
        }
    }

    fn hosts(&self) -> &[Host] {
        match self {
            Job::Command { hosts, .. } | Job::Largest { hosts, .. } => hosts,
        }
    }

    fn remote_command(&self) -> &str {
        match self {
            Job::Command { command, .. } | Job::Largest { command, .. } => command,
        }
    }

    fn json(&self) -> bool {
        match self {
            Job::Command { json, .. } | Job::Largest { json, .. } => *json,
        }
    }
}

pub struct App {
    pub logger: Logger,
    pub config: FleetConfig,
}

impl App {
    pub fn initialize(cli: &Cli) -> Result<Self, FleetError> {
        let config = FleetConfig::resolve(cli.overrides())?;
        let logger = Logger::with_level("fleetcmd", config.log_level);
        Ok(Self { logger, config })
    }

    /// Loads the key before any host is contacted, then runs over SSH.
    pub async fn run(&self, cli: &Cli) -> Result<RunOutcome, FleetError> {
        let job = Job::from_cli(&cli.command)?;
        let auth = AuthContext::load(&self.config)?;
        self.logger.debug(
            "auth context loaded",
            Some(&serde_json::json!({
                "user": auth.username(),
                "key": auth.key_path().display().to_string(),
            })),
        );
        let executor = Arc::new(SshExecutor::new(self.logger.clone(), auth, &self.config));
        self.run_job(job, executor).await
    }

    pub async fn run_job(
        &self,
        job: Job,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Result<RunOutcome, FleetError> {
        self.logger.debug(
            "remote command",
            Some(&serde_json::json!({ "command": job.remote_command() })),
        );

        let json = job.json();
        let mut dispatcher = Dispatcher::new(
            self.logger.clone(),
            executor,
            DispatchOptions {
                workers: self.config.workers,
                fail_fast: self.config.fail_fast,
            },
        );
        if !json {
            dispatcher = dispatcher.with_observer(ui::print_host_result);
        }

        let report = dispatcher
            .run(job.hosts().to_vec(), job.remote_command())
            .await?;
        let summary = report.summary();
        self.logger.info(
            "run finished",
            Some(&serde_json::json!({
                "total": summary.total,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "peak_in_flight": report.peak_in_flight,
            })),
        );

        let largest = match &job {
            Job::Largest { size_policy, .. } => {
                let largest = aggregate_largest(&report.results, *size_policy);
                for warning in &largest.warnings {
                    self.logger.warn(
                        "skipped malformed listing line",
                        Some(&serde_json::json!({
                            "code": warning.kind.code(),
                            "host": warning.host,
                            "line": warning.line_number,
                            "reason": warning.reason,
                        })),
                    );
                }
                Some(largest)
            }
            Job::Command { .. } => None,
        };

        let outcome = RunOutcome {
            summary,
            report,
            largest,
        };
        self.render(&outcome, json)?;
        Ok(outcome)
    }

    fn render(&self, outcome: &RunOutcome, json: bool) -> Result<(), FleetError> {
        if json {
            let payload = match outcome.largest.as_ref() {
                Some(largest) => serde_json::json!({
                    "summary": outcome.summary,
                    "entries": largest.entries,
                    "warnings": largest.warnings,
                    "failures": outcome.report.failures().collect::<Vec<_>>(),
                }),
                None => serde_json::json!({
                    "summary": outcome.summary,
                    "results": outcome.report.results,
                }),
            };
            let text = serde_json::to_string_pretty(&payload)
                .map_err(|err| FleetError::internal(format!("Failed to encode JSON: {}", err)))?;
            println!("{}", text);
            return Ok(());
        }

        if let Some(largest) = outcome.largest.as_ref() {
            println!();
            ui::print_largest(largest);
        }
        let failures: Vec<_> = outcome.report.failures().cloned().collect();
        if !failures.is_empty() {
            println!();
            ui::print_results(&failures);
        }
        ui::print_summary(&outcome.summary);
        Ok(())
    }
}

/// Entry used by the binary: returns the process exit status.
pub async fn run(cli: Cli) -> Result<i32, FleetError> {
    let app = App::initialize(&cli)?;
    let outcome = app.run(&cli).await?;
    app.logger.debug(
        "logger stats",
        serde_json::to_value(app.logger.stats()).ok().as_ref(),
    );
    Ok(outcome.exit_code())
}
