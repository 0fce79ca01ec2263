use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::constants::limits;
use crate::errors::FleetError;
use crate::services::aggregate::SizePolicy;
use crate::services::config::ConfigOverrides;
use crate::services::hosts::{normalize_hosts, split_host_list, Host};

#[derive(Debug, Parser)]
#[command(
    name = "fleetcmd",
    version,
    about = "Run shell commands across a fleet of hosts over SSH"
)]
pub struct Cli {
    /// Maximum number of hosts contacted at once.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Per-host command timeout in milliseconds; 0 disables it.
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,

    /// Private key used for every host.
    #[arg(long, global = true)]
    pub key: Option<PathBuf>,

    /// Remote username; defaults to the invoking user.
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Abort the whole run when a remote command fails after starting.
    #[arg(long = "fail-fast", global = true)]
    pub fail_fast: bool,

    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: FleetCommand,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workers: self.workers,
            timeout_ms: self.timeout_ms,
            key_path: self.key.clone(),
            user: self.user.clone(),
            fail_fast: self.fail_fast,
            log_level: self.log_level.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct NodeArgs {
    /// A node to run the command on. Repeatable.
    #[arg(short = 'n', long = "node")]
    pub node: Vec<String>,

    /// Comma separated list of nodes. Takes precedence over --node.
    #[arg(long)]
    pub nodes: Option<String>,
}

impl NodeArgs {
    pub fn hosts(&self) -> Result<Vec<Host>, FleetError> {
        let tokens = match self.nodes.as_deref() {
            Some(list) => split_host_list(list),
            None => self.node.clone(),
        };
        if tokens.is_empty() {
            return Err(FleetError::invalid_args("Node or Nodes must be specified")
                .with_hint("Use --node HOST (repeatable) or --nodes HOST1,HOST2."));
        }
        Ok(normalize_hosts(tokens))
    }
}

#[derive(Debug, Subcommand)]
pub enum FleetCommand {
    /// Run any command through ssh on every node.
    #[command(name = "sshcmd")]
    Sshcmd {
        #[command(flatten)]
        nodes: NodeArgs,

        /// The command to run.
        #[arg(short = 'c', long = "cmd")]
        cmd: String,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the largest files across all nodes.
    #[command(name = "largest-with-nodes", alias = "largestWithNodes")]
    LargestWithNodes {
        #[command(flatten)]
        nodes: NodeArgs,

        /// Run the listing through sudo.
        #[arg(long)]
        sudo: bool,

        /// Files listed per node.
        #[arg(long, default_value_t = limits::DEFAULT_LARGEST_TOP)]
        top: usize,

        /// How to settle differing sizes for one path: first, min or max.
        #[arg(long = "size-policy", default_value_t = SizePolicy::Max)]
        size_policy: SizePolicy,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}
