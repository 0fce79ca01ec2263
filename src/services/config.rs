use crate::constants::{limits, network, remote};
use crate::errors::FleetError;
use crate::services::logger::LogLevel;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Values given on the command line. Anything left `None` falls back to the
/// environment, then to the built-in default.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub key_path: Option<PathBuf>,
    pub user: Option<String>,
    pub fail_fast: bool,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub workers: usize,
    pub exec_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    /// Per-stream cap on captured output; bytes past it are counted and dropped.
    pub max_capture_bytes: usize,
    pub key_path: PathBuf,
    pub user: String,
    pub fail_fast: bool,
    pub log_level: LogLevel,
}

impl FleetConfig {
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, FleetError> {
        let workers = match overrides.workers {
            Some(value) => value,
            None => resolve_workers()?,
        };
        if workers == 0 {
            return Err(FleetError::invalid_args("workers must be at least 1"));
        }

        let timeout_ms = overrides.timeout_ms.unwrap_or_else(resolve_exec_timeout_ms);
        let exec_timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));

        let key_path = overrides
            .key_path
            .or_else(|| std::env::var("FLEETCMD_SSH_KEY").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(remote::DEFAULT_KEY_PATH));

        let user = match overrides.user {
            Some(user) => user,
            None => resolve_user()?,
        };

        let log_level = match overrides.log_level.as_deref() {
            Some(raw) => LogLevel::parse(raw).ok_or_else(|| {
                FleetError::invalid_args(format!("Unknown log level: {}", raw))
                    .with_hint("Use one of: error, warn, info, debug.")
            })?,
            None => std::env::var("FLEETCMD_LOG_LEVEL")
                .ok()
                .and_then(|raw| LogLevel::parse(&raw))
                .unwrap_or(LogLevel::Info),
        };

        Ok(Self {
            workers,
            exec_timeout,
            connect_timeout: Duration::from_millis(resolve_connect_timeout_ms()),
            max_capture_bytes: resolve_max_capture_bytes(),
            key_path: expand_home_path(key_path),
            user,
            fail_fast: overrides.fail_fast || is_truthy_env("FLEETCMD_FAIL_FAST"),
            log_level,
        })
    }
}

fn resolve_workers() -> Result<usize, FleetError> {
    match std::env::var("FLEETCMD_WORKERS") {
        Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
            FleetError::invalid_args(format!("FLEETCMD_WORKERS is not a number: {}", raw))
        }),
        Err(_) => Ok(limits::DEFAULT_WORKERS),
    }
}

fn resolve_exec_timeout_ms() -> u64 {
    std::env::var("FLEETCMD_EXEC_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(network::TIMEOUT_SSH_EXEC_DEFAULT_MS)
}

fn resolve_connect_timeout_ms() -> u64 {
    std::env::var("FLEETCMD_CONNECT_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(network::TIMEOUT_CONNECTION_MS)
}

fn resolve_max_capture_bytes() -> usize {
    std::env::var("FLEETCMD_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(limits::DEFAULT_MAX_CAPTURE_BYTES)
}

fn resolve_user() -> Result<String, FleetError> {
    ["FLEETCMD_SSH_USER", "USER", "LOGNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .ok_or_else(|| {
            FleetError::configuration("Unable to determine the connecting username")
                .with_hint("Pass --user or set FLEETCMD_SSH_USER.")
        })
}

fn is_truthy_env(key: &str) -> bool {
    std::env::var(key)
        .map(|value| {
            matches!(
                value.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Some(text) = path.to_str() else {
        return path.to_path_buf();
    };
    let home = || std::env::var("HOME").ok().map(PathBuf::from);
    if text == "~" {
        return home().unwrap_or_else(|| path.to_path_buf());
    }
    match (text.strip_prefix("~/"), home()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
