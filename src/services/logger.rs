use crate::services::hosts::Host;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Lines written per level over the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub errors: u64,
    pub warnings: u64,
    pub info: u64,
    pub debug: u64,
}

#[derive(Debug, Default)]
struct Tally([AtomicU64; 4]);

impl Tally {
    fn bump(&self, level: LogLevel) {
        self.0[level as usize].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LogStats {
        let read = |level: LogLevel| self.0[level as usize].load(Ordering::Relaxed);
        LogStats {
            errors: read(LogLevel::Error),
            warnings: read(LogLevel::Warn),
            info: read(LogLevel::Info),
            debug: read(LogLevel::Debug),
        }
    }
}

/// Leveled stderr logger. Scoped copies from [`Logger::child`] and
/// [`Logger::for_host`] share one tally.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    tally: Arc<Tally>,
}

impl Logger {
    pub fn with_level(context: &str, level: LogLevel) -> Self {
        Self {
            context: context.to_string(),
            level,
            tally: Arc::new(Tally::default()),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        self.scoped(format!("{}:{}", self.context, suffix))
    }

    /// Scope for one target, rendered as `context@host:port`.
    pub fn for_host(&self, host: &Host) -> Self {
        self.scoped(format!("{}@{}", self.context, host))
    }

    fn scoped(&self, context: String) -> Self {
        Self {
            context,
            level: self.level,
            tally: self.tally.clone(),
        }
    }

    fn render(&self, level: LogLevel, message: &str, meta: Option<&Value>) -> String {
        let mut line = format!(
            "{} {:<5} {}: {}",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            level.label(),
            self.context,
            message
        );
        if let Some(meta) = meta.filter(|meta| !meta.is_null()) {
            line.push(' ');
            line.push_str(&meta.to_string());
        }
        line
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if level > self.level {
            return;
        }
        self.tally.bump(level);
        eprintln!("{}", self.render(level, message, meta));
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    pub fn stats(&self) -> LogStats {
        self.tally.snapshot()
    }
}
