use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetErrorKind {
    Connection,
    Session,
    Start,
    Wait,
    Timeout,
    Parse,
    Configuration,
    InvalidArgs,
    Interrupted,
    Internal,
}

impl FleetErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            FleetErrorKind::Connection => "CONNECTION_FAILED",
            FleetErrorKind::Session => "SESSION_FAILED",
            FleetErrorKind::Start => "START_FAILED",
            FleetErrorKind::Wait => "WAIT_FAILED",
            FleetErrorKind::Timeout => "TIMEOUT",
            FleetErrorKind::Parse => "PARSE_FAILED",
            FleetErrorKind::Configuration => "CONFIGURATION",
            FleetErrorKind::InvalidArgs => "INVALID_ARGS",
            FleetErrorKind::Interrupted => "INTERRUPTED",
            FleetErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FleetError {
    pub kind: FleetErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl FleetError {
    pub fn new(kind: FleetErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            host: None,
            hint: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn wait(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Wait, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Configuration, message)
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::InvalidArgs, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Interrupted, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FleetErrorKind::Internal, message)
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.host.as_deref() {
            Some(host) => write!(f, "{}: {}", host, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for FleetError {}

#[cfg(test)]
mod tests {
    use super::{FleetError, FleetErrorKind};

    #[test]
    fn display_prefixes_host_when_known() {
        let err = FleetError::wait("Command failed: process exited with status 1")
            .with_host("b:22");
        assert_eq!(err.to_string(), "b:22: Command failed: process exited with status 1");
        assert_eq!(err.code, "WAIT_FAILED");
    }

    #[test]
    fn hint_does_not_leak_into_display() {
        let err = FleetError::configuration("Private key not found")
            .with_hint("Pass --key or set FLEETCMD_SSH_KEY.");
        assert_eq!(err.kind, FleetErrorKind::Configuration);
        assert_eq!(err.to_string(), "Private key not found");
        assert_eq!(err.hint.as_deref(), Some("Pass --key or set FLEETCMD_SSH_KEY."));
    }
}
