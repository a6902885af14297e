// ABOUTME: Backend error types with SNAFU pattern.
// ABOUTME: Classifies fleet manager and routing layer failures for programmatic handling.

use snafu::Snafu;
use std::fmt;
use std::time::Duration;

/// The external system a request was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalSystem {
    FleetManager,
    RoutingLayer,
}

impl fmt::Display for ExternalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalSystem::FleetManager => f.write_str("fleet manager"),
            ExternalSystem::RoutingLayer => f.write_str("routing layer"),
        }
    }
}

/// Failure talking to the fleet manager or routing layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    #[snafu(display("{system} unreachable: {message}"))]
    Unreachable {
        system: ExternalSystem,
        message: String,
    },

    #[snafu(display("{system} connection failed: {source}"))]
    Connect {
        system: ExternalSystem,
        source: std::io::Error,
    },

    #[snafu(display("{system} HTTP exchange failed: {source}"))]
    Transport {
        system: ExternalSystem,
        source: hyper::Error,
    },

    #[snafu(display("{system} request timed out after {timeout:?}"))]
    Timeout {
        system: ExternalSystem,
        timeout: Duration,
    },

    #[snafu(display("{system} rejected request ({status}): {message}"))]
    Rejected {
        system: ExternalSystem,
        status: u16,
        message: String,
    },

    #[snafu(display("{system} returned an unreadable response: {source}"))]
    Decode {
        system: ExternalSystem,
        source: serde_json::Error,
    },

    #[snafu(display("{system} protocol error: {message}"))]
    Protocol {
        system: ExternalSystem,
        message: String,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Could not reach the system; the request may not have been seen.
    Unreachable,
    /// The system answered and refused the request.
    Rejected,
    /// The system answered with something we could not understand.
    Protocol,
}

impl BackendError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> BackendErrorKind {
        match self {
            BackendError::Unreachable { .. }
            | BackendError::Connect { .. }
            | BackendError::Transport { .. }
            | BackendError::Timeout { .. } => BackendErrorKind::Unreachable,
            BackendError::Rejected { .. } => BackendErrorKind::Rejected,
            BackendError::Decode { .. } | BackendError::Protocol { .. } => {
                BackendErrorKind::Protocol
            }
        }
    }

    pub fn system(&self) -> ExternalSystem {
        match self {
            BackendError::Unreachable { system, .. }
            | BackendError::Connect { system, .. }
            | BackendError::Transport { system, .. }
            | BackendError::Timeout { system, .. }
            | BackendError::Rejected { system, .. }
            | BackendError::Decode { system, .. }
            | BackendError::Protocol { system, .. } => *system,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == BackendErrorKind::Unreachable
    }

    pub(crate) fn unreachable(system: ExternalSystem, message: impl Into<String>) -> Self {
        BackendError::Unreachable {
            system,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable() {
        let err = BackendError::Timeout {
            system: ExternalSystem::RoutingLayer,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.kind(), BackendErrorKind::Unreachable);
        assert!(err.is_retryable());
        assert_eq!(err.system(), ExternalSystem::RoutingLayer);
    }

    #[test]
    fn rejections_are_final() {
        let err = BackendError::Rejected {
            system: ExternalSystem::FleetManager,
            status: 400,
            message: "min above desired".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("fleet manager rejected request (400)"));
    }
}
