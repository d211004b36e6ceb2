/// Errors returned by the external collaborators (generation, validation,
/// integration, deployment, persistence and agent orchestration).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service rejected the caller's credentials or there was no session.
    #[error("unauthorized ({service})")]
    Unauthorized { service: String },
    /// The service answered with a non-success status.
    #[error("{service} failed with status {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },
    /// Network or body I/O failed before a response was available.
    #[error("transport error ({service}): {message}")]
    Transport { service: String, message: String },
    /// The response arrived but its shape was not what the contract promises.
    #[error("protocol error ({service}): {message}")]
    Protocol { service: String, message: String },
}

impl ServiceError {
    /// Creates an authorization failure.
    pub fn unauthorized(service: impl Into<String>) -> Self {
        Self::Unauthorized {
            service: service.into(),
        }
    }

    /// Creates a non-success status failure.
    pub fn status(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Creates a transport-level failure.
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level failure.
    pub fn protocol(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns the name of the service that failed.
    pub fn service(&self) -> &str {
        match self {
            Self::Unauthorized { service }
            | Self::Status { service, .. }
            | Self::Transport { service, .. }
            | Self::Protocol { service, .. } => service,
        }
    }
}

/// Failure of a multi-agent collaborative session. No partial result is
/// exposed when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    /// None of the requested responders is registered.
    #[error("no registered agents selected")]
    NoAgents,
    /// The orchestration service answered but reported `success: false`.
    #[error("orchestration rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}
