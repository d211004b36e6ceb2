/// Failure while consuming a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Reading the body failed after the stream had started.
    #[error("stream transport error: {0}")]
    Transport(String),
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
