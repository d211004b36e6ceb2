/// The source could not be made runnable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("source is empty")]
    Empty,
    #[error("no component entry point found (expected `export default` or a capitalised function/const)")]
    NoEntryPoint,
}

/// Recoverable sandbox failure. Never fatal to the host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),
    #[error("document template failed: {0}")]
    Template(String),
    #[error("realm failure: {0}")]
    Realm(String),
    /// A message posted by a document did not match the sandbox protocol.
    #[error("malformed sandbox message: {0}")]
    Message(String),
}
