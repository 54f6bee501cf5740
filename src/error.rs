//! Error types for the proxy engine.

use std::fmt;

/// Error with an exit code, surfaced by fatal startup failures (bad CA,
/// port already in use).
#[derive(Debug)]
pub struct ErrorWithExitCode {
    code: i32,
    error: anyhow::Error,
}

impl ErrorWithExitCode {
    /// Create a new error with an exit code
    pub fn new(code: i32, error: impl Into<anyhow::Error>) -> Self {
        Self {
            code,
            error: error.into(),
        }
    }

    /// Get the exit error code
    pub fn exit_code(&self) -> i32 {
        self.code
    }
}

impl From<anyhow::Error> for ErrorWithExitCode {
    fn from(error: anyhow::Error) -> Self {
        Self { code: 1, error }
    }
}

impl fmt::Display for ErrorWithExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.error)
    }
}

impl std::error::Error for ErrorWithExitCode {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Errors raised while minting or loading certificates (C1/C2).
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("i/o error handling certificate files: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to generate key pair: {0}")]
    KeyGen(String),
    #[error("failed to build certificate: {0}")]
    Build(String),
    #[error("failed to parse certificate or key from pem: {0}")]
    Parse(String),
}

/// Errors raised by the decision store (C3).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backing store unreachable: {0}")]
    Unreachable(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Errors raised while driving a single connection's state machine
/// (C6/C7). These never cross a connection boundary; a worker that hits
/// one closes its own connection and logs, without affecting others.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("malformed CONNECT line")]
    MalformedConnect,
    #[error("certificate mint failure: {0}")]
    Mint(#[from] CertError),
    #[error("tls handshake failed: {0}")]
    TlsHandshake(String),
    #[error("upstream connection failed: {0}")]
    Upstream(String),
    #[error("decision timed out")]
    DecisionTimeout,
    #[error("backing store unreachable: {0}")]
    Store(#[from] StoreError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
