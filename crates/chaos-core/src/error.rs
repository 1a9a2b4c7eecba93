//! Error types for chaosd operations

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for chaosd operations
pub type Result<T> = std::result::Result<T, ChaosError>;

/// The entity a `NotFound` error is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Missing {
    /// No merged effect state exists for the target process
    Pid,
    /// No contribution exists for the request identifier
    Uid,
}

impl Missing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Missing::Pid => "PID",
            Missing::Uid => "UID",
        }
    }
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while supervising helpers or managing effects
#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("{0} not found")]
    NotFound(Missing),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("can not add: {0}")]
    CanNotAdd(String),

    #[error("can not assign: {0}")]
    CanNotAssign(String),

    #[error("failed to start {program}: {source}")]
    StartFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to signal process {pid}: {errno}")]
    SignalFailed { pid: i32, errno: nix::errno::Errno },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("procfs error: {0}")]
    ProcFs(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ChaosError>,
    },
}

/// Matchable discriminant of a [`ChaosError`], unaffected by context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DuplicateEntity,
    NotFound(Missing),
    NotImplemented(&'static str),
    CanNotAdd,
    CanNotAssign,
    StartFailed,
    SignalFailed,
    Cancelled,
    DeadlineExceeded,
    Io,
    ProcFs,
    InvalidConfig,
}

impl ChaosError {
    /// Wrap the error with a message while keeping its kind
    pub fn context(self, context: impl Into<String>) -> Self {
        ChaosError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ChaosError::DuplicateEntity(_) => ErrorKind::DuplicateEntity,
            ChaosError::NotFound(missing) => ErrorKind::NotFound(*missing),
            ChaosError::NotImplemented(op) => ErrorKind::NotImplemented(op),
            ChaosError::CanNotAdd(_) => ErrorKind::CanNotAdd,
            ChaosError::CanNotAssign(_) => ErrorKind::CanNotAssign,
            ChaosError::StartFailed { .. } => ErrorKind::StartFailed,
            ChaosError::SignalFailed { .. } => ErrorKind::SignalFailed,
            ChaosError::Cancelled => ErrorKind::Cancelled,
            ChaosError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            ChaosError::Io(_) => ErrorKind::Io,
            ChaosError::ProcFs(_) => ErrorKind::ProcFs,
            ChaosError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ChaosError::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound(_))
    }
}

/// Attach context to the error side of a `Result`
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
