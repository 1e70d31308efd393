//! Error types for the core library

use core::fmt;
use alloc::boxed::Box;
use alloc::string::String;

/// The core error type
#[derive(Debug, Clone)]
pub enum Error {
    /// Handle error
    Handle(HandleError),
    /// Version error
    Version(VersionError),
    /// Generic error with message
    Message(Box<str>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Handle(e) => write!(f, "Handle error: {}", e),
            Error::Version(e) => write!(f, "Version error: {}", e),
            Error::Message(msg) => write!(f, "{}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias
pub type Result<T> = core::result::Result<T, Error>;

/// Handle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// Handle is null
    Null,
    /// Handle is stale (already released)
    Stale,
    /// Handle index was never allocated
    OutOfBounds,
}

impl fmt::Display for HandleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleError::Null => write!(f, "Handle is null"),
            HandleError::Stale => write!(f, "Handle is stale (already released)"),
            HandleError::OutOfBounds => write!(f, "Handle was never allocated"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HandleError {}

impl From<HandleError> for Error {
    fn from(e: HandleError) -> Self {
        Error::Handle(e)
    }
}

/// Version errors
#[derive(Debug, Clone)]
pub enum VersionError {
    /// String is not "major.minor.patch"
    Malformed(Box<str>),
    /// Versions are not compatible
    Incompatible { required: Box<str>, found: Box<str> },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::Malformed(s) => write!(f, "Malformed version string: {}", s),
            VersionError::Incompatible { required, found } => {
                write!(f, "Incompatible version: requires {}, found {}", required, found)
            }
        }
    }
}

impl From<VersionError> for Error {
    fn from(e: VersionError) -> Self {
        Error::Version(e)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Message(s.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Message(s.into_boxed_str())
    }
}
