//! Error types for the globeframe crate.

use std::fmt;
use std::time::Duration;

/// Result type for globeframe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling, submitting or picking frames.
#[derive(Debug, Clone)]
pub enum Error {
    /// A caller supplied a value outside the accepted domain.
    InvalidArgument {
        /// Where the argument was rejected.
        context: &'static str,
        /// Description of what was invalid.
        detail: String,
    },
    /// Retrieving or decoding an image source failed.
    Retrieval {
        /// The source that failed.
        key: String,
        /// The error message.
        message: String,
    },
    /// The render device rejected an operation.
    Device {
        /// The operation that failed.
        operation: &'static str,
        /// The error message.
        message: String,
    },
    /// A pick frame was not resolved by the GPU thread in time.
    PickTimeout {
        /// How long the caller waited.
        waited: Duration,
    },
    /// A layer, renderable or drawable failed.
    Render {
        /// The component that failed.
        context: String,
        /// The error message.
        message: String,
    },
    /// Configuration values are inconsistent.
    Config {
        /// Description of the problem.
        detail: String,
    },
}

impl Error {
    pub(crate) fn invalid(context: &'static str, detail: impl Into<String>) -> Self {
        Error::InvalidArgument {
            context,
            detail: detail.into(),
        }
    }

    pub(crate) fn device(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Device {
            operation,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument { context, detail } => {
                write!(f, "invalid argument to {context}: {detail}")
            }
            Error::Retrieval { key, message } => {
                write!(f, "retrieval of {key} failed: {message}")
            }
            Error::Device { operation, message } => {
                write!(f, "render device {operation} failed: {message}")
            }
            Error::PickTimeout { waited } => {
                write!(f, "pick was not resolved within {}ms", waited.as_millis())
            }
            Error::Render { context, message } => {
                write!(f, "rendering {context} failed: {message}")
            }
            Error::Config { detail } => write!(f, "invalid configuration: {detail}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Retrieval {
            key: "image".to_string(),
            message: e.to_string(),
        }
    }
}
