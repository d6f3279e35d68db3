//! Engine-wide error type.
//!
//! One enum covering every failure mode of the core: caller misuse, builder
//! discipline violations, stream failures and exhausted priority-queue
//! bounds. Stream errors are fatal and surface unchanged at the public API
//! boundary; no error is swallowed inside a sweep.

use thiserror::Error;

use crate::ptr::{Level, Ptr};

/// Errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Misuse by the caller.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A builder call broke the descending-level discipline.
    #[error("level {level} violates the builder's level order")]
    InvalidLevel { level: Level },

    /// A builder call referenced a pointer the builder never issued.
    #[error("child {child:?} was not issued by this builder")]
    UnknownChild { child: Ptr },

    /// A stream read or write failed.
    #[error("stream i/o failure")]
    Io(#[from] std::io::Error),

    /// A priority queue outgrew the bound derived from the input's cuts.
    #[error("priority queue exceeded its bound of {bound} elements")]
    OutOfMemory { bound: u64 },

    /// An internal invariant was violated.
    #[error("internal invariant violated: {reason}")]
    Unreachable { reason: String },
}

impl Error {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument { reason: reason.into() }
    }

    pub fn unreachable(reason: impl Into<String>) -> Self {
        Error::Unreachable { reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = Error::InvalidLevel { level: 3 };
        assert_eq!(e.to_string(), "level 3 violates the builder's level order");

        let e = Error::invalid_argument("memory limit must be positive");
        assert!(e.to_string().contains("memory limit"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let e: Error = io.into();
        assert!(matches!(e, Error::Io(_)));
    }
}
