//! Feed Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A feed error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never produced a usable response: connection failure,
    /// timeout, or a non-success HTTP status.
    #[display("feed transport error")]
    Transport,
    /// The response body contained something other than a stream of records.
    /// Usually means the feed changed its contract.
    #[display("malformed feed payload")]
    Decode,
    /// The configured feed URL is unusable.
    #[display("invalid feed url: {_0}")]
    InvalidUrl(#[error(not(source))] String),
    /// A timestamp could not be rendered for the request.
    #[display("invalid timestamp")]
    Timestamp,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }
}
