//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every kind here is fatal to the current run. Nothing is retried inside a
//! run; running the synchronizer again resumes from the last committed batch.
//! Overlap mismatches are not errors at all, see
//! [`ProtocolAnomaly`](crate::ProtocolAnomaly).

use derive_more::{Display, Error};
use modindex_feed::error::{Error as FeedError, ErrorKind as FeedErrorKind};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage of the run that failed.
///
/// ### Operational Errors
/// - [`ErrorKind::Decode`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Cursor`]
/// - [`ErrorKind::Transport`]
/// - [`ErrorKind::Storage`]
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resume cursor could not be read from the store.
    #[display("failed to read resume cursor")]
    Cursor,
    /// The feed could not be reached, timed out, or answered with an error
    /// status. Safe to run again later.
    #[display("failed to fetch from feed")]
    Transport,
    /// The feed answered with something that isn't a record stream.
    #[display("feed returned an undecodable batch")]
    Decode,
    /// The batch could not be committed and was rolled back.
    #[display("failed to persist batch")]
    Storage,
}
impl ErrorKind {
    /// Wrap a feed error, preserving the feed crate's `Exn` frame as a child
    /// in the error tree.
    #[track_caller]
    pub fn feed(err: FeedError) -> Error {
        let kind = match *err {
            FeedErrorKind::Decode => Self::Decode,
            _ => Self::Transport,
        };
        err.raise(kind)
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modindex_feed::error::Result as FeedResult;
    use rstest::rstest;

    fn failing(kind: FeedErrorKind) -> FeedResult<()> {
        exn::bail!(kind)
    }

    #[rstest]
    #[case(FeedErrorKind::Transport, ErrorKind::Transport, true)]
    #[case(FeedErrorKind::Timestamp, ErrorKind::Transport, true)]
    #[case(FeedErrorKind::Decode, ErrorKind::Decode, false)]
    fn test_feed_error_mapping(#[case] feed: FeedErrorKind, #[case] expected: ErrorKind, #[case] retryable: bool) {
        let err = ErrorKind::feed(failing(feed).unwrap_err());
        assert_eq!(*err, expected);
        assert_eq!(err.is_retryable(), retryable);
    }
}
