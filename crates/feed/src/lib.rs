//! Client side of the Go module index feed.
//!
//! The index publishes every module version it learns about as a stream of
//! `{"Path", "Version", "Timestamp"}` objects. Pagination has no opaque
//! cursor: a caller asks for records `since` a timestamp (inclusive) and
//! receives at most `limit` of them, oldest first.
//!
//! The [`FeedSource`] trait is the seam between the synchronizer and the
//! network. [`FeedClient`] talks HTTP; the `mock` feature adds a scripted
//! in-memory implementation for tests in other crates.

mod client;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
mod record;
mod version;

pub use crate::client::{FeedClient, FeedSource, decode_records};
pub use crate::record::{Record, ZERO, format_timestamp, parse_timestamp};
pub use crate::version::VersionKind;

/// Default location of the public module index.
pub const DEFAULT_URL: &str = "https://index.golang.org/index";
/// Default page size; the index caps responses at 2000 records.
pub const DEFAULT_LIMIT: u32 = 2000;

/// Shared handle to any feed implementation.
pub type FeedHandle = std::sync::Arc<dyn FeedSource + Send + Sync>;
