//! Incremental synchronization of the module index into the local mirror.
//!
//! A [`Synchronizer`] reads the resume cursor from the store, then repeatedly
//! polls the feed from the cursor's timestamp, strips the feed's echo of the
//! cursor with an [`OverlapPolicy`], and commits what is left as one
//! transaction. It stops when a poll yields nothing new, or when a committed
//! batch leaves the cursor where it was (the feed's newest records share a
//! timestamp, so the next poll would repeat the last one).
//!
//! ```ignore
//! let db = Database::connect("index.db").await?;
//! let feed: FeedHandle = Arc::new(FeedClient::new(DEFAULT_URL, timeout, "modindex")?);
//! let summary = Synchronizer::new(feed, Repository::from(&db)).run().await?;
//! ```

mod driver;
pub mod error;
mod merge;
mod progress;

pub use crate::driver::{Outcome, Summary, SyncEvent, SyncState, Synchronizer};
pub use crate::merge::{InclusiveOverlap, OverlapPolicy, ProtocolAnomaly, Reconciled};
pub use crate::progress::{Progress, covered_by, estimate};
