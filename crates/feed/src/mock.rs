//! Scripted in-memory feed for testing.

use crate::FeedSource;
use crate::error::{ErrorKind, Result};
use crate::record::Record;
use async_trait::async_trait;
use std::collections::VecDeque;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// A canned reply, consumed by one call to [`FeedSource::fetch`].
#[derive(Debug, Clone)]
pub enum Reply {
    Records(Vec<Record>),
    Fail(ErrorKind),
}

/// Feed that answers each fetch with the next scripted [`Reply`] and records
/// the arguments it was called with.
///
/// Once the script runs out it answers with an empty batch, which is what a
/// caught-up index does.
///
/// # Examples
///
/// ```
/// use modindex_feed::mock::ScriptedFeed;
/// use modindex_feed::{FeedSource, Record, ZERO};
/// use time::macros::datetime;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let first = Record::new("example.com/a", "v1.0.0", datetime!(2020-01-01 0:00 UTC));
/// let feed = ScriptedFeed::new([vec![first.clone()]]);
/// assert_eq!(feed.fetch(ZERO, 10).await.unwrap(), vec![first]);
/// assert!(feed.fetch(ZERO, 10).await.unwrap().is_empty());
/// assert_eq!(feed.calls().await.len(), 2);
/// # }
/// ```
pub struct ScriptedFeed {
    name: String,
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(OffsetDateTime, u32)>>,
}

impl ScriptedFeed {
    pub fn new(batches: impl IntoIterator<Item = Vec<Record>>) -> Self {
        Self::with_replies(batches.into_iter().map(Reply::Records))
    }

    pub fn with_replies(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            name: "scripted".to_string(),
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Append another reply to the end of the script.
    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Every `(since, limit)` pair this feed has been polled with, in order.
    pub async fn calls(&self) -> Vec<(OffsetDateTime, u32)> {
        self.calls.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, since: OffsetDateTime, limit: u32) -> Result<Vec<Record>> {
        self.calls.lock().await.push((since, limit));
        match self.replies.lock().await.pop_front() {
            Some(Reply::Records(records)) => Ok(records),
            Some(Reply::Fail(kind)) => exn::bail!(kind),
            None => Ok(Vec::new()),
        }
    }
}
