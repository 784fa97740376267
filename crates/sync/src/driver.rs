use crate::error::{Error, ErrorKind, Result};
use crate::merge::{InclusiveOverlap, OverlapPolicy, ProtocolAnomaly};
use crate::progress::{Progress, covered_by};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use modindex_feed::{DEFAULT_LIMIT, FeedHandle, Record, ZERO};
use modindex_store::Repository;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Where the driver is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Reading the resume cursor.
    Init,
    Polling,
    Merging,
    Persisting,
    /// Caught up, or cancelled between batches.
    Done,
    Failed,
}
impl Display for SyncState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Init => "init",
            Self::Polling => "polling",
            Self::Merging => "merging",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

fn enter(state: SyncState) {
    tracing::debug!(%state, "sync state transition");
}

fn fail(err: Error) -> Error {
    enter(SyncState::Failed);
    err
}

/// Events emitted by [`Synchronizer::events`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. Per iteration: [`Progress`](Self::Progress) (once a cursor exists), an
///    optional [`Anomaly`](Self::Anomaly), then [`Committed`](Self::Committed)
///    if the iteration had anything new.
/// 3. [`CaughtUp`](Self::CaughtUp) or [`Cancelled`](Self::Cancelled), exactly
///    once.
///
/// A fatal error terminates the stream with an `Err` item instead of step 3.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The resume cursor was read. `None` means the store was empty.
    Started { cursor: Option<Record> },
    Progress(Progress),
    /// The batch did not start with the cursor. It is written anyway.
    Anomaly(ProtocolAnomaly),
    /// A batch was committed and the in-memory cursor moved to its last record.
    Committed { written: u64, cursor: Record },
    CaughtUp,
    /// The cancellation token was tripped between two batches.
    Cancelled,
}

/// How a run that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    CaughtUp,
    Cancelled,
}

/// Totals of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Committed batches.
    pub batches: u64,
    /// Distinct `(path, version)` pairs written across all batches.
    pub written: u64,
    pub anomalies: u64,
    /// Cursor at the end of the run. `None` only if the feed was empty.
    pub cursor: Option<Record>,
    pub outcome: Outcome,
}

/// Mirrors a feed into a store, one batch at a time, until it catches up.
///
/// The loop is strictly sequential: a batch is fetched, reconciled against
/// the cursor and committed before the next fetch is issued. The cursor is
/// read from the store once, when the run starts, and from then on is the last
/// record of the most recently committed batch.
pub struct Synchronizer {
    feed: FeedHandle,
    repo: Repository,
    policy: Box<dyn OverlapPolicy>,
    limit: u32,
    cancel: CancellationToken,
}
impl Synchronizer {
    pub fn new(feed: FeedHandle, repo: Repository) -> Self {
        Self {
            feed,
            repo,
            policy: Box::new(InclusiveOverlap),
            limit: DEFAULT_LIMIT,
            cancel: CancellationToken::new(),
        }
    }

    /// Maximum number of records requested per fetch.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_policy(mut self, policy: impl OverlapPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Stop between batches once `cancel` is tripped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Stream the run as [`SyncEvent`]s.
    ///
    /// Nothing happens until the stream is polled. Dropping the stream
    /// part-way stops the run; every batch committed before that point stays
    /// committed.
    pub fn events(&self) -> impl Stream<Item = Result<SyncEvent>> + '_ {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let started = OffsetDateTime::now_utc();
            let mut covered = Duration::ZERO;

            enter(SyncState::Init);
            let mut cursor = match self.repo.last_record().await.or_raise(|| ErrorKind::Cursor) {
                Ok(cursor) => cursor,
                Err(e) => {
                    yield Err(fail(e));
                    return;
                },
            };
            yield Ok(SyncEvent::Started { cursor: cursor.clone() });

            loop {
                if self.cancel.is_cancelled() {
                    tracing::info!("synchronization cancelled");
                    enter(SyncState::Done);
                    yield Ok(SyncEvent::Cancelled);
                    return;
                }
                if let Some(cursor) = &cursor {
                    let now = OffsetDateTime::now_utc();
                    yield Ok(SyncEvent::Progress(Progress::new(now - started, now, cursor.timestamp, covered)));
                }

                enter(SyncState::Polling);
                let since = cursor.as_ref().map_or(ZERO, |cursor| cursor.timestamp);
                let fetched = match self.feed.fetch(since, self.limit).await {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        yield Err(fail(ErrorKind::feed(e)));
                        return;
                    },
                };
                tracing::debug!(records = fetched.len(), "fetched batch");

                enter(SyncState::Merging);
                let reconciled = self.policy.reconcile(cursor.as_ref(), fetched);
                if let Some(anomaly) = reconciled.anomaly {
                    tracing::warn!(%anomaly, "feed protocol anomaly; keeping the whole batch");
                    yield Ok(SyncEvent::Anomaly(anomaly));
                }
                let records = reconciled.records;
                let Some(last) = records.last().cloned() else {
                    tracing::info!("caught up with the feed");
                    enter(SyncState::Done);
                    yield Ok(SyncEvent::CaughtUp);
                    return;
                };

                enter(SyncState::Persisting);
                let written = match self.repo.write_batch(&records).await.or_raise(|| ErrorKind::Storage) {
                    Ok(written) => written,
                    Err(e) => {
                        yield Err(fail(e));
                        return;
                    },
                };
                covered += covered_by(cursor.as_ref(), &records);
                tracing::debug!(written, cursor = %last.debug_string(), "committed batch");
                // Several records share the newest timestamp and the feed
                // returned them in an order that doesn't start with the
                // cursor. Polling again would return this exact batch.
                let stalled = cursor.as_ref() == Some(&last);
                cursor = Some(last.clone());
                yield Ok(SyncEvent::Committed { written, cursor: last });
                if stalled {
                    tracing::info!("caught up with the feed; cursor did not advance");
                    enter(SyncState::Done);
                    yield Ok(SyncEvent::CaughtUp);
                    return;
                }
            }
        })
    }

    /// Run to completion and report the totals.
    ///
    /// Fails with the first fatal error; batches committed before it stay
    /// committed and the next run resumes after them.
    #[instrument(skip(self), fields(feed = self.feed.name(), limit = self.limit, dry_run = self.repo.is_dry_run()))]
    pub async fn run(&self) -> Result<Summary> {
        let mut summary = Summary {
            batches: 0,
            written: 0,
            anomalies: 0,
            cursor: None,
            outcome: Outcome::Cancelled,
        };
        let mut events = std::pin::pin!(self.events());
        while let Some(event) = events.next().await {
            match event? {
                SyncEvent::Started { cursor } => summary.cursor = cursor,
                SyncEvent::Progress(_) => {},
                SyncEvent::Anomaly(_) => summary.anomalies += 1,
                SyncEvent::Committed { written, cursor } => {
                    summary.batches += 1;
                    summary.written += written;
                    summary.cursor = Some(cursor);
                },
                SyncEvent::CaughtUp => {
                    summary.outcome = Outcome::CaughtUp;
                    break;
                },
                SyncEvent::Cancelled => {
                    summary.outcome = Outcome::Cancelled;
                    break;
                },
            }
        }
        tracing::info!(batches = summary.batches, written = summary.written, outcome = ?summary.outcome, "synchronization finished");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SyncState::Init.to_string(), "init");
        assert_eq!(SyncState::Persisting.to_string(), "persisting");
        assert_eq!(SyncState::Failed.to_string(), "failed");
    }
}
