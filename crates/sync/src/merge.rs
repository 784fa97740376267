//! Reconciling a fetched batch against the resume cursor.
//!
//! The feed has no opaque pagination token. A poll with `since = cursor`
//! returns the cursor record itself first, so the boundary between two
//! batches is detected by comparing records. That comparison is a policy
//! behind [`OverlapPolicy`] so it can be replaced if the feed ever grows a
//! proper cursor.

use modindex_feed::Record;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The first record of a batch was not the record the batch was supposed to
/// start from.
///
/// Not fatal: the batch is kept as-is and written, which is safe because
/// writes are idempotent on `(path, version)`. Worth an operator's attention
/// since it means the feed is not ordering-stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAnomaly {
    pub expected: Record,
    pub found: Record,
}
impl Display for ProtocolAnomaly {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "expected batch to start with {} but got {}",
            self.expected.debug_string(),
            self.found.debug_string()
        )
    }
}

/// Outcome of reconciling one fetched batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Records to persist, in feed order.
    pub records: Vec<Record>,
    pub anomaly: Option<ProtocolAnomaly>,
}
impl Reconciled {
    /// Nothing new arrived: the mirror has caught up with the feed.
    pub fn is_caught_up(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decides which fetched records are new, given the record the fetch was
/// anchored on (`None` when the store was empty).
pub trait OverlapPolicy: Send + Sync {
    fn reconcile(&self, cursor: Option<&Record>, fetched: Vec<Record>) -> Reconciled;
}

/// The module index convention: `since` is inclusive, so every batch after
/// the first repeats the cursor as its first element.
///
/// | Cursor | Fetched                    | Result                        |
/// |--------|----------------------------|-------------------------------|
/// | none   | anything                   | everything                    |
/// | `C`    | empty                      | nothing (caught up)           |
/// | `C`    | `[C]`                      | nothing (caught up)           |
/// | `C`    | `[C, D, E]`                | `[D, E]`                      |
/// | `C`    | `[X, D, E]` where `X != C` | `[X, D, E]`, anomaly reported |
#[derive(Debug, Default, Clone, Copy)]
pub struct InclusiveOverlap;

impl OverlapPolicy for InclusiveOverlap {
    fn reconcile(&self, cursor: Option<&Record>, mut fetched: Vec<Record>) -> Reconciled {
        let Some(cursor) = cursor else {
            return Reconciled { records: fetched, anomaly: None };
        };
        if fetched.is_empty() {
            return Reconciled { records: fetched, anomaly: None };
        }
        if &fetched[0] == cursor {
            fetched.remove(0);
            return Reconciled { records: fetched, anomaly: None };
        }
        let anomaly = ProtocolAnomaly {
            expected: cursor.clone(),
            found: fetched[0].clone(),
        };
        Reconciled { records: fetched, anomaly: Some(anomaly) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn record(version: &str, timestamp: OffsetDateTime) -> Record {
        Record::new("example.com/p1", version, timestamp)
    }

    fn abc() -> (Record, Record, Record) {
        (
            record("v1.0.0", datetime!(2020-01-01 0:00 UTC)),
            record("v1.1.0", datetime!(2020-01-02 0:00 UTC)),
            record("v1.2.0", datetime!(2020-01-03 0:00 UTC)),
        )
    }

    #[test]
    fn test_no_cursor_keeps_everything() {
        let (a, b, _) = abc();
        let result = InclusiveOverlap.reconcile(None, vec![a.clone(), b.clone()]);
        assert_eq!(result.records, vec![a, b]);
        assert!(result.anomaly.is_none());
    }

    #[test]
    fn test_no_cursor_empty_feed_is_caught_up() {
        let result = InclusiveOverlap.reconcile(None, vec![]);
        assert!(result.is_caught_up());
        assert!(result.anomaly.is_none());
    }

    #[test]
    fn test_expected_overlap_is_stripped() {
        let (a, b, c) = abc();
        let result = InclusiveOverlap.reconcile(Some(&a), vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(result.records, vec![b, c]);
        assert!(result.anomaly.is_none());
    }

    #[test]
    fn test_empty_batch_is_caught_up() {
        let (a, _, _) = abc();
        let result = InclusiveOverlap.reconcile(Some(&a), vec![]);
        assert!(result.is_caught_up());
        assert!(result.anomaly.is_none());
    }

    #[test]
    fn test_lone_echo_is_caught_up() {
        let (a, _, _) = abc();
        let result = InclusiveOverlap.reconcile(Some(&a), vec![a.clone()]);
        assert!(result.is_caught_up());
        assert!(result.anomaly.is_none());
    }

    #[test]
    fn test_mismatch_keeps_batch_and_flags_anomaly() {
        let (a, b, c) = abc();
        let result = InclusiveOverlap.reconcile(Some(&a), vec![b.clone(), c.clone()]);
        assert_eq!(result.records, vec![b.clone(), c]);
        assert_eq!(result.anomaly, Some(ProtocolAnomaly { expected: a, found: b }));
        assert!(!result.is_caught_up());
    }

    #[test]
    fn test_match_requires_timestamp() {
        // Same path and version, different timestamp: the feed re-emitted the
        // record, which is not the echo we asked for.
        let (a, b, _) = abc();
        let reemitted = record("v1.0.0", datetime!(2020-01-01 0:00:01 UTC));
        let result = InclusiveOverlap.reconcile(Some(&a), vec![reemitted.clone(), b]);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.anomaly.map(|a| a.found), Some(reemitted));
    }

    #[test]
    fn test_anomaly_display() {
        let (a, b, _) = abc();
        let anomaly = ProtocolAnomaly { expected: a, found: b };
        assert_eq!(
            anomaly.to_string(),
            "expected batch to start with example.com/p1@v1.0.0@2020-01-01T00:00:00.000000000Z \
             but got example.com/p1@v1.1.0@2020-01-02T00:00:00.000000000Z"
        );
    }
}
