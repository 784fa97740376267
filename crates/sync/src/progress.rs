//! Throughput and time-to-completion estimates.
//!
//! Everything here is a pure calculation over counters the driver keeps.
//! "Covered" is how much feed time the run has imported so far, "open" is how
//! much feed time lies between the cursor and now.

use modindex_feed::Record;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Estimated wall-clock time left: `open * elapsed / covered`.
///
/// `None` until some feed time has been covered.
pub fn estimate(elapsed: Duration, covered: Duration, open: Duration) -> Option<Duration> {
    if !covered.is_positive() {
        return None;
    }
    let open = open.max(Duration::ZERO).whole_nanoseconds();
    let elapsed = elapsed.max(Duration::ZERO).whole_nanoseconds();
    let nanos = open.saturating_mul(elapsed) / covered.whole_nanoseconds();
    let seconds = i64::try_from(nanos / 1_000_000_000).unwrap_or(i64::MAX);
    if seconds == i64::MAX {
        return Some(Duration::MAX);
    }
    // Infallible: the remainder of a division by 1e9 fits in an i32.
    let subsec = i32::try_from(nanos % 1_000_000_000).unwrap_or(0);
    Some(Duration::new(seconds, subsec))
}

/// Feed time imported by committing `batch` on top of `cursor`.
///
/// Without a cursor (the very first batch into an empty store) only the span
/// of the batch itself counts; the feed's history before its first record is
/// not something the run caught up on.
pub fn covered_by(cursor: Option<&Record>, batch: &[Record]) -> Duration {
    let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
        return Duration::ZERO;
    };
    match cursor {
        Some(cursor) => last.timestamp - cursor.timestamp,
        None => last.timestamp - first.timestamp,
    }
}

/// Status report emitted at the top of every iteration once a cursor exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Where the feed ends (now).
    pub target: OffsetDateTime,
    /// Where the mirror is (the cursor timestamp).
    pub current: OffsetDateTime,
    pub covered: Duration,
    pub open: Duration,
    pub remaining: Option<Duration>,
}
impl Progress {
    pub fn new(elapsed: Duration, target: OffsetDateTime, current: OffsetDateTime, covered: Duration) -> Self {
        let open = (target - current).max(Duration::ZERO);
        Self {
            elapsed,
            target,
            current,
            covered,
            open,
            remaining: estimate(elapsed, covered, open),
        }
    }

    /// Estimated time of completion.
    pub fn eta(&self) -> Option<OffsetDateTime> {
        self.remaining.and_then(|remaining| self.target.checked_add(remaining))
    }

    /// Feed hours imported per wall-clock minute.
    pub fn speed(&self) -> Option<f64> {
        let minutes = self.elapsed.as_seconds_f64() / 60.0;
        if minutes <= 0.0 || !self.covered.is_positive() {
            return None;
        }
        Some(self.covered.as_seconds_f64() / 3600.0 / minutes)
    }
}

/// Round to whole seconds and render as `HhMMmSSs`.
fn hms(duration: Duration) -> String {
    let seconds = (duration + Duration::milliseconds(500)).whole_seconds().max(0);
    format!("{}h{:02}m{:02}s", seconds / 3600, (seconds % 3600) / 60, seconds % 60)
}

impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let target = self.target.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
        let current = self.current.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
        writeln!(f, "{:<10} {}", "Duration", hms(self.elapsed))?;
        writeln!(f, "{:<10} {}", "Target", target)?;
        writeln!(f, "{:<10} {}", "Current", current)?;
        writeln!(f, "{:<10} {}", "Covered", self.covered.whole_hours())?;
        writeln!(f, "{:<10} {}", "Open", self.open.whole_hours())?;
        if let (Some(remaining), Some(eta)) = (self.remaining, self.eta()) {
            let eta = eta.format(&Rfc3339).map_err(|_| std::fmt::Error)?;
            writeln!(f, "{:<10} {}", "Remaining", hms(remaining))?;
            writeln!(f, "{:<10} {}", "ETA", eta)?;
        }
        if let Some(speed) = self.speed() {
            writeln!(f, "{:<10} {:.2} hours/minute", "Speed", speed)?;
        }
        Ok(())
    }
}
