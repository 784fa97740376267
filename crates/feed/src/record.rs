use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::{datetime, format_description};
use time::{OffsetDateTime, UtcOffset};

/// Fixed-width RFC 3339 rendering (always nine fractional digits, always
/// UTC) so that lexicographic order of the text equals chronological order.
const FIXED_RFC3339: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");

/// The feed's "unset" timestamp. Polling with it starts from the very first
/// record the feed has.
pub const ZERO: OffsetDateTime = datetime!(0001-01-01 0:00 UTC);

/// Render a timestamp the way it is stored and sent to the feed.
pub fn format_timestamp(timestamp: &OffsetDateTime) -> Result<String> {
    timestamp.to_offset(UtcOffset::UTC).format(FIXED_RFC3339).or_raise(|| ErrorKind::Timestamp)
}

/// Parse any RFC 3339 timestamp, normalized to UTC.
pub fn parse_timestamp(value: impl AsRef<str>) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(value.as_ref(), &Rfc3339)
        .map(|t| t.to_offset(UtcOffset::UTC))
        .or_raise(|| ErrorKind::Timestamp)
}

/// One release event as published by the feed.
///
/// Field names on the wire are capitalized (`{"Path", "Version",
/// "Timestamp"}`), matching the index server's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub path: String,
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}
impl Record {
    pub fn new(path: impl Into<String>, version: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            timestamp: timestamp.to_offset(UtcOffset::UTC),
        }
    }

    /// `path@version@timestamp`, used when reporting overlap mismatches.
    pub fn debug_string(&self) -> String {
        let timestamp = format_timestamp(&self.timestamp).unwrap_or_else(|_| self.timestamp.to_string());
        format!("{}@{}@{}", self.path, self.version, timestamp)
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.timestamp = self.timestamp.to_offset(UtcOffset::UTC);
        self
    }
}
impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}@{}", self.path, self.version)
    }
}
