use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use modindex_feed::{Record, format_timestamp, parse_timestamp};

/// A version joined to its path, as selected by the read queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub(crate) path: String,
    pub(crate) version: String,
    pub(crate) timestamp: String,
}
impl TryFrom<&Record> for RecordRow {
    type Error = Error;
    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        Ok(Self {
            path: record.path.clone(),
            version: record.version.clone(),
            timestamp: format_timestamp(&record.timestamp).or_raise(|| ErrorKind::InvalidData("timestamp"))?,
        })
    }
}
impl TryFrom<RecordRow> for Record {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&row.timestamp).or_raise(|| ErrorKind::InvalidData("timestamp"))?;
        Ok(Record::new(row.path, row.version, timestamp))
    }
}
