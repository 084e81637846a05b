use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::stream::error::{Error, ParseError};

/// Field → value map carried by every stream record
pub type FieldMap = BTreeMap<String, String>;

/// Broker-assigned identifier of a stream entry
///
/// Rendered as `<milliseconds>-<sequence>`. Ordering follows append order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId {
    /// Milliseconds since the Unix epoch at which the entry was appended
    pub ms: u64,

    /// Sequence number within the same millisecond
    pub seq: u64,
}

impl EntryId {
    /// The id before any entry; a group created at `ZERO` sees the whole stream
    pub const ZERO: EntryId = EntryId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Next id to assign after `self`, given the current wall clock in milliseconds
    pub fn next_after(&self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self::new(now_ms, 0)
        } else {
            Self::new(self.ms, self.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::ValidationError(format!("Invalid stream ID: '{}'", s));

        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };

        Ok(Self {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for EntryId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> Self {
        id.to_string()
    }
}

/// A record read from a stream
///
/// Records are owned by the log; consumers only decode them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Unique, sortable entry id
    pub id: EntryId,

    /// Opaque field map written by the producer
    pub fields: FieldMap,
}

impl StreamRecord {
    pub fn new(id: EntryId, fields: FieldMap) -> Self {
        Self { id, fields }
    }

    /// Get a field value if present
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Get a field value, failing with [`ParseError::MissingField`] when absent
    pub fn require(&self, field: &str) -> Result<&str, ParseError> {
        self.get(field)
            .ok_or_else(|| ParseError::MissingField(field.to_string()))
    }

    /// Parse a required field with [`FromStr`]
    ///
    /// # Example
    ///
    /// ```
    /// use streamgroup::stream::types::{EntryId, FieldMap, StreamRecord};
    ///
    /// let mut fields = FieldMap::new();
    /// fields.insert("status_code".to_string(), "200".to_string());
    /// let record = StreamRecord::new(EntryId::new(1, 0), fields);
    ///
    /// let status: i32 = record.parse_field("status_code").unwrap();
    /// assert_eq!(status, 200);
    /// ```
    pub fn parse_field<T>(&self, field: &str) -> Result<T, ParseError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.require(field)?
            .parse()
            .map_err(|e: T::Err| ParseError::InvalidField {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }

    /// Time the entry was appended, derived from the id
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.id.ms).ok()?)
    }
}
