use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

use crate::stream::{error::ParseError, types::StreamRecord};

/// Decodes a [`StreamRecord`] into a domain event
///
/// Implemented for any `Fn(&StreamRecord) -> Result<T, ParseError>`, so a plain
/// function or closure can be handed to a consumer.
///
/// # Example
///
/// ```
/// use streamgroup::stream::consumer::Parser;
/// use streamgroup::stream::types::{EntryId, FieldMap, StreamRecord};
/// use streamgroup::stream::ParseError;
///
/// fn parse_user(record: &StreamRecord) -> Result<String, ParseError> {
///     Ok(record.require("user_id")?.to_string())
/// }
///
/// let mut fields = FieldMap::new();
/// fields.insert("user_id".to_string(), "u-1".to_string());
/// let record = StreamRecord::new(EntryId::new(1, 0), fields);
///
/// assert_eq!(parse_user.parse(&record).unwrap(), "u-1");
/// ```
pub trait Parser<T>: Send + Sync + 'static {
    fn parse(&self, record: &StreamRecord) -> Result<T, ParseError>;
}

impl<T, F> Parser<T> for F
where
    F: Fn(&StreamRecord) -> Result<T, ParseError> + Send + Sync + 'static,
{
    fn parse(&self, record: &StreamRecord) -> Result<T, ParseError> {
        self(record)
    }
}

/// Parser that decodes one JSON-encoded field into `T`
///
/// Pairs with [`Producer::send_json`](crate::stream::producer::Producer::send_json).
pub struct JsonFieldParser<T> {
    field: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFieldParser<T> {
    /// Decode the JSON payload stored under `field`
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            _marker: PhantomData,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl<T> Default for JsonFieldParser<T> {
    /// Decodes the `data` field
    fn default() -> Self {
        Self::new("data")
    }
}

impl<T> fmt::Debug for JsonFieldParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFieldParser")
            .field("field", &self.field)
            .finish()
    }
}

impl<T> Parser<T> for JsonFieldParser<T>
where
    T: DeserializeOwned + 'static,
{
    fn parse(&self, record: &StreamRecord) -> Result<T, ParseError> {
        let payload = record.require(&self.field)?;
        Ok(serde_json::from_str(payload)?)
    }
}
