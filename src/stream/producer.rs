//! Appending records to a stream

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::stream::{
    error::Result,
    log::StreamLog,
    types::{EntryId, FieldMap},
};

/// Writes records to a single stream
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use streamgroup::stream::{MemoryStreamLog, Producer};
///
/// #[derive(serde::Serialize)]
/// struct Event { id: String, event_type: String }
///
/// # async fn run() -> Result<(), streamgroup::stream::Error> {
/// let producer = Producer::new(Arc::new(MemoryStreamLog::new()), "stats:events");
/// let id = producer
///     .send_json("data", &Event { id: "1".into(), event_type: "click".into() })
///     .await?;
/// println!("appended {}", id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Producer {
    log: Arc<dyn StreamLog>,
    stream_key: String,
}

impl Producer {
    pub fn new(log: Arc<dyn StreamLog>, stream_key: impl Into<String>) -> Self {
        Self {
            log,
            stream_key: stream_key.into(),
        }
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Append a record made of raw field/value pairs
    pub async fn send_fields<I, K, V>(&self, fields: I) -> Result<EntryId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields: FieldMap = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let id = self.log.add(&self.stream_key, fields).await?;
        debug!(stream_key = %self.stream_key, message_id = %id, "record appended");
        Ok(id)
    }

    /// Append `value` serialized as JSON under a single `field`
    pub async fn send_json<T: Serialize + ?Sized>(&self, field: &str, value: &T) -> Result<EntryId> {
        let payload = serde_json::to_string(value)?;
        self.send_fields([(field, payload)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::memory::MemoryStreamLog;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_fields_appends_in_order() {
        let log = Arc::new(MemoryStreamLog::new());
        log.create_group("s", "g", EntryId::ZERO).await.unwrap();
        let producer = Producer::new(log.clone(), "s");

        let first = producer.send_fields([("a", "1")]).await.unwrap();
        let second = producer.send_fields([("a", "2")]).await.unwrap();
        assert!(second > first);
        assert_eq!(log.len("s"), 2);

        let records = log
            .read_group("s", "g", "c", 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("a"), Some("1"));
        assert_eq!(records[1].get("a"), Some("2"));
    }

    #[tokio::test]
    async fn test_send_json_stores_payload_under_field() {
        let log = Arc::new(MemoryStreamLog::new());
        log.create_group("s", "g", EntryId::ZERO).await.unwrap();
        let producer = Producer::new(log.clone(), "s");

        producer
            .send_json("data", &json!({"id": "e-1", "value": 3}))
            .await
            .unwrap();

        let records = log
            .read_group("s", "g", "c", 10, Duration::ZERO)
            .await
            .unwrap();
        let payload: serde_json::Value =
            serde_json::from_str(records[0].get("data").unwrap()).unwrap();
        assert_eq!(payload["id"], "e-1");
        assert_eq!(payload["value"], 3);
    }
}
