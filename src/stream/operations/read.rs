use deadpool_postgres::Pool;
use tokio_postgres::types::Json;

use crate::stream::{
    error::{Error, Result},
    transaction::Transaction,
    types::{EntryId, FieldMap, StreamRecord},
};

use super::{id_from_row, id_to_sql, limit};

/// Deliver up to `count` never-delivered entries to `consumer`, without waiting
///
/// The group row is locked for the duration of the transaction, so concurrent readers
/// of the same group never receive the same entry.
pub async fn read_new(
    pool: &Pool,
    schema_name: &str,
    stream: &str,
    group: &str,
    consumer: &str,
    count: usize,
) -> Result<Vec<StreamRecord>> {
    let txn = Transaction::begin(pool.get().await?).await?;
    let result = deliver_in_transaction(&txn, schema_name, stream, group, consumer, count).await;
    txn.finish(result).await
}

async fn deliver_in_transaction(
    txn: &Transaction,
    schema_name: &str,
    stream: &str,
    group: &str,
    consumer: &str,
    count: usize,
) -> Result<Vec<StreamRecord>> {
    let conn = txn.connection()?;

    let cursor_sql = format!(
        "SELECT last_ms, last_seq FROM {}.groups
         WHERE stream_key = $1 AND group_name = $2
         FOR UPDATE",
        schema_name
    );
    let cursor = conn
        .query_opt(&cursor_sql, &[&stream, &group])
        .await?
        .ok_or_else(|| Error::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;
    let last_ms: i64 = cursor.try_get("last_ms")?;
    let last_seq: i64 = cursor.try_get("last_seq")?;

    let entries_sql = format!(
        "SELECT ms, seq, fields FROM {}.entries
         WHERE stream_key = $1 AND (ms, seq) > ($2, $3)
         ORDER BY ms, seq
         LIMIT $4",
        schema_name
    );
    let rows = conn
        .query(&entries_sql, &[&stream, &last_ms, &last_seq, &limit(count)])
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let Json(fields): Json<FieldMap> = row.try_get("fields")?;
        records.push(StreamRecord::new(id_from_row(row)?, fields));
    }

    let Some(last) = records.last().map(|r| r.id) else {
        return Ok(records);
    };

    let pending_sql = format!(
        "INSERT INTO {}.pending
             (stream_key, group_name, ms, seq, consumer, delivery_count, delivered_at)
         VALUES ($1, $2, $3, $4, $5, 1, clock_timestamp())
         ON CONFLICT (stream_key, group_name, ms, seq) DO NOTHING",
        schema_name
    );
    for record in &records {
        let (ms, seq) = id_to_sql(record.id)?;
        conn.execute(&pending_sql, &[&stream, &group, &ms, &seq, &consumer])
            .await?;
    }

    advance_cursor(conn, schema_name, stream, group, last).await?;
    Ok(records)
}

async fn advance_cursor(
    conn: &deadpool_postgres::Object,
    schema_name: &str,
    stream: &str,
    group: &str,
    last: EntryId,
) -> Result<()> {
    let (ms, seq) = id_to_sql(last)?;
    let sql = format!(
        "UPDATE {}.groups SET last_ms = $3, last_seq = $4
         WHERE stream_key = $1 AND group_name = $2",
        schema_name
    );
    conn.execute(&sql, &[&stream, &group, &ms, &seq]).await?;
    Ok(())
}
