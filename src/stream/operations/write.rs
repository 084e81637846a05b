use deadpool_postgres::Pool;
use tokio_postgres::types::Json;

use crate::stream::{
    error::Result,
    transaction::Transaction,
    types::{EntryId, FieldMap},
};

use super::{id_from_row, id_to_sql};

/// Append a record to `stream`, returning its assigned id
///
/// Appends to the same stream are serialized with a transaction-scoped advisory lock,
/// so ids are strictly increasing and become visible in id order.
pub async fn add(pool: &Pool, schema_name: &str, stream: &str, fields: FieldMap) -> Result<EntryId> {
    let txn = Transaction::begin(pool.get().await?).await?;
    let result = add_in_transaction(&txn, schema_name, stream, fields).await;
    txn.finish(result).await
}

async fn add_in_transaction(
    txn: &Transaction,
    schema_name: &str,
    stream: &str,
    fields: FieldMap,
) -> Result<EntryId> {
    let conn = txn.connection()?;

    conn.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&stream])
        .await?;

    let last_sql = format!(
        "SELECT ms, seq FROM {}.entries
         WHERE stream_key = $1
         ORDER BY ms DESC, seq DESC
         LIMIT 1",
        schema_name
    );
    let last = match conn.query_opt(&last_sql, &[&stream]).await? {
        Some(row) => id_from_row(&row)?,
        None => EntryId::ZERO,
    };

    let now_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
    let id = last.next_after(now_ms);
    let (ms, seq) = id_to_sql(id)?;

    let insert_sql = format!(
        "INSERT INTO {}.entries (stream_key, ms, seq, fields) VALUES ($1, $2, $3, $4)",
        schema_name
    );
    conn.execute(&insert_sql, &[&stream, &ms, &seq, &Json(&fields)])
        .await?;

    Ok(id)
}
