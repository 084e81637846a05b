use deadpool_postgres::Pool;
use std::time::Duration;
use tokio_postgres::types::Json;

use crate::stream::{
    error::Result,
    transaction::Transaction,
    types::{EntryId, FieldMap, StreamRecord},
};

use super::{group::require_group, id_from_row, id_to_sql};

/// Reassign pending entries idle for at least `min_idle` to `consumer`
///
/// Each reassignment is a conditional `UPDATE`, so when two consumers race for the
/// same entry only the first one sees it idle and wins. Ids that are not pending,
/// not idle long enough, or whose entry no longer exists are left out of the result.
pub async fn claim(
    pool: &Pool,
    schema_name: &str,
    stream: &str,
    group: &str,
    consumer: &str,
    min_idle: Duration,
    ids: &[EntryId],
) -> Result<Vec<StreamRecord>> {
    let txn = Transaction::begin(pool.get().await?).await?;
    let result = claim_in_transaction(&txn, schema_name, stream, group, consumer, min_idle, ids).await;
    txn.finish(result).await
}

async fn claim_in_transaction(
    txn: &Transaction,
    schema_name: &str,
    stream: &str,
    group: &str,
    consumer: &str,
    min_idle: Duration,
    ids: &[EntryId],
) -> Result<Vec<StreamRecord>> {
    let conn = txn.connection()?;
    require_group(conn, schema_name, stream, group).await?;

    let sql = format!(
        "UPDATE {s}.pending AS p
         SET consumer = $5,
             delivery_count = p.delivery_count + 1,
             delivered_at = clock_timestamp()
         FROM {s}.entries AS e
         WHERE p.stream_key = $1 AND p.group_name = $2 AND p.ms = $3 AND p.seq = $4
           AND e.stream_key = p.stream_key AND e.ms = p.ms AND e.seq = p.seq
           AND p.delivered_at <= clock_timestamp() - make_interval(secs => $6)
         RETURNING p.ms, p.seq, e.fields",
        s = schema_name
    );
    let min_idle_secs = min_idle.as_secs_f64();

    let mut claimed = Vec::new();
    for id in ids {
        let (ms, seq) = id_to_sql(*id)?;
        let row = conn
            .query_opt(&sql, &[&stream, &group, &ms, &seq, &consumer, &min_idle_secs])
            .await?;

        if let Some(row) = row {
            let Json(fields): Json<FieldMap> = row.try_get("fields")?;
            claimed.push(StreamRecord::new(id_from_row(&row)?, fields));
        }
    }

    Ok(claimed)
}
