use deadpool_postgres::Pool;
use std::time::Duration;

use crate::stream::{
    error::Result,
    types::{PendingEntry, PendingSummary},
};

use super::{group::require_group, id_from_row, limit};

/// Pending counts of a group, per owner, with the lowest and highest pending ids
pub async fn pending_summary(
    pool: &Pool,
    schema_name: &str,
    stream: &str,
    group: &str,
) -> Result<PendingSummary> {
    let conn = pool.get().await?;
    require_group(&conn, schema_name, stream, group).await?;

    let owners_sql = format!(
        "SELECT consumer, COUNT(*) AS pending FROM {}.pending
         WHERE stream_key = $1 AND group_name = $2
         GROUP BY consumer",
        schema_name
    );
    let mut summary = PendingSummary::default();
    for row in conn.query(&owners_sql, &[&stream, &group]).await? {
        let consumer: String = row.try_get("consumer")?;
        let pending: i64 = row.try_get("pending")?;
        let pending = u64::try_from(pending).unwrap_or(0);
        summary.count += pending;
        summary.consumers.insert(consumer, pending);
    }

    if summary.count == 0 {
        return Ok(summary);
    }

    let bounds_sql = |order: &str| {
        format!(
            "SELECT ms, seq FROM {}.pending
             WHERE stream_key = $1 AND group_name = $2
             ORDER BY ms {order}, seq {order}
             LIMIT 1",
            schema_name,
            order = order
        )
    };
    if let Some(row) = conn.query_opt(&bounds_sql("ASC"), &[&stream, &group]).await? {
        summary.lowest = Some(id_from_row(&row)?);
    }
    if let Some(row) = conn.query_opt(&bounds_sql("DESC"), &[&stream, &group]).await? {
        summary.highest = Some(id_from_row(&row)?);
    }

    Ok(summary)
}

/// Up to `count` pending entries owned by `consumer`, in id order
///
/// Idle time is measured by the database clock.
pub async fn pending_entries(
    pool: &Pool,
    schema_name: &str,
    stream: &str,
    group: &str,
    consumer: &str,
    count: usize,
) -> Result<Vec<PendingEntry>> {
    let conn = pool.get().await?;
    require_group(&conn, schema_name, stream, group).await?;

    let sql = format!(
        "SELECT ms, seq, consumer, delivery_count,
                GREATEST(0, (EXTRACT(EPOCH FROM (clock_timestamp() - delivered_at)) * 1000))::BIGINT
                    AS idle_ms
         FROM {}.pending
         WHERE stream_key = $1 AND group_name = $2 AND consumer = $3
         ORDER BY ms, seq
         LIMIT $4",
        schema_name
    );

    let rows = conn
        .query(&sql, &[&stream, &group, &consumer, &limit(count)])
        .await?;

    rows.iter()
        .map(|row| -> Result<PendingEntry> {
            let delivery_count: i64 = row.try_get("delivery_count")?;
            let idle_ms: i64 = row.try_get("idle_ms")?;
            Ok(PendingEntry {
                id: id_from_row(row)?,
                consumer: row.try_get("consumer")?,
                idle: Duration::from_millis(u64::try_from(idle_ms).unwrap_or(0)),
                delivery_count: u64::try_from(delivery_count).unwrap_or(0),
            })
        })
        .collect()
}
