use deadpool_postgres::Pool;

use crate::stream::{error::Result, types::EntryId};

use super::{group::require_group, id_to_sql};

/// Remove entries from the group's pending list, returning how many were pending
pub async fn ack(pool: &Pool, schema_name: &str, stream: &str, group: &str, ids: &[EntryId]) -> Result<u64> {
    let conn = pool.get().await?;
    require_group(&conn, schema_name, stream, group).await?;

    let sql = format!(
        "DELETE FROM {}.pending
         WHERE stream_key = $1 AND group_name = $2 AND ms = $3 AND seq = $4",
        schema_name
    );

    let mut acked = 0;
    for id in ids {
        let (ms, seq) = id_to_sql(*id)?;
        acked += conn.execute(&sql, &[&stream, &group, &ms, &seq]).await?;
    }
    Ok(acked)
}
