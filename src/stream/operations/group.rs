use deadpool_postgres::Pool;

use crate::stream::{
    error::{Error, Result},
    types::EntryId,
};

use super::id_to_sql;

/// Create a consumer group positioned after `start`
///
/// Fails with [`Error::GroupExists`] when the group is already registered.
pub async fn create_group(
    pool: &Pool,
    schema_name: &str,
    stream: &str,
    group: &str,
    start: EntryId,
) -> Result<()> {
    let conn = pool.get().await?;
    let (last_ms, last_seq) = id_to_sql(start)?;

    let sql = format!(
        "INSERT INTO {}.groups (stream_key, group_name, last_ms, last_seq)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (stream_key, group_name) DO NOTHING",
        schema_name
    );

    let inserted = conn
        .execute(&sql, &[&stream, &group, &last_ms, &last_seq])
        .await?;

    if inserted == 0 {
        return Err(Error::GroupExists {
            stream: stream.to_string(),
            group: group.to_string(),
        });
    }
    Ok(())
}

/// Fail with [`Error::NoGroup`] unless the group exists
pub(crate) async fn require_group(
    conn: &deadpool_postgres::Object,
    schema_name: &str,
    stream: &str,
    group: &str,
) -> Result<()> {
    let sql = format!(
        "SELECT 1 FROM {}.groups WHERE stream_key = $1 AND group_name = $2",
        schema_name
    );

    match conn.query_opt(&sql, &[&stream, &group]).await? {
        Some(_) => Ok(()),
        None => Err(Error::NoGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        }),
    }
}
