use deadpool_postgres::Pool;
use tracing::info;

use crate::stream::error::Result;

/// Create the schema and tables if they do not exist yet
///
/// Safe to run on every start-up.
pub async fn ensure_schema(pool: &Pool, schema_name: &str) -> Result<()> {
    let conn = pool.get().await?;

    let sql = format!(
        r#"
        CREATE SCHEMA IF NOT EXISTS {s};

        CREATE TABLE IF NOT EXISTS {s}.entries (
            stream_key TEXT NOT NULL,
            ms BIGINT NOT NULL,
            seq BIGINT NOT NULL,
            fields JSONB NOT NULL,
            PRIMARY KEY (stream_key, ms, seq)
        );

        CREATE TABLE IF NOT EXISTS {s}.groups (
            stream_key TEXT NOT NULL,
            group_name TEXT NOT NULL,
            last_ms BIGINT NOT NULL,
            last_seq BIGINT NOT NULL,
            PRIMARY KEY (stream_key, group_name)
        );

        CREATE TABLE IF NOT EXISTS {s}.pending (
            stream_key TEXT NOT NULL,
            group_name TEXT NOT NULL,
            ms BIGINT NOT NULL,
            seq BIGINT NOT NULL,
            consumer TEXT NOT NULL,
            delivery_count BIGINT NOT NULL,
            delivered_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (stream_key, group_name, ms, seq)
        );

        CREATE INDEX IF NOT EXISTS pending_owner_idx
            ON {s}.pending (stream_key, group_name, consumer, ms, seq);
        "#,
        s = schema_name
    );

    conn.batch_execute(&sql).await?;
    info!(schema = %schema_name, "stream log schema ready");
    Ok(())
}
