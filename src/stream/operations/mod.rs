//! SQL operations behind [`PgStreamLog`](crate::stream::client::PgStreamLog)
//!
//! Entry ids are stored as two `BIGINT` columns (`ms`, `seq`) and compared as row
//! values, so `(ms, seq) > ($1, $2)` follows stream order.

pub mod ack;
pub mod claim;
pub mod group;
pub mod pending;
pub mod read;
pub mod schema;
pub mod write;

pub use ack::ack;
pub use claim::claim;
pub use group::create_group;
pub use pending::{pending_entries, pending_summary};
pub use read::read_new;
pub use schema::ensure_schema;
pub use write::add;

use tokio_postgres::Row;

use crate::stream::{
    error::{Error, Result},
    types::EntryId,
};

/// Split an id into the two signed columns it is stored in
pub(crate) fn id_to_sql(id: EntryId) -> Result<(i64, i64)> {
    let ms = i64::try_from(id.ms)
        .map_err(|_| Error::ValidationError(format!("entry id {} out of range", id)))?;
    let seq = i64::try_from(id.seq)
        .map_err(|_| Error::ValidationError(format!("entry id {} out of range", id)))?;
    Ok((ms, seq))
}

/// Read an id from the `ms` and `seq` columns of a row
pub(crate) fn id_from_row(row: &Row) -> Result<EntryId> {
    let ms: i64 = row.try_get("ms")?;
    let seq: i64 = row.try_get("seq")?;
    let ms = u64::try_from(ms)
        .map_err(|_| Error::DatabaseError(format!("negative entry id column: {}", ms)))?;
    let seq = u64::try_from(seq)
        .map_err(|_| Error::DatabaseError(format!("negative entry id column: {}", seq)))?;
    Ok(EntryId::new(ms, seq))
}

pub(crate) fn limit(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
