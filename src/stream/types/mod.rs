pub mod pending;
pub mod record;

pub use pending::{PendingEntry, PendingSummary};
pub use record::{EntryId, FieldMap, StreamRecord};
