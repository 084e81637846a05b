/// Consumer-group consumption with at-least-once delivery
///
/// This module provides:
/// - `Consumer`: Handle that starts, stops and observes the consume loop
/// - `ConsumerConfig`: Stream, group and timing settings
/// - `Parser` / `JsonFieldParser`: Decoding stream records into events
/// - `ClaimDecision`: The rule for taking over pending entries
///
/// # Consume Loop
///
/// Every pass of the loop does the following:
///
/// 1. **Reclaim**: Scan pending entries of every owner in the group and claim the
///    eligible ones (own entries always, peers' once stale or over-delivered)
/// 2. **Read**: Block for up to `block_time` waiting for new entries
/// 3. **Deliver**: Decode each record, send it downstream, then acknowledge it
///
/// A failed pass is retried after `retry_count * retry_delay`. After `max_retries`
/// consecutive failures the loop stops with [`Error::RetriesExhausted`](crate::stream::Error::RetriesExhausted).
/// Records that fail to decode are never acknowledged and stay pending.
mod config;
#[allow(clippy::module_inception)]
mod consumer;
mod identity;
mod parser;
mod reclaim;
mod retry;
mod supervisor;
mod worker;

pub use config::ConsumerConfig;
pub use consumer::Consumer;
pub use identity::ConsumerIdentity;
pub use parser::{JsonFieldParser, Parser};
pub use reclaim::ClaimDecision;
pub use retry::RetryState;
pub use supervisor::{ConsumerExit, ConsumerState};
pub use worker::PassReport;
