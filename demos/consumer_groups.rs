/// Example: Consumer Groups with Pending Reclaim
///
/// Two workers share one consumer group on an in-process stream log. A third,
/// "crashed" member reads a batch and never acknowledges it; once those entries
/// have been idle longer than `min_idle`, the live workers reclaim and process them.
///
/// Settings can be overridden through `DEMO_*` environment variables (or a `.env`
/// file), e.g. `DEMO_BATCH_SIZE=5` or `DEMO_MIN_IDLE=3s`.
///
/// To run this example:
/// cargo run --example consumer_groups

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use streamgroup::stream::consumer::{Consumer, ConsumerConfig, ConsumerIdentity, JsonFieldParser};
use streamgroup::stream::{EntryId, MemoryStreamLog, Producer, StreamLog};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct PageView {
    id: String,
    page: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("=== Consumer Groups Example ===\n");

    let defaults = ConsumerConfig::new("stats:events", "stats-service", "stats-consumer")
        .with_batch_size(4)
        .with_block_time(Duration::from_millis(500))
        .with_min_idle(Duration::from_secs(2));
    let config = ConsumerConfig::from_env("DEMO", defaults)?;

    let log = Arc::new(MemoryStreamLog::new());
    let producer = Producer::new(log.clone(), config.stream_key.clone());

    // 1. A member that crashes right after reading
    println!("1. Crashed member takes a batch");
    println!("-------------------------------");

    log.create_group(&config.stream_key, &config.consumer_group, EntryId::ZERO)
        .await?;
    for i in 0..3 {
        producer
            .send_json("data", &serde_json::json!({ "id": format!("early-{}", i), "page": "/home" }))
            .await?;
    }
    let crashed = ConsumerIdentity::from_parts(&config.consumer_id_prefix, "crashed", 0);
    let orphaned = log
        .read_group(&config.stream_key, &config.consumer_group, crashed.as_str(), 10, Duration::ZERO)
        .await?;
    println!("  {} took {} entries and went away\n", crashed, orphaned.len());

    // 2. Live workers
    println!("2. Starting workers");
    println!("-------------------");

    let cancel = CancellationToken::new();
    let mut workers = Vec::new();
    for host in ["worker-a", "worker-b"] {
        let identity = ConsumerIdentity::from_parts(&config.consumer_id_prefix, host, std::process::id());
        let (mut consumer, mut events) = Consumer::with_identity(
            log.clone(),
            config.clone(),
            JsonFieldParser::<PageView>::default(),
            identity,
        )?;
        consumer.start(cancel.clone()).await?;

        let name = host.to_string();
        tokio::spawn(async move {
            while let Some(view) = events.recv().await {
                println!("  [{}] {} {}", name, view.id, view.page);
            }
        });

        workers.push(consumer);
    }

    for i in 0..8 {
        producer
            .send_json("data", &serde_json::json!({ "id": format!("view-{}", i), "page": "/pricing" }))
            .await?;
    }

    // 3. Wait for the orphaned entries to go idle and be reclaimed
    tokio::time::sleep(config.min_idle + Duration::from_secs(1)).await;

    let summary = log
        .pending_summary(&config.stream_key, &config.consumer_group)
        .await?;
    println!("\n3. Pending after reclaim: {}", summary.count);

    cancel.cancel();
    for mut worker in workers {
        let exit = worker.wait().await?;
        println!("  {} exited: {:?}", worker.identity(), exit);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
