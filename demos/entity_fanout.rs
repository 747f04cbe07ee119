//! Entity fan-out example
//!
//! Simulates subscribing to state changes for a set of entities: one remote
//! call per entity, a few in flight at a time, and a per-entity report.

use batch_engine::batch::{execute_batch, run_cancellable, BatchConfig};
use batch_engine::utils::logging::init_tracing;
use batch_engine::EngineError;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Stand-in for a websocket round trip
async fn fetch_state(entity_id: &str) -> Result<String, EngineError> {
    let latency = 20 + (entity_id.len() as u64 * 7) % 80;
    tokio::time::sleep(Duration::from_millis(latency)).await;

    if entity_id.ends_with("_offline") {
        return Err(EngineError::processing("entity unavailable"));
    }
    Ok(format!("{} = on", entity_id))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("batch_engine=info");

    let config = BatchConfig::from_env()?.with_max_concurrency(3);
    let entities: Vec<String> = [
        "light.kitchen",
        "light.living_room",
        "sensor.temperature",
        "sensor.garage_offline",
        "switch.porch",
        "binary_sensor.front_door",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let total = entities.len();

    let parent = CancellationToken::new();
    let ctrl_c = parent.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let start = Instant::now();
    let results = execute_batch(
        &parent,
        entities,
        Some(|entity: &String| entity.clone()),
        |token, _index, entity: String| async move {
            run_cancellable(&token, fetch_state(&entity)).await
        },
        config,
    )
    .await;

    for result in results.sorted_by_index() {
        match result.outcome() {
            Ok(Some(state)) => println!("  ok    {}", state),
            Ok(None) => println!("  ok    {}", result.item_label),
            Err(err) => println!("  fail  {}: {}", result.item_label, err),
        }
    }

    let summary = results.summary(total, start.elapsed());
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.succeeded == 0 {
        anyhow::bail!(results.errors().to_string());
    }
    Ok(())
}
