//! Slot verification daemon.
//!
//! Usage: `slotwatchd [config.json]` (defaults to `$SLOTWATCH_CONFIG`, then
//! `slotwatch.json`). Camera credentials may come from `.env`.

use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;

use slotwatch::builders::build_orchestrator;
use slotwatch::config::{SimulationConfig, VerifierConfig};
use slotwatch::core::{AppResult, OccupancyMap};
use slotwatch::runtime::{cancel_on_signal, health, snapshot};
use slotwatch::util::init_tracing;

fn main() -> AppResult<()> {
    // A missing .env is fine; credentials may already be in the environment.
    let _ = dotenvy::dotenv();
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SLOTWATCH_CONFIG").ok())
        .unwrap_or_else(|| "slotwatch.json".into());
    let cfg = VerifierConfig::from_file(&path)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("loading configuration from {path}"))?;

    let workers = num_cpus::get().max(2);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    tracing::info!(
        config = %path,
        workers,
        slots = cfg.slots.len(),
        mode = ?cfg.detection.mode,
        "slotwatchd starting"
    );

    runtime.block_on(serve(cfg))
}

async fn serve(cfg: VerifierConfig) -> AppResult<()> {
    let occupancy = OccupancyMap::new();
    let mut orchestrator = build_orchestrator(&cfg, occupancy.clone())?;

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());
    let simulation = cfg
        .simulation
        .clone()
        .filter(|s| !s.steps.is_empty())
        .map(|script| tokio::spawn(simulate(script, occupancy, shutdown.clone())));

    let result = orchestrator.run(shutdown.clone()).await;
    shutdown.cancel();

    let status = snapshot(&orchestrator);
    let health = health(&status);
    match serde_json::to_string(&status) {
        Ok(json) => tracing::info!(healthy = health.ok, status = %json, "final status"),
        Err(e) => tracing::warn!(error = %e, "status serialization failed"),
    }

    if let Some(handle) = simulation {
        let _ = handle.await;
    }
    let _ = signals.await;

    result.context("orchestrator failed")?;
    tracing::info!("slotwatchd stopped");
    Ok(())
}

/// Replay scripted occupancy changes until `shutdown` fires.
async fn simulate(script: SimulationConfig, occupancy: OccupancyMap, shutdown: CancellationToken) {
    tracing::info!(
        steps = script.steps.len(),
        repeat = script.repeat,
        "occupancy simulation enabled"
    );
    loop {
        for step in &script.steps {
            tokio::select! {
                () = shutdown.cancelled() => return,
                () = tokio::time::sleep(Duration::from_millis(step.after_ms)) => {}
            }
            tracing::info!(
                slot_id = step.slot,
                occupied = step.occupied,
                "simulated occupancy change"
            );
            occupancy.set(step.slot, step.occupied);
        }
        if !script.repeat {
            return;
        }
    }
}
