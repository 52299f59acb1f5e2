//! In-process timer for the batch job, for deployments without an external
//! scheduler hitting `/api/cron/process-streams`.

use std::sync::Arc;

use jurnl_core::config::JurnlConfig;
use jurnl_core::llm::LlmBackend;
use jurnl_core::store::Store;
use tokio::sync::{broadcast, Mutex};

use super::batch;

/// Exits immediately if `batch.schedule_enabled` is `false`. A tick that
/// finds `lock` held by a cron-triggered pass is skipped.
pub async fn run_batch_loop(
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmBackend>,
    config: JurnlConfig,
    lock: Arc<Mutex<()>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if !config.batch.schedule_enabled {
        tracing::info!("In-process batch scheduler disabled via config");
        return;
    }

    let interval = tokio::time::Duration::from_secs(config.batch.interval_minutes.max(1) * 60);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(
        interval_min = config.batch.interval_minutes,
        "Batch scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Ok(_pass) = lock.try_lock() else {
                    tracing::info!("Batch pass already running; skipping tick");
                    continue;
                };
                match batch::run_batch(store.as_ref(), llm.as_ref(), &config).await {
                    Ok(report) => tracing::info!(
                        processed = report.processed,
                        errors = report.failures.len(),
                        "Scheduled batch pass complete"
                    ),
                    Err(e) => tracing::error!(error = %e, "Scheduled batch pass failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Batch scheduler shutting down");
                break;
            }
        }
    }
}
