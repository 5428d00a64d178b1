//! Stuck-item recovery sweep. Runs on its own cadence, independent of the
//! three schedulers, and is the correctness mechanism against crash-loss:
//! queues are process-local and recovery is what heals state left behind by
//! a worker that died mid-transition.

use std::sync::Arc;
use std::time::Duration;

use common::RecoveryConfig;
use tokio::sync::Notify;

use crate::store::Store;

pub async fn run(
    store: Store,
    recovery: RecoveryConfig,
    fetch_stuck_threshold_min: i64,
    enrich_stuck_threshold_min: i64,
    brief_stuck_threshold_min: i64,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(recovery.interval_ms));
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("recovery sweep: shutdown received, stopping");
                return;
            }
            _ = ticker.tick() => {
                run_once(
                    &store,
                    fetch_stuck_threshold_min,
                    enrich_stuck_threshold_min,
                    brief_stuck_threshold_min,
                )
                .await;
            }
        }
    }
}

async fn run_once(
    store: &Store,
    fetch_stuck_threshold_min: i64,
    enrich_stuck_threshold_min: i64,
    brief_stuck_threshold_min: i64,
) {
    match store.mark_stuck_sources(fetch_stuck_threshold_min).await {
        Ok(n) if n > 0 => tracing::info!(count = n, "recovery: reset stuck sources to IDLE"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "recovery: failed to sweep stuck sources"),
    }

    // Items are dead-lettered to ERROR rather than returned to NEW: the
    // source this core generalizes preserves that asymmetry deliberately
    // (it bounds provider spend on items that may be poisoning a worker).
    match store.mark_stuck_items(enrich_stuck_threshold_min).await {
        Ok(n) if n > 0 => tracing::info!(count = n, "recovery: dead-lettered stuck items to ERROR"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "recovery: failed to sweep stuck items"),
    }

    match store.mark_stuck_briefings(brief_stuck_threshold_min).await {
        Ok(n) if n > 0 => tracing::info!(count = n, "recovery: reset stuck briefings to ACTIVE"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "recovery: failed to sweep stuck briefings"),
    }
}
