//! Fetch scheduler: finds eligible sources, CASes them to QUEUED, and offers
//! their ids to `FetchQ`. Never holds the queue while doing I/O.

use std::sync::Arc;
use std::time::Duration;

use common::FetchConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub async fn run(store: Store, credit: CreditGate, queue: BoundedQueue, config: FetchConfig, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.scheduler_interval_ms));
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("fetch scheduler: shutdown received, stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_once(&store, &credit, &queue, &config).await {
                    tracing::error!(error = %e, "fetch scheduler cycle failed");
                }
            }
        }
    }
}

async fn run_once(store: &Store, credit: &CreditGate, queue: &BoundedQueue, config: &FetchConfig) -> anyhow::Result<()> {
    let free = queue.free_capacity();
    if free == 0 {
        tracing::debug!("fetch scheduler: queue at capacity, skipping cycle");
        return Ok(());
    }

    let candidate_users = credit.users_with_balance().await?;
    if candidate_users.is_empty() {
        return Ok(());
    }
    let user_ids: Vec<String> = candidate_users.into_iter().collect();

    let limit = config.batch_size.min(free) as i64;
    let sources = store.list_sources_eligible_for_fetch(&user_ids, limit).await?;

    for source in sources {
        let cas_ok = store
            .cas_source_fetch_status(&source.id, "IDLE", "QUEUED", Some("queued_at"))
            .await?;
        if !cas_ok {
            continue;
        }

        if !queue.offer(source.id.clone()) {
            tracing::warn!(source_id = %source.id, "fetch queue rejected offer after CAS, reverting and stopping cycle");
            store.revert_source_fetch_status(&source.id, "IDLE").await?;
            break;
        }
    }

    Ok(())
}
