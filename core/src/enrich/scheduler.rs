//! Enrich scheduler: finds NEW items owned by credit-eligible users, CASes
//! them to PENDING, and offers their ids to `EnrichQ`.

use std::sync::Arc;
use std::time::Duration;

use common::EnrichConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub async fn run(store: Store, credit: CreditGate, queue: BoundedQueue, config: EnrichConfig, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.scheduler_interval_ms));
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("enrich scheduler: shutdown received, stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_once(&store, &credit, &queue, &config).await {
                    tracing::error!(error = %e, "enrich scheduler cycle failed");
                }
            }
        }
    }
}

async fn run_once(store: &Store, credit: &CreditGate, queue: &BoundedQueue, config: &EnrichConfig) -> anyhow::Result<()> {
    let free = queue.free_capacity();
    if free == 0 {
        tracing::debug!("enrich scheduler: queue at capacity, skipping cycle");
        return Ok(());
    }

    let candidate_users = credit.users_with_balance().await?;
    if candidate_users.is_empty() {
        return Ok(());
    }

    let candidates = store
        .list_items_for_enrich((config.batch_size * 2) as i64)
        .await?;

    let take = config.batch_size.min(free);
    let eligible = candidates
        .into_iter()
        .filter(|(_, user_id)| candidate_users.contains(user_id))
        .take(take);

    for (item, _user_id) in eligible {
        let cas_ok = store.cas_item_status(&item.id, "NEW", "PENDING").await?;
        if !cas_ok {
            continue;
        }
        if !queue.offer(item.id.clone()) {
            tracing::warn!(item_id = %item.id, "enrich queue rejected offer after CAS, reverting and stopping cycle");
            store.cas_item_status(&item.id, "PENDING", "NEW").await?;
            break;
        }
    }

    Ok(())
}
