//! Fetch worker pool: `fetchWorkerCount` concurrent loops taking source ids
//! off `FetchQ` and driving them through the type-specific fetcher.

use std::str::FromStr;
use std::sync::Arc;

use crate::context::Context;
use crate::fetch::fetchers::{FetchCaching, FetcherRegistry};
use crate::model::SourceType;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub fn spawn_pool(
    store: Store,
    queue: BoundedQueue,
    registry: Arc<FetcherRegistry>,
    worker_count: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|idx| {
            let store = store.clone();
            let queue = queue.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                tracing::info!(worker = idx, "fetch worker started");
                loop {
                    let Some(source_id) = queue.take().await else {
                        tracing::info!(worker = idx, "fetch worker exiting on shutdown");
                        return;
                    };
                    if let Err(e) = process_one(&store, &registry, &source_id).await {
                        tracing::error!(worker = idx, source_id = %source_id, error = %e, "fetch worker failed to process source");
                    }
                }
            })
        })
        .collect()
}

async fn process_one(store: &Store, registry: &FetcherRegistry, source_id: &str) -> anyhow::Result<()> {
    let Some(source) = store.get_source(source_id).await? else {
        tracing::warn!(source_id, "fetch worker: source vanished, dropping");
        return Ok(());
    };

    if source.fetch_status != "QUEUED" {
        tracing::warn!(source_id, status = %source.fetch_status, "fetch worker: source not QUEUED, dropping");
        return Ok(());
    }

    let cas_ok = store
        .cas_source_fetch_status(source_id, "QUEUED", "FETCHING", Some("fetch_started_at"))
        .await?;
    if !cas_ok {
        tracing::warn!(source_id, "fetch worker: CAS to FETCHING lost race, dropping");
        return Ok(());
    }

    let source_type = match SourceType::from_str(&source.source_type) {
        Ok(t) => t,
        Err(e) => {
            store.apply_fetch_failure(source_id, &e.to_string()).await?;
            return Ok(());
        }
    };

    let briefing = store.get_briefing(&source.briefing_id).await?;
    let user_id = briefing.map(|b| b.user_id).unwrap_or_default();
    let ctx = Context::new(user_id);

    let fetcher = registry.resolve(source_type);
    let caching = FetchCaching {
        etag: source.etag.clone(),
        last_modified: source.last_modified.clone(),
    };

    let first_import = source.last_fetched_at.is_none();

    match fetcher
        .fetch(
            &ctx,
            &source.url,
            source.extraction_prompt.as_deref(),
            source.last_fetched_at,
            &caching,
        )
        .await
    {
        Ok(outcome) => {
            let inserted = store
                .apply_fetch_success(
                    source_id,
                    &outcome.items,
                    first_import,
                    outcome.caching.etag.as_deref(),
                    outcome.caching.last_modified.as_deref(),
                )
                .await?;
            tracing::info!(source_id, inserted, first_import, "fetch worker: applied fetch success");
        }
        Err(e) => {
            tracing::warn!(source_id, error = %e, "fetch worker: fetcher failed");
            store.apply_fetch_failure(source_id, &e.to_string()).await?;
        }
    }

    Ok(())
}
