//! Enrich worker pool: fetches an optional web body, invokes the enricher,
//! and commits summary/tags/score plus the credit withdrawal atomically.

use std::sync::Arc;

use serde_json::json;

use crate::context::Context;
use crate::credit::CreditGate;
use crate::enricher::Enricher;
use crate::queue::BoundedQueue;
use crate::searchsync::{self, SearchSync};
use crate::store::Store;
use crate::webfetch::WebBodyFetcher;

pub fn spawn_pool(
    store: Store,
    credit: CreditGate,
    queue: BoundedQueue,
    enricher: Arc<dyn Enricher>,
    webfetch: Arc<WebBodyFetcher>,
    search: Option<Arc<dyn SearchSync>>,
    content_len_threshold: usize,
    worker_count: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|idx| {
            let store = store.clone();
            let credit = credit.clone();
            let queue = queue.clone();
            let enricher = enricher.clone();
            let webfetch = webfetch.clone();
            let search = search.clone();
            tokio::spawn(async move {
                tracing::info!(worker = idx, "enrich worker started");
                loop {
                    let Some(item_id) = queue.take().await else {
                        tracing::info!(worker = idx, "enrich worker exiting on shutdown");
                        return;
                    };
                    if let Err(e) = process_one(
                        &store,
                        &credit,
                        enricher.as_ref(),
                        &webfetch,
                        search.clone(),
                        content_len_threshold,
                        &item_id,
                    )
                    .await
                    {
                        tracing::error!(worker = idx, item_id = %item_id, error = %e, "enrich worker failed to process item");
                    }
                }
            })
        })
        .collect()
}

async fn process_one(
    store: &Store,
    credit: &CreditGate,
    enricher: &dyn Enricher,
    webfetch: &WebBodyFetcher,
    search: Option<Arc<dyn SearchSync>>,
    content_len_threshold: usize,
    item_id: &str,
) -> anyhow::Result<()> {
    let Some(item) = store.get_item(item_id).await? else {
        tracing::warn!(item_id, "enrich worker: item vanished, dropping");
        return Ok(());
    };

    if item.status != "PENDING" {
        tracing::warn!(item_id, status = %item.status, "enrich worker: item not PENDING, dropping");
        return Ok(());
    }

    if !store.cas_item_status(item_id, "PENDING", "PROCESSING").await? {
        tracing::warn!(item_id, "enrich worker: CAS to PROCESSING lost race, dropping");
        return Ok(());
    }

    let Some(user_id) = store.get_item_owner(item_id).await? else {
        store.mark_item_error(item_id, "owning briefing/user vanished").await?;
        return Ok(());
    };
    let criteria = store.get_item_briefing_criteria(item_id).await?.unwrap_or_default();
    let ctx = Context::new(user_id.clone());

    let effective_content = item
        .effective_enrich_content()
        .map(str::to_string)
        .unwrap_or_default();

    let mut web_content: Option<String> = None;
    if let Some(link) = item.link.as_deref() {
        if (link.starts_with("http://") || link.starts_with("https://"))
            && effective_content.len() < content_len_threshold
        {
            if let Some(fetched) = webfetch.fetch(&ctx, link).await {
                store.set_item_web_content(item_id, &fetched).await?;
                web_content = Some(fetched);
            }
        }
    }

    let enrichment = match enricher
        .enrich_and_score(&ctx, &item.title, &effective_content, web_content.as_deref(), &criteria)
        .await
    {
        Ok(with_usage) => with_usage.value,
        Err(e) => {
            tracing::warn!(item_id, error = %e, "enrich worker: enrichment failed");
            store.mark_item_error(item_id, &format!("enrichment failed: {e}")).await?;
            return Ok(());
        }
    };

    let tags_json = json!({
        "topics": enrichment.topics,
        "people": enrichment.entities.people,
        "companies": enrichment.entities.companies,
        "technologies": enrichment.entities.technologies,
        "sentiment": enrichment.sentiment,
    })
    .to_string();

    let completed = credit
        .complete_enrichment(
            item_id,
            &user_id,
            &enrichment.summary,
            &tags_json,
            enrichment.score,
            &enrichment.score_reasoning,
        )
        .await?;

    if !completed {
        tracing::warn!(item_id, user_id, "enrich worker: insufficient credits at commit time");
        store
            .mark_item_error(item_id, "insufficient credits")
            .await?;
        return Ok(());
    }

    searchsync::fire_and_forget_index(search, item).await;

    Ok(())
}
