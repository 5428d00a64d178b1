//! Brief worker pool: selects the top-scored items since the briefing's
//! last run, writes a `Report`, and optionally emails it.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use chrono_tz::Tz;

use crate::mailer::ReportMailer;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub fn spawn_pool(
    store: Store,
    queue: BoundedQueue,
    mailer: Arc<dyn ReportMailer>,
    max_report_items: usize,
    worker_count: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..worker_count)
        .map(|idx| {
            let store = store.clone();
            let queue = queue.clone();
            let mailer = mailer.clone();
            tokio::spawn(async move {
                tracing::info!(worker = idx, "brief worker started");
                loop {
                    let Some(briefing_id) = queue.take().await else {
                        tracing::info!(worker = idx, "brief worker exiting on shutdown");
                        return;
                    };
                    if let Err(e) =
                        process_one(&store, mailer.as_ref(), max_report_items, &briefing_id).await
                    {
                        tracing::error!(worker = idx, briefing_id = %briefing_id, error = %e, "brief worker failed to process briefing");
                    }
                }
            })
        })
        .collect()
}

async fn process_one(
    store: &Store,
    mailer: &dyn ReportMailer,
    max_report_items: usize,
    briefing_id: &str,
) -> anyhow::Result<()> {
    let Some(briefing) = store.get_briefing(briefing_id).await? else {
        tracing::warn!(briefing_id, "brief worker: briefing vanished, dropping");
        return Ok(());
    };

    if briefing.status != "QUEUED" {
        tracing::warn!(briefing_id, status = %briefing.status, "brief worker: briefing not QUEUED, dropping");
        return Ok(());
    }

    if !store.cas_briefing_status(briefing_id, "QUEUED", "PROCESSING").await? {
        tracing::warn!(briefing_id, "brief worker: CAS to PROCESSING lost race, dropping");
        return Ok(());
    }

    let tz: Tz = match briefing.timezone.parse() {
        Ok(tz) => tz,
        Err(_) => {
            store.revert_briefing_status(briefing_id, "ERROR").await?;
            anyhow::bail!("invalid timezone for briefing {briefing_id}: {}", briefing.timezone);
        }
    };
    let user_now = Utc::now().with_timezone(&tz);

    let since = match briefing.last_executed_at {
        Some(last) => last,
        None => {
            let lookback = if briefing.frequency == "WEEKLY" {
                ChronoDuration::days(7)
            } else {
                ChronoDuration::days(1)
            };
            let start_of_today = user_now
                .with_hour(0)
                .and_then(|d| d.with_minute(0))
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(user_now);
            (start_of_today - lookback).with_timezone(&Utc)
        }
    };

    let items: Vec<crate::model::Item> = store
        .top_scored_items_since(briefing_id, since, max_report_items as i64)
        .await?;

    if items.is_empty() {
        // Nothing to report this cycle; still return to ACTIVE without
        // advancing lastExecutedAt so the next due check can retry.
        store.revert_briefing_status(briefing_id, "ACTIVE").await?;
        return Ok(());
    }

    let local_date = user_now.format("%Y-%m-%d").to_string();
    let report = store.write_report(briefing_id, &items, &local_date).await?;

    if briefing.email_delivery_enabled {
        if let Err(e) = mailer.deliver(&briefing, &report).await {
            tracing::warn!(briefing_id, error = %e, "report mailer delivery failed, continuing");
        }
    }

    Ok(())
}

