//! `SearchSync`: fire-and-forget hook into an optional full-text search
//! index. Present or absent based on configuration; every call site checks
//! for the collaborator explicitly rather than relying on a default no-op
//! that could mask a misconfiguration.

use async_trait::async_trait;

use crate::model::Item;

#[async_trait]
pub trait SearchSync: Send + Sync {
    async fn index(&self, item: &Item) -> anyhow::Result<()>;
    async fn update(&self, item: &Item) -> anyhow::Result<()>;
    async fn delete(&self, item_id: &str) -> anyhow::Result<()>;
    async fn delete_by_briefing(&self, briefing_id: &str) -> anyhow::Result<()>;
}

/// Fires `index` without waiting for the result; any error is logged and
/// discarded, per the spec's "errors are ignored" contract.
pub async fn fire_and_forget_index(sync: Option<std::sync::Arc<dyn SearchSync>>, item: Item) {
    let Some(sync) = sync else { return };
    tokio::spawn(async move {
        if let Err(e) = sync.index(&item).await {
            tracing::warn!(item_id = %item.id, error = %e, "search sync index failed");
        }
    });
}
