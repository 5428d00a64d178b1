//! The enrich pipeline: scheduler + bounded queue + worker pool that scores
//! and summarizes NEW items via the enricher.

pub mod scheduler;
pub mod worker;

use std::sync::Arc;

use common::EnrichConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::enricher::Enricher;
use crate::queue::BoundedQueue;
use crate::searchsync::SearchSync;
use crate::store::Store;
use crate::webfetch::WebBodyFetcher;

pub struct EnrichPipeline {
    pub queue: BoundedQueue,
}

impl EnrichPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        store: Store,
        enricher: Arc<dyn Enricher>,
        webfetch: Arc<WebBodyFetcher>,
        search: Option<Arc<dyn SearchSync>>,
        config: EnrichConfig,
        shutdown: Arc<Notify>,
    ) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let queue = BoundedQueue::new(config.queue_capacity);
        let credit = CreditGate::new(store.clone());

        let mut handles = worker::spawn_pool(
            store.clone(),
            credit.clone(),
            queue.clone(),
            enricher,
            webfetch,
            search,
            config.content_len_threshold_for_web_fetch,
            config.worker_count,
        );

        let scheduler_store = store;
        let scheduler_queue = queue.clone();
        handles.push(tokio::spawn(async move {
            scheduler::run(scheduler_store, credit, scheduler_queue, config, shutdown).await;
        }));

        (Self { queue }, handles)
    }
}
