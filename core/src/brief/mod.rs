//! The brief pipeline: scheduler + bounded queue + worker pool that
//! materializes per-briefing reports from the enriched corpus.

pub mod scheduler;
pub mod worker;

use std::sync::Arc;

use common::BriefConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::mailer::ReportMailer;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub struct BriefPipeline {
    pub queue: BoundedQueue,
}

impl BriefPipeline {
    pub fn spawn(
        store: Store,
        mailer: Arc<dyn ReportMailer>,
        config: BriefConfig,
        shutdown: Arc<Notify>,
    ) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let queue = BoundedQueue::new(config.queue_capacity);
        let credit = CreditGate::new(store.clone());

        let mut handles = worker::spawn_pool(
            store.clone(),
            queue.clone(),
            mailer,
            config.max_report_items,
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
