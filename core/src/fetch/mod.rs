//! The fetch pipeline: scheduler + bounded queue + worker pool that pulls
//! new items from each source's type-specific fetcher.

pub mod fetchers;
pub mod scheduler;
pub mod worker;

use std::sync::Arc;

use common::FetchConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::queue::BoundedQueue;
use crate::store::Store;
use fetchers::FetcherRegistry;

pub struct FetchPipeline {
    pub queue: BoundedQueue,
}

impl FetchPipeline {
    /// Wires the queue, spawns the scheduler and the worker pool, and
    /// returns a handle exposing the queue (for recovery/metrics) plus join
    /// handles for graceful shutdown.
    pub fn spawn(
        store: Store,
        registry: Arc<FetcherRegistry>,
        config: FetchConfig,
        shutdown: Arc<Notify>,
    ) -> (Self, Vec<tokio::task::JoinHandle<()>>) {
        let queue = BoundedQueue::new(config.queue_capacity);
        let credit = CreditGate::new(store.clone());

        let mut handles = worker::spawn_pool(store.clone(), queue.clone(), registry, config.worker_count);

        let scheduler_store = store;
        let scheduler_queue = queue.clone();
        let scheduler_config = config;
        let scheduler_shutdown = shutdown;
        handles.push(tokio::spawn(async move {
            scheduler::run(scheduler_store, credit, scheduler_queue, scheduler_config, scheduler_shutdown).await;
        }));

        (Self { queue }, handles)
    }
}
