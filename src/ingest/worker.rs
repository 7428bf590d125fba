use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::enrichment::EnrichmentPipeline;
use crate::ingest::queue::IngestionQueue;
use crate::storage::StorageGateway;

/// Fixed set of long-running consumers of the ingestion queue. A worker exits
/// only once the queue is closed and drained; per-event failures are logged
/// and never stop the loop.
pub struct WorkerPool {
    queue: Arc<IngestionQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        queue: Arc<IngestionQueue>,
        pipeline: Arc<EnrichmentPipeline>,
        gateway: Arc<StorageGateway>,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&pipeline),
                    Arc::clone(&gateway),
                ))
            })
            .collect();

        info!("Started {} ingestion workers", workers);

        Self { queue, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Close the queue and wait for every worker to drain it
    pub async fn shutdown(self) {
        self.queue.close();

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("Ingestion worker ended abnormally: {}", e);
            }
        }

        info!(
            "Ingestion workers stopped ({} events processed)",
            self.queue.stats().processed
        );
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<IngestionQueue>,
    pipeline: Arc<EnrichmentPipeline>,
    gateway: Arc<StorageGateway>,
) {
    let receiver = queue.receiver();

    loop {
        // Hold the lock only while waiting for the next event
        let next = receiver.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };

        let enrichment = pipeline.enrich(&event).await;
        let report = gateway.persist(&event, &enrichment).await;
        queue.mark_processed();

        if report.failures() > 0 {
            debug!(
                worker = id,
                session_id = %event.session_id,
                failures = report.failures(),
                "Event persisted with failed steps"
            );
        }
    }

    debug!(worker = id, "Ingestion worker exiting");
}
