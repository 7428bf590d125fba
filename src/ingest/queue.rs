//! Bounded in-memory buffer between the request path and the workers

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Queue full or closed; the event is discarded
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub capacity: usize,
    /// Accepted but not yet processed, including events still draining after close
    pub depth: usize,
    pub accepted: u64,
    pub dropped: u64,
    pub processed: u64,
    pub closed: bool,
}

/// Shed events are summarized at warn on the first drop and every this many after
const DROP_REPORT_INTERVAL: u64 = 1_000;

fn should_report_drops(total_dropped: u64) -> bool {
    total_dropped == 1 || total_dropped % DROP_REPORT_INTERVAL == 0
}

/// Receiving half shared by every worker
pub type SharedReceiver = Arc<Mutex<mpsc::Receiver<Event>>>;

pub struct IngestionQueue {
    sender: RwLock<Option<mpsc::Sender<Event>>>,
    receiver: SharedReceiver,
    capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
}

impl IngestionQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            sender: RwLock::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            processed: AtomicU64::new(0),
        }
    }

    /// Never waits: a full queue sheds the event.
    pub fn submit(&self, event: Event) -> SubmitOutcome {
        let guard = self.sender.read();
        let Some(sender) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Dropped;
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Accepted
            }
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(session_id = %event.session_id, "Ingestion queue full, dropping event");
                if should_report_drops(total) {
                    warn!(
                        dropped = total,
                        capacity = self.capacity,
                        "Ingestion queue full, shedding events"
                    );
                }
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Dropped
            }
        }
    }

    /// Stops accepting events. Buffered events stay readable until drained.
    pub fn close(&self) {
        self.sender.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub fn receiver(&self) -> SharedReceiver {
        Arc::clone(&self.receiver)
    }

    pub(crate) fn mark_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        let accepted = self.accepted.load(Ordering::Relaxed);
        let processed = self.processed.load(Ordering::Relaxed);

        QueueStats {
            capacity: self.capacity,
            depth: accepted.saturating_sub(processed) as usize,
            accepted,
            dropped: self.dropped.load(Ordering::Relaxed),
            processed,
            closed: self.is_closed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectRequest;

    fn event(n: usize) -> Event {
        let request = CollectRequest {
            event_type: "pageview".into(),
            session_id: format!("s-{n}"),
            url: "https://example.com".into(),
            ..Default::default()
        };
        Event::from_request(request, "203.0.113.7".into(), 1_700_000_000)
    }

    #[test]
    fn test_full_queue_sheds_load() {
        let queue = IngestionQueue::new(3);

        let outcomes: Vec<_> = (0..5).map(|n| queue.submit(event(n))).collect();

        assert_eq!(
            outcomes,
            vec![
                SubmitOutcome::Accepted,
                SubmitOutcome::Accepted,
                SubmitOutcome::Accepted,
                SubmitOutcome::Dropped,
                SubmitOutcome::Dropped,
            ]
        );

        let stats = queue.stats();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.depth, 3);
    }

    #[test]
    fn test_submit_after_close_is_dropped() {
        let queue = IngestionQueue::new(4);
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.submit(event(0)), SubmitOutcome::Dropped);
        assert_eq!(queue.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_depth_tracks_draining_after_close() {
        let queue = IngestionQueue::new(4);
        queue.submit(event(1));
        queue.submit(event(2));
        queue.close();

        let stats = queue.stats();
        assert!(stats.closed);
        assert_eq!(stats.depth, 2);

        let receiver = queue.receiver();
        let mut rx = receiver.lock().await;
        rx.recv().await.unwrap();
        queue.mark_processed();
        assert_eq!(queue.stats().depth, 1);

        rx.recv().await.unwrap();
        queue.mark_processed();
        assert_eq!(queue.stats().depth, 0);
    }

    #[test]
    fn test_drop_warnings_are_sampled() {
        assert!(should_report_drops(1));
        assert!(!should_report_drops(2));
        assert!(!should_report_drops(999));
        assert!(should_report_drops(1_000));
        assert!(!should_report_drops(1_001));
        assert!(should_report_drops(5_000));
    }

    #[tokio::test]
    async fn test_buffered_events_survive_close() {
        let queue = IngestionQueue::new(4);
        queue.submit(event(1));
        queue.submit(event(2));
        queue.close();

        let receiver = queue.receiver();
        let mut rx = receiver.lock().await;
        assert_eq!(rx.recv().await.map(|e| e.session_id), Some("s-1".into()));
        assert_eq!(rx.recv().await.map(|e| e.session_id), Some("s-2".into()));
        assert!(rx.recv().await.is_none());
    }
}
