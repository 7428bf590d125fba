//! Periodic maintenance: retention pruning and ISP blacklist reloads

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info, warn};

use crate::models::PruneReport;
use crate::network::NetworkIntelligence;
use crate::storage::Storage;

const SECONDS_PER_DAY: i64 = 86_400;

/// Delete sessions and events older than `days` relative to `now`
pub async fn prune_expired(storage: &dyn Storage, days: u32, now: i64) -> Result<PruneReport> {
    let cutoff = now - i64::from(days) * SECONDS_PER_DAY;
    storage.prune_before(cutoff).await
}

pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Prune every `interval_secs`; `days == 0` keeps data forever
    pub fn spawn_retention(&mut self, storage: Arc<dyn Storage>, days: u32, interval_secs: u64) {
        if days == 0 {
            info!("Retention pruning disabled");
            return;
        }

        info!("Pruning sessions and events older than {} days", days);
        self.spawn_periodic(Duration::from_secs(interval_secs), move || {
            let storage = Arc::clone(&storage);
            async move {
                let now = chrono::Utc::now().timestamp();
                match prune_expired(storage.as_ref(), days, now).await {
                    Ok(report) if report.sessions + report.events > 0 => info!(
                        "Pruned {} sessions and {} events",
                        report.sessions, report.events
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Retention pruning failed: {}", e),
                }
            }
        });
    }

    /// Reload the ISP blacklist file every `interval_secs`; 0 disables
    pub fn spawn_blacklist_refresh(&mut self, network: Arc<NetworkIntelligence>, interval_secs: u64) {
        if interval_secs == 0 {
            return;
        }

        self.spawn_periodic(Duration::from_secs(interval_secs), move || {
            let network = Arc::clone(&network);
            async move {
                match network.reload_isp_filter() {
                    Ok(terms) => info!("Reloaded ISP blacklist ({} terms)", terms),
                    Err(e) => warn!("Keeping current ISP blacklist: {:#}", e),
                }
            }
        });
    }

    fn spawn_periodic<F, Fut>(&mut self, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.handles.push(tokio::spawn(async move {
            let mut interval = time::interval(period);
            // Skip the first tick which fires immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => job().await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
