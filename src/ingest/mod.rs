//! Request-side half of the pipeline: validation, bot filtering, IP
//! privacy, then a non-blocking hand-off to the worker queue.

pub mod queue;
pub mod worker;

use std::sync::Arc;
use tracing::debug;

use crate::identity;
use crate::models::{CollectRequest, Event, ValidationError};
use crate::privacy::PrivacyGuard;

pub use queue::{IngestionQueue, QueueStats, SubmitOutcome};
pub use worker::WorkerPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// Queue full; the event was shed
    Dropped,
    IgnoredBot,
}

pub struct Ingestor {
    queue: Arc<IngestionQueue>,
    privacy: Arc<PrivacyGuard>,
}

impl Ingestor {
    pub fn new(queue: Arc<IngestionQueue>, privacy: Arc<PrivacyGuard>) -> Self {
        Self { queue, privacy }
    }

    pub fn queue(&self) -> &Arc<IngestionQueue> {
        &self.queue
    }

    pub fn privacy(&self) -> &Arc<PrivacyGuard> {
        &self.privacy
    }

    /// `client_ip` is the address resolved from the connection; a non-empty
    /// `ip` in the payload wins over it. `force_privacy` hashes regardless of
    /// the stored setting.
    pub async fn ingest(
        &self,
        request: CollectRequest,
        client_ip: Option<String>,
        force_privacy: bool,
        received_at: i64,
    ) -> Result<IngestOutcome, ValidationError> {
        request.validate()?;

        if identity::is_bot(&request.user_agent) {
            debug!(user_agent = %request.user_agent, "Ignoring bot traffic");
            return Ok(IngestOutcome::IgnoredBot);
        }

        let raw_ip = request
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .or(client_ip)
            .ok_or(ValidationError::MissingIp)?;

        let ip = self.privacy.hash_if_enabled(&raw_ip, force_privacy).await;
        let event = Event::from_request(request, ip, received_at);

        Ok(match self.queue.submit(event) {
            SubmitOutcome::Accepted => IngestOutcome::Accepted,
            SubmitOutcome::Dropped => IngestOutcome::Dropped,
        })
    }
}
