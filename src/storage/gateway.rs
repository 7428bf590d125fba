//! Per-event persistence across the visitor, lead, session and event tables
//!
//! The four writes run in sequence with no transaction around them. A failed
//! visitor or lead upsert is logged and the session upsert and event insert
//! still run: the raw event is worth more than consistent denormalized rows.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::error;

use crate::identity;
use crate::models::{Enrichment, Event, NewEvent, VisitorUpsert};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Written,
    Skipped,
    Failed,
}

/// What happened to each write for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistReport {
    pub visitor: StepOutcome,
    pub lead: StepOutcome,
    pub session: StepOutcome,
    pub event: StepOutcome,
}

impl PersistReport {
    pub fn failures(&self) -> usize {
        [self.visitor, self.lead, self.session, self.event]
            .iter()
            .filter(|outcome| **outcome == StepOutcome::Failed)
            .count()
    }

    pub fn event_stored(&self) -> bool {
        self.event == StepOutcome::Written
    }
}

pub struct StorageGateway {
    storage: Arc<dyn Storage>,
}

impl StorageGateway {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub async fn persist(&self, event: &Event, enrichment: &Enrichment) -> PersistReport {
        let fingerprint =
            identity::fingerprint(&event.ip, &event.user_agent, event.screen_resolution());
        let network = &enrichment.network;
        let seen_at = event.received_at;

        let visitor = VisitorUpsert {
            fingerprint: fingerprint.clone(),
            ip_hash: format!("{:x}", Sha256::digest(event.ip.as_bytes())),
            user_agent: event.user_agent.clone(),
            screen_resolution: event.screen_resolution().to_string(),
            country: enrichment.geo.country_code.clone(),
            city: enrichment.geo.city.clone(),
            company_name: (!network.is_unknown()).then(|| network.organization.clone()),
            company_domain: network.company_domain.clone(),
            is_isp: network.is_isp,
            seen_at,
        };

        let visitor = match self.storage.upsert_visitor(&visitor).await {
            Ok(()) => StepOutcome::Written,
            Err(e) => {
                error!(session_id = %event.session_id, error = %e, "Error upserting visitor");
                StepOutcome::Failed
            }
        };

        let lead = if network.is_known_company() {
            match self
                .storage
                .upsert_lead(&network.organization, network.company_domain.as_deref(), seen_at)
                .await
            {
                Ok(()) => StepOutcome::Written,
                Err(e) => {
                    error!(company = %network.organization, error = %e, "Error updating lead");
                    StepOutcome::Failed
                }
            }
        } else {
            StepOutcome::Skipped
        };

        let session = match self
            .storage
            .upsert_session(&event.session_id, &fingerprint, seen_at)
            .await
        {
            Ok(()) => StepOutcome::Written,
            Err(e) => {
                error!(session_id = %event.session_id, error = %e, "Error upserting session");
                StepOutcome::Failed
            }
        };

        let new_event = NewEvent {
            session_id: event.session_id.clone(),
            event_type: event.event_type.clone(),
            url: event.url.clone(),
            referrer: event.referrer.clone(),
            payload: event_payload(event, enrichment),
            created_at: seen_at,
        };

        let event_outcome = match self.storage.insert_event(&new_event).await {
            Ok(_) => StepOutcome::Written,
            Err(e) => {
                error!(session_id = %event.session_id, error = %e, "Error inserting event");
                StepOutcome::Failed
            }
        };

        PersistReport {
            visitor,
            lead,
            session,
            event: event_outcome,
        }
    }
}

/// Stored payload: client data under `d`, client timestamp under `ts`,
/// enrichment under `enrichment`
fn event_payload(event: &Event, enrichment: &Enrichment) -> String {
    let payload = json!({
        "d": Value::Object(event.payload.clone()),
        "ts": event.timestamp,
        "enrichment": {
            "organization": enrichment.network.organization,
            "is_isp": enrichment.network.is_isp,
            "company_domain": enrichment.network.company_domain,
            "country": enrichment.geo.country_code,
            "city": enrichment.geo.city,
        },
    });

    payload.to_string()
}
