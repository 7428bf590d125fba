use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::NetworkConfig;
use crate::ingest::{IngestOutcome, Ingestor, QueueStats};
use crate::models::CollectRequest;
use crate::privacy::parse_flag;
use crate::storage::{Storage, TableCounts};

use super::ip_extractor::extract_client_ip;

pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub storage: Arc<dyn Storage>,
    pub network: NetworkConfig,
    /// Lowercase name of the per-request privacy header
    pub privacy_header: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CollectResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

#[derive(Serialize)]
pub struct IngestStatsResponse {
    pub queue: QueueStats,
    pub privacy_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TableCounts>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Accept a tracking beacon.
///
/// The body is parsed regardless of content type since `navigator.sendBeacon`
/// posts `text/plain`. Bot and overload outcomes still answer 200 so the
/// browser script never retries.
pub async fn collect(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CollectResponse>, ApiError> {
    let request: CollectRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting malformed beacon: {}", e);
        bad_request("Invalid payload")
    })?;

    let client_ip = extract_client_ip(&headers, addr.ip(), &state.network);
    let force_privacy = headers
        .get(state.privacy_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(parse_flag)
        .unwrap_or(false);

    let outcome = state
        .ingestor
        .ingest(
            request,
            Some(client_ip.to_string()),
            force_privacy,
            chrono::Utc::now().timestamp(),
        )
        .await
        .map_err(|e| bad_request(e.to_string()))?;

    let response = match outcome {
        IngestOutcome::Accepted => CollectResponse {
            status: "ok",
            reason: None,
        },
        IngestOutcome::IgnoredBot => CollectResponse {
            status: "ignored",
            reason: Some("bot"),
        },
        IngestOutcome::Dropped => CollectResponse {
            status: "dropped",
            reason: None,
        },
    };

    Ok(Json(response))
}

/// Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// Queue counters, current privacy mode and table sizes
pub async fn ingest_stats(State(state): State<Arc<AppState>>) -> Json<IngestStatsResponse> {
    let tables = match state.storage.table_counts().await {
        Ok(counts) => Some(counts),
        Err(e) => {
            error!("Failed to count tables: {}", e);
            None
        }
    };

    Json(IngestStatsResponse {
        queue: state.ingestor.queue().stats(),
        privacy_mode: state.ingestor.privacy().is_enabled().await,
        tables,
    })
}
