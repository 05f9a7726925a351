//! Observability for the edge CDN.
//!
//! Provides logging setup and the metrics emitted by edges. Metrics go
//! through the `metrics` facade; without an installed recorder they are
//! no-ops, so library users decide whether and how to export them.

use crate::config::ObservabilityConfig;
use crate::error::{CdnError, Result};
use crate::types::EdgeId;
use metrics::{counter, gauge};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| CdnError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| CdnError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// How an edge disposed of a request, as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Served,
    Recommended,
    Failed,
}

impl RequestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            RequestOutcome::Served => "served",
            RequestOutcome::Recommended => "recommended",
            RequestOutcome::Failed => "failed",
        }
    }
}

/// Record one handled request.
pub fn record_request(edge_id: EdgeId, outcome: RequestOutcome) {
    counter!(
        "cdn_requests_total",
        "edge" => edge_id.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    if outcome == RequestOutcome::Recommended {
        counter!("cdn_recommendations_total", "edge" => edge_id.to_string()).increment(1);
    }
}

/// Record a cache lookup result.
pub fn record_cache_lookup(edge_id: EdgeId, hit: bool) {
    if hit {
        counter!("cdn_cache_hits_total", "edge" => edge_id.to_string()).increment(1);
    } else {
        counter!("cdn_cache_misses_total", "edge" => edge_id.to_string()).increment(1);
    }
}

/// Update the published load of an edge.
pub fn update_edge_load(edge_id: EdgeId, load: f64) {
    gauge!("cdn_edge_load", "edge" => edge_id.to_string()).set(load);
}
