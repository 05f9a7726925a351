// Test fixtures for integration tests

use async_trait::async_trait;
use cdn_edge::config::OriginConfig;
use cdn_edge::edge::{EdgeConfig, EdgeNode, LoadSample, RequestGuard};
use cdn_edge::error::{CdnError, Result};
use cdn_edge::geo::GeoLocation;
use cdn_edge::origin::{ContentSource, FetchedContent, OriginRegistry};
use cdn_edge::session::{EdgeDirectory, PopularityProfile, ThinkTime, UserProfile};
use cdn_edge::types::{ContentId, EdgeDescriptor, EdgeId};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub const SEED: u64 = 42;

pub fn new_york() -> EdgeDescriptor {
    EdgeDescriptor::new(1, "New York, NY", GeoLocation::new(40.7128, -74.0060))
}

pub fn chicago() -> EdgeDescriptor {
    EdgeDescriptor::new(2, "Chicago, IL", GeoLocation::new(41.8781, -87.6298))
}

pub fn los_angeles() -> EdgeDescriptor {
    EdgeDescriptor::new(3, "Los Angeles, CA", GeoLocation::new(34.0522, -118.2437))
}

pub fn houston() -> EdgeDescriptor {
    EdgeDescriptor::new(4, "Houston, TX", GeoLocation::new(29.7604, -95.3698))
}

pub fn reference_edges() -> Vec<EdgeDescriptor> {
    vec![new_york(), chicago(), los_angeles(), houston()]
}

/// Origin with the reference catalog and no simulated sleeping.
pub fn origin() -> Arc<OriginRegistry> {
    let origin = Arc::new(OriginRegistry::new(&OriginConfig::default(), SEED, 0.0));
    for edge in reference_edges() {
        origin.register_edge(edge);
    }
    origin
}

/// Edge backed by `source`, with reference routing and load settings.
pub fn edge_with(descriptor: EdgeDescriptor, source: Arc<dyn ContentSource>) -> Arc<EdgeNode> {
    Arc::new(EdgeNode::new(EdgeConfig::new(descriptor), source))
}

/// All reference edges over one origin, each knowing the others as peers.
pub fn edge_network(origin: &Arc<OriginRegistry>) -> EdgeDirectory {
    let source: Arc<dyn ContentSource> = origin.clone();
    let mut edges = EdgeDirectory::new();
    for descriptor in reference_edges() {
        let node = edge_with(descriptor.clone(), source.clone());
        for peer in reference_edges() {
            node.register_peer(peer);
        }
        edges.insert(descriptor.id, node);
    }
    edges
}

/// Holds `n` requests in flight at `node` until the guards are dropped.
pub fn hold_load(node: &EdgeNode, n: usize) -> Vec<RequestGuard<'_>> {
    (0..n).map(|_| node.load_tracker().begin_request()).collect()
}

/// A load report as if sent by `edge_id` at `at`.
pub fn report(edge_id: EdgeId, load: f64, at: DateTime<Utc>) -> LoadSample {
    LoadSample {
        edge_id,
        load,
        active_requests: 0,
        timestamp: at,
    }
}

pub fn user(id: u64, location: GeoLocation) -> UserProfile {
    UserProfile {
        id,
        city: format!("user-{}", id),
        location,
        request_count: 5,
        popularity: PopularityProfile::Standard,
        think_time: ThinkTime::new(Duration::ZERO, Duration::ZERO),
    }
}

/// Origin that never answers.
pub struct StalledOrigin;

#[async_trait]
impl ContentSource for StalledOrigin {
    async fn fetch_content(
        &self,
        _id: ContentId,
        _requester: GeoLocation,
    ) -> Result<FetchedContent> {
        std::future::pending::<()>().await;
        Err(CdnError::Internal("unreachable".into()))
    }
}

/// Origin whose fetches block until released, delegating to a real origin.
pub struct GatedOrigin {
    inner: Arc<OriginRegistry>,
    gate: Semaphore,
    pub fetches: AtomicU64,
}

impl GatedOrigin {
    pub fn new(inner: Arc<OriginRegistry>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Lets `n` blocked or future fetches through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for GatedOrigin {
    async fn fetch_content(&self, id: ContentId, requester: GeoLocation) -> Result<FetchedContent> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| CdnError::Internal(e.to_string()))?;
        permit.forget();
        self.inner.fetch_content(id, requester).await
    }
}
