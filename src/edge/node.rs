// Edge Cache Node

use super::load::{LoadSample, LoadTracker};
use super::selector::{NodeSelector, PeerState, PeerTable, RecommendationDecision};
use crate::cache::{ArcCache, CacheStats, Lookup};
use crate::config::{LoadConfig, RoutingConfig};
use crate::error::{CdnError, Result};
use crate::geo::{DistanceModel, GeoLocation, LinkProfile};
use crate::observability::{self, RequestOutcome};
use crate::origin::ContentSource;
use crate::types::{ContentId, EdgeDescriptor, EdgeId, Payload};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Edge node configuration
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Identity and location
    pub descriptor: EdgeDescriptor,
    /// Maximum cached items
    pub cache_capacity: usize,
    /// Load score parameters
    pub load: LoadConfig,
    /// Node selection parameters
    pub routing: RoutingConfig,
    /// Time allowed for an origin fetch
    pub fetch_timeout: Duration,
    /// Multiplier for simulated delays; 0 disables sleeping
    pub time_scale: f64,
    /// Seed for delay sampling
    pub seed: u64,
}

impl EdgeConfig {
    /// Creates a configuration with reference defaults for the given edge
    pub fn new(descriptor: EdgeDescriptor) -> Self {
        Self {
            descriptor,
            cache_capacity: 50,
            load: LoadConfig::default(),
            routing: RoutingConfig::default(),
            fetch_timeout: Duration::from_secs(5),
            time_scale: 0.0,
            seed: 0,
        }
    }
}

/// A content request as received by an edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContentRequest {
    /// Requested content
    pub content_id: ContentId,
    /// Where the user is
    pub user_location: GeoLocation,
    /// Recommendations the user already followed for this request
    pub recommendations: u32,
    /// The user will not follow another recommendation; serve regardless of load
    pub force: bool,
}

impl ContentRequest {
    pub fn new(content_id: ContentId, user_location: GeoLocation) -> Self {
        Self {
            content_id,
            user_location,
            recommendations: 0,
            force: false,
        }
    }

    /// Same request, one recommendation hop later
    pub fn next_hop(self) -> Self {
        Self {
            recommendations: self.recommendations + 1,
            ..self
        }
    }

    /// Same request, marked as the user's last: no further redirects
    pub fn forced(self) -> Self {
        Self { force: true, ..self }
    }
}

/// Content delivered by an edge
#[derive(Debug, Clone)]
pub struct ServedContent {
    pub content_id: ContentId,
    pub payload: Payload,
    /// Whether the payload came from the cache
    pub cache_hit: bool,
    /// Serving edge
    pub served_by: EdgeId,
    /// Edge-to-user delay, seconds
    pub network_delay_secs: f64,
    /// Edge-to-origin delay on a miss, seconds
    pub origin_delay_secs: f64,
    /// Processing delay caused by load, seconds
    pub load_delay_secs: f64,
    /// In-flight requests at the edge while serving, this one included
    pub active_requests: usize,
}

impl ServedContent {
    /// Total simulated latency, seconds
    pub fn latency_secs(&self) -> f64 {
        self.network_delay_secs + self.origin_delay_secs + self.load_delay_secs
    }
}

/// A redirect to a less loaded peer
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// Recommended peer
    pub edge: EdgeDescriptor,
    /// Peer load as last reported
    pub peer_load: f64,
    /// Distance from the user to the peer, km
    pub distance_km: f64,
    /// Load of the recommending edge
    pub own_load: f64,
}

/// Response to a content request
#[derive(Debug)]
pub enum EdgeResponse {
    /// The edge served the content
    Content(ServedContent),
    /// The edge is overloaded and points at a peer; nothing was served
    RecommendedEdge(Recommendation),
    /// The request failed at this edge
    Error(CdnError),
}

/// Edge cache node
pub struct EdgeNode {
    /// Configuration
    config: EdgeConfig,
    /// Content cache
    cache: Mutex<ArcCache>,
    /// In-flight request tracking
    load: LoadTracker,
    /// Latest peer load reports
    peers: RwLock<PeerTable>,
    /// Serve-or-recommend policy
    selector: NodeSelector,
    /// Where misses are fetched from
    origin: Arc<dyn ContentSource>,
    /// Delay model
    distance: DistanceModel,
    /// Delay sampling
    rng: Mutex<StdRng>,
    /// Statistics
    stats: EdgeStats,
}

/// Edge node statistics
#[derive(Default)]
pub struct EdgeStats {
    /// Requests received
    pub requests: AtomicU64,
    /// Requests served locally
    pub served: AtomicU64,
    /// Served because the user exhausted its recommendation hops
    pub forced: AtomicU64,
    /// Requests redirected to a peer
    pub recommended: AtomicU64,
    /// Requests that failed
    pub failed: AtomicU64,
    /// Bytes delivered to users
    pub bytes_served: AtomicU64,
    /// Bytes fetched from origin
    pub bytes_fetched: AtomicU64,
    /// Load reports accepted from peers
    pub reports_received: AtomicU64,
}

impl EdgeNode {
    /// Creates a new edge node
    pub fn new(config: EdgeConfig, origin: Arc<dyn ContentSource>) -> Self {
        Self {
            cache: Mutex::new(ArcCache::new(config.cache_capacity)),
            load: LoadTracker::new(&config.load),
            peers: RwLock::new(PeerTable::new()),
            selector: NodeSelector::new(config.routing.clone()),
            origin,
            distance: DistanceModel::default(),
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            stats: EdgeStats::default(),
            config,
        }
    }

    /// Gets the edge id
    pub fn id(&self) -> EdgeId {
        self.config.descriptor.id
    }

    /// Gets identity and location
    pub fn descriptor(&self) -> &EdgeDescriptor {
        &self.config.descriptor
    }

    /// Gets configuration
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Registers a peer this edge may recommend
    pub fn register_peer(&self, descriptor: EdgeDescriptor) {
        if descriptor.id == self.id() {
            return;
        }
        self.peers.write().register(descriptor);
    }

    /// Accepts a load report from a peer
    pub fn receive_load_report(&self, sample: LoadSample) -> bool {
        let accepted = self.peers.write().record(sample);
        if accepted {
            self.stats.reports_received.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Samples this edge's load for broadcasting
    pub fn load_sample(&self) -> LoadSample {
        let sample = self.load.sample(self.id());
        observability::update_edge_load(self.id(), sample.load);
        sample
    }

    /// Gets the current load score
    pub fn load_score(&self) -> f64 {
        self.load.score()
    }

    /// Gets in-flight requests
    pub fn active_requests(&self) -> usize {
        self.load.active_requests()
    }

    /// Gets the load tracker
    pub fn load_tracker(&self) -> &LoadTracker {
        &self.load
    }

    /// Copies the current peer view
    pub fn peer_snapshot(&self) -> Vec<PeerState> {
        self.peers.read().snapshot()
    }

    /// Handles one content request.
    ///
    /// The request counts toward this edge's load for its whole duration,
    /// including the decision itself. A user that already followed the
    /// maximum number of recommendations, by this edge's limit or its own,
    /// is always served here.
    pub async fn handle(&self, request: ContentRequest) -> EdgeResponse {
        let _guard = self.load.begin_request();
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let own_load = self.load.score();
        let forced =
            request.force || request.recommendations >= self.config.routing.max_recommendation_hops;

        if !forced {
            let peers = self.peers.read().snapshot();
            let decision = self
                .selector
                .decide(own_load, &request.user_location, &peers, Utc::now());

            if let RecommendationDecision::Recommend(peer_id) = decision {
                if let Some(peer) = peers.iter().find(|p| p.descriptor.id == peer_id) {
                    let recommendation = Recommendation {
                        edge: peer.descriptor.clone(),
                        peer_load: peer.sample.as_ref().map(|s| s.load).unwrap_or_default(),
                        distance_km: request.user_location.distance_km(&peer.descriptor.location),
                        own_load,
                    };
                    debug!(
                        edge_id = self.id(),
                        peer = peer_id,
                        own_load,
                        peer_load = recommendation.peer_load,
                        content_id = request.content_id,
                        "Recommending peer"
                    );
                    self.stats.recommended.fetch_add(1, Ordering::Relaxed);
                    observability::record_request(self.id(), RequestOutcome::Recommended);
                    return EdgeResponse::RecommendedEdge(recommendation);
                }
            }
        } else {
            self.stats.forced.fetch_add(1, Ordering::Relaxed);
        }

        match self.serve(request).await {
            Ok(content) => {
                self.stats.served.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_served
                    .fetch_add(content.payload.len() as u64, Ordering::Relaxed);
                observability::record_request(self.id(), RequestOutcome::Served);
                EdgeResponse::Content(content)
            }
            Err(e) => {
                warn!(
                    edge_id = self.id(),
                    content_id = request.content_id,
                    error = %e,
                    "Request failed"
                );
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                observability::record_request(self.id(), RequestOutcome::Failed);
                EdgeResponse::Error(e)
            }
        }
    }

    /// Serves from cache, fetching from origin on a miss.
    ///
    /// The cache lock is never held across the origin fetch. Two concurrent
    /// misses for the same id may both fetch; the second admission replaces
    /// the first in place.
    async fn serve(&self, request: ContentRequest) -> Result<ServedContent> {
        let content_id = request.content_id;
        let lookup = self.cache.lock().lookup(content_id);
        observability::record_cache_lookup(self.id(), matches!(lookup, Lookup::Hit(_)));

        let (payload, cache_hit, origin_delay_secs) = match lookup {
            Lookup::Hit(payload) => (payload, true, 0.0),
            Lookup::Miss => {
                let fetch = self
                    .origin
                    .fetch_content(content_id, self.config.descriptor.location);
                let fetched = tokio::time::timeout(self.config.fetch_timeout, fetch)
                    .await
                    .map_err(|_| CdnError::OriginTimeout {
                        content_id,
                        timeout_ms: self.config.fetch_timeout.as_millis() as u64,
                    })??;

                let payload = fetched.item.payload;
                self.stats
                    .bytes_fetched
                    .fetch_add(payload.len() as u64, Ordering::Relaxed);
                self.cache.lock().admit(content_id, payload.clone());
                (payload, false, fetched.delay.total_secs())
            }
        };

        let (network, load_delay) = {
            let mut rng = self.rng.lock();
            let network = self.distance.sample(
                &request.user_location,
                &self.config.descriptor.location,
                LinkProfile::UserToEdge,
                &mut *rng,
            );
            (network, self.load.load_delay(&mut *rng))
        };

        let content = ServedContent {
            content_id,
            payload,
            cache_hit,
            served_by: self.id(),
            network_delay_secs: network.total_secs(),
            origin_delay_secs,
            load_delay_secs: load_delay.as_secs_f64(),
            active_requests: self.load.active_requests(),
        };

        // Simulated processing and transfer keep the request in flight
        if self.config.time_scale > 0.0 {
            let secs =
                (content.network_delay_secs + content.load_delay_secs) * self.config.time_scale;
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
        }

        Ok(content)
    }

    /// Gets cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Checks whether an item is resident in the cache
    pub fn is_cached(&self, id: ContentId) -> bool {
        self.cache.lock().contains(id)
    }

    /// Gets node statistics
    pub fn stats(&self) -> EdgeStatsSnapshot {
        EdgeStatsSnapshot {
            edge_id: self.id(),
            name: self.config.descriptor.name.clone(),
            requests: self.stats.requests.load(Ordering::Relaxed),
            served: self.stats.served.load(Ordering::Relaxed),
            forced: self.stats.forced.load(Ordering::Relaxed),
            recommended: self.stats.recommended.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            bytes_served: self.stats.bytes_served.load(Ordering::Relaxed),
            bytes_fetched: self.stats.bytes_fetched.load(Ordering::Relaxed),
            reports_received: self.stats.reports_received.load(Ordering::Relaxed),
            cache: self.cache_stats(),
        }
    }
}

/// Statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeStatsSnapshot {
    pub edge_id: EdgeId,
    pub name: String,
    pub requests: u64,
    pub served: u64,
    pub forced: u64,
    pub recommended: u64,
    pub failed: u64,
    pub bytes_served: u64,
    pub bytes_fetched: u64,
    pub reports_received: u64,
    pub cache: CacheStats,
}

impl EdgeStatsSnapshot {
    /// Gets hit ratio
    pub fn hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }

    /// Gets the share of requests redirected elsewhere
    pub fn recommendation_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.recommended as f64 / self.requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OriginConfig;
    use crate::origin::OriginRegistry;

    fn chicago() -> GeoLocation {
        GeoLocation::new(41.8781, -87.6298)
    }

    fn node(capacity: usize) -> EdgeNode {
        let origin = Arc::new(OriginRegistry::new(&OriginConfig::default(), 42, 0.0));
        let config = EdgeConfig {
            cache_capacity: capacity,
            ..EdgeConfig::new(EdgeDescriptor::new(2, "Chicago", chicago()))
        };
        EdgeNode::new(config, origin)
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let node = node(10);
        let request = ContentRequest::new(3, chicago());

        let first = match node.handle(request).await {
            EdgeResponse::Content(c) => c,
            other => panic!("expected content, got {:?}", other),
        };
        assert!(!first.cache_hit);
        assert!(first.origin_delay_secs > 0.0);
        assert_eq!(first.active_requests, 1);

        let second = match node.handle(request).await {
            EdgeResponse::Content(c) => c,
            other => panic!("expected content, got {:?}", other),
        };
        assert!(second.cache_hit);
        assert_eq!(second.origin_delay_secs, 0.0);
        assert!(second.payload.ptr_eq(&first.payload));

        let stats = node.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.served, 2);
        assert_eq!(stats.cache.hits, 1);
        assert_eq!(stats.cache.misses, 1);
        assert_eq!(node.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_unknown_content_is_error() {
        let node = node(10);
        match node.handle(ContentRequest::new(1_000, chicago())).await {
            EdgeResponse::Error(CdnError::ContentNotFound(1_000)) => {}
            other => panic!("expected not found, got {:?}", other),
        }
        assert_eq!(node.stats().failed, 1);
        assert!(!node.is_cached(1_000));
        assert_eq!(node.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_ignores_self_and_unknown_reports() {
        let node = node(10);
        node.register_peer(node.descriptor().clone());
        assert!(!node.receive_load_report(node.load_sample()));

        node.register_peer(EdgeDescriptor::new(1, "New York", GeoLocation::new(40.7128, -74.0060)));
        let mut sample = node.load_sample();
        sample.edge_id = 1;
        assert!(node.receive_load_report(sample));
        assert_eq!(node.stats().reports_received, 1);
    }

    #[test]
    fn test_next_hop() {
        let request = ContentRequest::new(1, chicago()).next_hop().next_hop();
        assert_eq!(request.recommendations, 2);
        assert_eq!(request.content_id, 1);
        assert!(!request.force);
        assert!(request.next_hop().forced().next_hop().force);
    }

    #[tokio::test]
    async fn test_forced_request_skips_recommendation() {
        let node = node(10);
        node.register_peer(EdgeDescriptor::new(1, "New York", GeoLocation::new(40.7128, -74.0060)));
        let mut sample = node.load_sample();
        sample.edge_id = 1;
        node.receive_load_report(sample);

        let _held: Vec<_> = (0..8).map(|_| node.load_tracker().begin_request()).collect();
        assert!(matches!(
            node.handle(ContentRequest::new(3, chicago())).await,
            EdgeResponse::RecommendedEdge(_)
        ));

        // Below this edge's own hop limit, but the user asked for service
        let request = ContentRequest::new(3, chicago()).next_hop().forced();
        match node.handle(request).await {
            EdgeResponse::Content(content) => assert_eq!(content.served_by, 2),
            other => panic!("expected content, got {:?}", other),
        }
        let stats = node.stats();
        assert_eq!(stats.forced, 1);
        assert_eq!(stats.recommended, 1);
    }
}
