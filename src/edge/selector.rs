// Node Selection
//
// Decides whether an edge should serve a request itself or point the user
// at a less loaded peer. The decision is a pure function of the edge's own
// load, the requester's location, a snapshot of peer loads and the clock.

use super::load::LoadSample;
use crate::config::RoutingConfig;
use crate::geo::GeoLocation;
use crate::types::{EdgeDescriptor, EdgeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of node selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationDecision {
    /// Handle the request locally
    Serve,
    /// Redirect the user to this peer
    Recommend(EdgeId),
}

/// Known peer and its most recent load report
#[derive(Debug, Clone, PartialEq)]
pub struct PeerState {
    /// Peer identity and location
    pub descriptor: EdgeDescriptor,
    /// Latest sample, if any arrived yet
    pub sample: Option<LoadSample>,
}

impl PeerState {
    /// Creates a peer with no load report yet
    pub fn new(descriptor: EdgeDescriptor) -> Self {
        Self {
            descriptor,
            sample: None,
        }
    }
}

/// Latest load report per peer.
///
/// A newer report simply overwrites the previous one. Reports from edges
/// that were never registered are dropped.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<EdgeId, PeerState>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer; re-registering keeps its last sample
    pub fn register(&mut self, descriptor: EdgeDescriptor) {
        self.peers
            .entry(descriptor.id)
            .and_modify(|state| state.descriptor = descriptor.clone())
            .or_insert_with(|| PeerState::new(descriptor));
    }

    /// Records a load report, returning false for unknown peers
    pub fn record(&mut self, sample: LoadSample) -> bool {
        match self.peers.get_mut(&sample.edge_id) {
            Some(state) => {
                state.sample = Some(sample);
                true
            }
            None => {
                warn!(edge_id = sample.edge_id, "Ignoring load report from unknown edge");
                false
            }
        }
    }

    /// Gets a peer by id
    pub fn get(&self, id: EdgeId) -> Option<&PeerState> {
        self.peers.get(&id)
    }

    /// Copies the table for use outside the lock, ordered by edge id
    pub fn snapshot(&self) -> Vec<PeerState> {
        let mut peers: Vec<_> = self.peers.values().cloned().collect();
        peers.sort_by_key(|p| p.descriptor.id);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// An eligible peer with its composite score (lower is better)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub edge_id: EdgeId,
    pub load: f64,
    pub distance_km: f64,
    pub score: f64,
}

/// Chooses between serving locally and recommending a peer
#[derive(Debug, Clone)]
pub struct NodeSelector {
    config: RoutingConfig,
}

impl NodeSelector {
    /// Creates a new selector
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Gets configuration
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Decides how to handle one request.
    ///
    /// An edge at or below the overload threshold always serves. Otherwise
    /// the best eligible candidate is recommended; with none eligible the
    /// edge serves anyway.
    pub fn decide(
        &self,
        own_load: f64,
        requester: &GeoLocation,
        peers: &[PeerState],
        now: DateTime<Utc>,
    ) -> RecommendationDecision {
        if own_load <= self.config.overload_threshold {
            return RecommendationDecision::Serve;
        }

        match self.rank(own_load, requester, peers, now).first() {
            Some(best) => RecommendationDecision::Recommend(best.edge_id),
            None => {
                debug!(own_load, peers = peers.len(), "Overloaded but no eligible peer");
                RecommendationDecision::Serve
            }
        }
    }

    /// Scores every eligible peer, best first.
    ///
    /// A peer is eligible when its sample is fresh and its load is strictly
    /// below `own_load * relative_load_factor`. Distances are normalized by
    /// the farthest eligible peer; equal scores order by edge id.
    pub fn rank(
        &self,
        own_load: f64,
        requester: &GeoLocation,
        peers: &[PeerState],
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let ceiling = own_load * self.config.relative_load_factor;

        let eligible: Vec<(EdgeId, f64, f64)> = peers
            .iter()
            .filter_map(|peer| {
                let sample = peer.sample.as_ref()?;
                if sample.is_stale(now, self.config.stale_after) || sample.load >= ceiling {
                    return None;
                }
                let distance = requester.distance_km(&peer.descriptor.location);
                Some((peer.descriptor.id, sample.load, distance))
            })
            .collect();

        let max_distance = eligible
            .iter()
            .map(|(_, _, distance)| *distance)
            .fold(0.0_f64, f64::max);

        let mut candidates: Vec<Candidate> = eligible
            .into_iter()
            .map(|(edge_id, load, distance_km)| {
                let normalized = if max_distance > 0.0 {
                    distance_km / max_distance
                } else {
                    0.0
                };
                Candidate {
                    edge_id,
                    load,
                    distance_km,
                    score: self.config.load_weight * load
                        + self.config.distance_weight * normalized,
                }
            })
            .collect();

        candidates.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.edge_id.cmp(&b.edge_id)));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(id: EdgeId, lat: f64, lon: f64, load: f64, at: DateTime<Utc>) -> PeerState {
        PeerState {
            descriptor: EdgeDescriptor::new(id, format!("edge-{}", id), GeoLocation::new(lat, lon)),
            sample: Some(LoadSample {
                edge_id: id,
                load,
                active_requests: 0,
                timestamp: at,
            }),
        }
    }

    fn chicago() -> GeoLocation {
        GeoLocation::new(41.8781, -87.6298)
    }

    #[test]
    fn test_serves_at_threshold() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();
        let peers = vec![peer(1, 40.7128, -74.0060, 0.0, now)];

        assert_eq!(
            selector.decide(0.70, &chicago(), &peers, now),
            RecommendationDecision::Serve
        );
        assert_eq!(
            selector.decide(0.7000001, &chicago(), &peers, now),
            RecommendationDecision::Recommend(1)
        );
    }

    #[test]
    fn test_eligibility_is_strict() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();

        let at_ceiling = vec![peer(1, 40.7128, -74.0060, 0.70, now)];
        assert_eq!(
            selector.decide(1.0, &chicago(), &at_ceiling, now),
            RecommendationDecision::Serve
        );

        let below = vec![peer(1, 40.7128, -74.0060, 0.699, now)];
        assert_eq!(
            selector.decide(1.0, &chicago(), &below, now),
            RecommendationDecision::Recommend(1)
        );
    }

    #[test]
    fn test_prefers_nearby_peer() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();
        let peers = vec![
            peer(1, 40.7128, -74.0060, 0.1, now),   // New York
            peer(3, 34.0522, -118.2437, 0.0, now),  // Los Angeles
            peer(4, 29.7604, -95.3698, 0.2, now),   // Houston
        ];

        let ranked = selector.rank(1.0, &chicago(), &peers, now);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].edge_id, 1);
        let expected = chicago().distance_km(&peers[1].descriptor.location);
        assert!((ranked[2].distance_km - expected).abs() < 1e-9);
        assert_eq!(ranked[2].edge_id, 3);
    }

    #[test]
    fn test_stale_and_missing_samples_excluded() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();
        let old = now - chrono::Duration::seconds(10);

        let peers = vec![
            peer(1, 40.7128, -74.0060, 0.0, old),
            PeerState::new(EdgeDescriptor::new(2, "fresh", GeoLocation::new(29.7604, -95.3698))),
        ];
        assert!(selector.rank(1.0, &chicago(), &peers, now).is_empty());
        assert_eq!(
            selector.decide(1.0, &chicago(), &peers, now),
            RecommendationDecision::Serve
        );
    }

    #[test]
    fn test_ties_break_on_lower_id() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();
        let here = GeoLocation::new(41.0, -87.0);
        let peers = vec![
            peer(9, 41.0, -87.0, 0.2, now),
            peer(5, 41.0, -87.0, 0.2, now),
        ];

        assert_eq!(
            selector.decide(0.9, &here, &peers, now),
            RecommendationDecision::Recommend(5)
        );
    }

    #[test]
    fn test_decision_is_deterministic() {
        let selector = NodeSelector::new(RoutingConfig::default());
        let now = Utc::now();
        let peers = vec![
            peer(1, 40.7128, -74.0060, 0.3, now),
            peer(4, 29.7604, -95.3698, 0.1, now),
        ];

        let first = selector.decide(0.95, &chicago(), &peers, now);
        for _ in 0..10 {
            assert_eq!(selector.decide(0.95, &chicago(), &peers, now), first);
        }
    }

    #[test]
    fn test_peer_table_record() {
        let mut table = PeerTable::new();
        table.register(EdgeDescriptor::new(1, "a", GeoLocation::new(0.0, 0.0)));

        let now = Utc::now();
        let sample = |load| LoadSample {
            edge_id: 1,
            load,
            active_requests: 1,
            timestamp: now,
        };

        assert!(table.record(sample(0.5)));
        assert!(table.record(sample(0.2)));
        assert_eq!(table.get(1).and_then(|p| p.sample.as_ref()).map(|s| s.load), Some(0.2));

        assert!(!table.record(LoadSample {
            edge_id: 42,
            ..sample(0.1)
        }));
        assert_eq!(table.len(), 1);

        let snapshot = table.snapshot();
        table.record(sample(0.9));
        assert_eq!(snapshot[0].sample.as_ref().map(|s| s.load), Some(0.2));
    }

    #[test]
    fn test_stale_window_is_configurable() {
        let config = RoutingConfig {
            stale_after: Duration::from_secs(30),
            ..Default::default()
        };
        let selector = NodeSelector::new(config);
        let now = Utc::now();
        let peers = vec![peer(1, 40.7128, -74.0060, 0.0, now - chrono::Duration::seconds(10))];

        assert_eq!(
            selector.decide(1.0, &chicago(), &peers, now),
            RecommendationDecision::Recommend(1)
        );
    }
}
