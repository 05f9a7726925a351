//! Simulated users.
//!
//! A session discovers its nearest edge through the origin, then issues a
//! fixed number of requests drawn from a popularity profile. Recommendations
//! are followed with an explicit hop counter carried in the request. Once the
//! user has followed `max_hops` of them the request is sent as forced, so a
//! logical request touches at most `max_hops + 1` edges and is served by the
//! last one.

use crate::config::humantime_serde;
use crate::edge::{ContentRequest, EdgeNode, EdgeResponse};
use crate::error::{CdnError, Result};
use crate::geo::{DistanceModel, GeoLocation, LinkProfile};
use crate::origin::OriginRegistry;
use crate::shutdown::{ShutdownAware, ShutdownCoordinator};
use crate::types::{ContentId, EdgeId, UserId};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Edges reachable by users, by id.
pub type EdgeDirectory = HashMap<EdgeId, Arc<EdgeNode>>;

/// Which content a user tends to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopularityProfile {
    /// 60% from the first tenth of the catalog, 30% from the next fifth,
    /// 10% from the rest.
    Standard,
    /// 70% from the last fifth of the catalog, 30% from the rest.
    HotSet,
}

impl PopularityProfile {
    /// Draws a content id from a catalog of `catalog_size` items.
    pub fn pick<R: Rng + ?Sized>(&self, catalog_size: u64, rng: &mut R) -> ContentId {
        if catalog_size == 0 {
            return 0;
        }
        let at = |share: u64| catalog_size * share / 10;
        let roll: f64 = rng.gen();

        let band = match self {
            PopularityProfile::Standard => {
                if roll < 0.6 {
                    0..at(1)
                } else if roll < 0.9 {
                    at(1)..at(3)
                } else {
                    at(3)..catalog_size
                }
            }
            PopularityProfile::HotSet => {
                if roll < 0.7 {
                    at(8)..catalog_size
                } else {
                    0..at(8)
                }
            }
        };

        rng.gen_range(non_empty(band, catalog_size))
    }
}

fn non_empty(band: Range<u64>, catalog_size: u64) -> Range<u64> {
    if band.is_empty() {
        0..catalog_size
    } else {
        band
    }
}

/// Pause between consecutive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTime {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// A simulated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub city: String,
    pub location: GeoLocation,
    /// Logical requests issued per session
    pub request_count: u32,
    pub popularity: PopularityProfile,
    pub think_time: ThinkTime,
}

/// Terminal state of a logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Served,
    Failed,
}

/// One logical request, from the first edge contacted to its terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub user_id: UserId,
    pub city: String,
    pub content_id: ContentId,
    pub outcome: Outcome,
    pub cache_hit: bool,
    pub served_by: Option<EdgeId>,
    /// Edges contacted, in order
    pub path: Vec<EdgeId>,
    pub recommendations: u32,
    /// Simulated end-to-end latency, milliseconds
    pub latency_ms: f64,
    /// Part of `latency_ms` caused by load at the serving edge
    pub load_delay_ms: f64,
    /// Simulated latency of fetching straight from the origin, milliseconds
    pub origin_baseline_ms: f64,
    /// Distance from the user to the last edge contacted
    pub distance_to_edge_km: f64,
    /// Distance from the user to the origin
    pub distance_to_origin_km: f64,
    /// Real time spent handling the request, milliseconds
    pub wall_ms: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RequestRecord {
    pub fn is_served(&self) -> bool {
        self.outcome == Outcome::Served
    }
}

/// Runs one user's requests against the edge network.
pub struct UserSession {
    profile: UserProfile,
    origin: Arc<OriginRegistry>,
    edges: Arc<EdgeDirectory>,
    max_hops: u32,
    time_scale: f64,
    distance: DistanceModel,
    rng: StdRng,
    shutdown: ShutdownCoordinator,
}

impl UserSession {
    pub fn new(
        profile: UserProfile,
        origin: Arc<OriginRegistry>,
        edges: Arc<EdgeDirectory>,
        max_hops: u32,
        seed: u64,
    ) -> Self {
        Self {
            profile,
            origin,
            edges,
            max_hops,
            time_scale: 0.0,
            distance: DistanceModel::default(),
            rng: StdRng::seed_from_u64(seed),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Scales think time; 0 issues requests back to back.
    pub fn with_time_scale(mut self, time_scale: f64) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Stops the session early when `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Runs the whole session.
    ///
    /// Fails only if no edge can be discovered; individual request failures
    /// are reported in their records.
    pub async fn run(mut self) -> Result<Vec<RequestRecord>> {
        let home = self.origin.discover_edge(&self.profile.location)?;
        info!(
            user_id = self.profile.id,
            city = %self.profile.city,
            edge = %home,
            distance_km = self.profile.location.distance_km(&home.location).round(),
            "Session started"
        );

        let catalog_size = self.origin.content_count() as u64;
        let mut records = Vec::with_capacity(self.profile.request_count as usize);

        for i in 0..self.profile.request_count {
            if self.shutdown.is_shutting_down() {
                break;
            }

            let content_id = self.profile.popularity.pick(catalog_size, &mut self.rng);
            records.push(self.request(content_id, home.id).await);

            if i + 1 < self.profile.request_count && self.time_scale > 0.0 {
                let pause = self.profile.think_time.sample(&mut self.rng).mul_f64(self.time_scale);
                if tokio::time::sleep(pause).with_shutdown(&self.shutdown).await.is_none() {
                    break;
                }
            }
        }

        let served = records.iter().filter(|r| r.is_served()).count();
        info!(
            user_id = self.profile.id,
            requests = records.len(),
            served,
            "Session finished"
        );
        Ok(records)
    }

    /// Issues one logical request starting at `start`, following
    /// recommendations until some edge serves or fails.
    pub async fn request(&mut self, content_id: ContentId, start: EdgeId) -> RequestRecord {
        let started = Instant::now();
        let timestamp = Utc::now();
        let location = self.profile.location;
        let mut request = ContentRequest::new(content_id, location);
        let mut edge_id = start;
        let mut path = Vec::new();
        let mut overhead_secs = 0.0;
        let mut distance_to_edge_km = 0.0;

        let result = loop {
            path.push(edge_id);
            let Some(edge) = self.edges.get(&edge_id) else {
                break Err(CdnError::EdgeNotFound(edge_id));
            };
            distance_to_edge_km = location.distance_km(&edge.descriptor().location);

            if request.recommendations >= self.max_hops {
                request = request.forced();
            }

            match edge.handle(request).await {
                EdgeResponse::Content(content) => break Ok(content),
                EdgeResponse::Error(e) => break Err(e),
                EdgeResponse::RecommendedEdge(rec) => {
                    // The redirect itself costs a round trip to the recommending edge
                    let redirect = self.distance.estimate(
                        &location,
                        &edge.descriptor().location,
                        LinkProfile::UserToEdge,
                    );
                    overhead_secs += 2.0 * redirect.total_secs();

                    if request.force {
                        warn!(edge_id, "Edge recommended a forced request");
                        break Err(CdnError::Internal(format!(
                            "edge {} redirected past the recommendation limit of {}",
                            edge_id, self.max_hops
                        )));
                    }

                    debug!(
                        user_id = self.profile.id,
                        from = edge_id,
                        to = rec.edge.id,
                        own_load = rec.own_load,
                        peer_load = rec.peer_load,
                        "Following recommendation"
                    );
                    request = request.next_hop();
                    edge_id = rec.edge.id;
                }
            }
        };

        let origin_baseline_ms = self.origin.direct_delay(&location).total_secs() * 1000.0;
        let distance_to_origin_km = location.distance_km(&self.origin.location());
        let wall_ms = started.elapsed().as_secs_f64() * 1000.0;

        let record = match result {
            Ok(content) => RequestRecord {
                user_id: self.profile.id,
                city: self.profile.city.clone(),
                content_id,
                outcome: Outcome::Served,
                cache_hit: content.cache_hit,
                served_by: Some(content.served_by),
                path,
                recommendations: request.recommendations,
                latency_ms: (content.latency_secs() + overhead_secs) * 1000.0,
                load_delay_ms: content.load_delay_secs * 1000.0,
                origin_baseline_ms,
                distance_to_edge_km,
                distance_to_origin_km,
                wall_ms,
                error: None,
                timestamp,
            },
            Err(e) => RequestRecord {
                user_id: self.profile.id,
                city: self.profile.city.clone(),
                content_id,
                outcome: Outcome::Failed,
                cache_hit: false,
                served_by: None,
                path,
                recommendations: request.recommendations,
                latency_ms: overhead_secs * 1000.0,
                load_delay_ms: 0.0,
                origin_baseline_ms,
                distance_to_edge_km,
                distance_to_origin_km,
                wall_ms,
                error: Some(e.to_string()),
                timestamp,
            },
        };

        debug!(
            user_id = record.user_id,
            content_id,
            outcome = ?record.outcome,
            served_by = ?record.served_by,
            hops = record.recommendations,
            latency_ms = record.latency_ms,
            "Request finished"
        );
        record
    }
}
