//! Origin server: the authoritative content catalog and edge directory.
//!
//! Edges fetch misses through the [`ContentSource`] trait so tests can put a
//! failing or slow origin behind an edge. Users ask the origin once, at the
//! start of a session, which edge is nearest to them.

use crate::config::OriginConfig;
use crate::error::{CdnError, Result};
use crate::geo::{DistanceModel, GeoLocation, LinkProfile, NetworkDelay};
use crate::types::{ContentId, ContentItem, EdgeDescriptor, Payload};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Content returned by an origin fetch.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub item: ContentItem,
    /// Simulated edge-to-origin transfer delay.
    pub delay: NetworkDelay,
}

/// Where edges fetch content they do not hold.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one item on behalf of an edge located at `requester`.
    async fn fetch_content(&self, id: ContentId, requester: GeoLocation) -> Result<FetchedContent>;
}

/// The origin server.
pub struct OriginRegistry {
    location: GeoLocation,
    catalog: HashMap<ContentId, ContentItem>,
    edges: RwLock<Vec<EdgeDescriptor>>,
    distance: DistanceModel,
    rng: Mutex<StdRng>,
    time_scale: f64,
    fetches: AtomicU64,
}

impl OriginRegistry {
    /// Builds the origin and its catalog.
    ///
    /// Item sizes are drawn uniformly from the configured range using `seed`,
    /// so two origins built with the same seed hold identical catalogs.
    pub fn new(config: &OriginConfig, seed: u64, time_scale: f64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let catalog = (0..config.content_count)
            .map(|id| {
                let size = rng.gen_range(config.min_content_size..=config.max_content_size);
                let mut bytes = vec![0u8; size];
                rng.fill(bytes.as_mut_slice());
                (id, ContentItem::new(id, Payload::from(bytes)))
            })
            .collect::<HashMap<_, _>>();

        info!(
            items = catalog.len(),
            location = %config.location,
            "Origin catalog generated"
        );

        Self {
            location: config.location,
            catalog,
            edges: RwLock::new(Vec::new()),
            distance: DistanceModel::default(),
            rng: Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(1))),
            time_scale,
            fetches: AtomicU64::new(0),
        }
    }

    /// Gets the origin location
    pub fn location(&self) -> GeoLocation {
        self.location
    }

    /// Registers an edge for discovery; re-registering replaces the entry
    pub fn register_edge(&self, descriptor: EdgeDescriptor) {
        let mut edges = self.edges.write();
        edges.retain(|e| e.id != descriptor.id);
        debug!(edge = %descriptor, "Edge registered with origin");
        edges.push(descriptor);
    }

    /// Gets all registered edges
    pub fn edges(&self) -> Vec<EdgeDescriptor> {
        self.edges.read().clone()
    }

    /// Finds the edge nearest to a user; equal distances pick the lower id.
    pub fn discover_edge(&self, location: &GeoLocation) -> Result<EdgeDescriptor> {
        self.edges
            .read()
            .iter()
            .min_by(|a, b| {
                location
                    .distance_km(&a.location)
                    .total_cmp(&location.distance_km(&b.location))
                    .then(a.id.cmp(&b.id))
            })
            .cloned()
            .ok_or(CdnError::NoEdges)
    }

    /// Looks up an item without simulating transfer
    pub fn get(&self, id: ContentId) -> Option<&ContentItem> {
        self.catalog.get(&id)
    }

    /// Number of items in the catalog
    pub fn content_count(&self) -> usize {
        self.catalog.len()
    }

    /// Fetches served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Delay a user at `location` would see fetching straight from the origin.
    pub fn direct_delay(&self, location: &GeoLocation) -> NetworkDelay {
        self.distance
            .estimate(location, &self.location, LinkProfile::UserToOrigin)
    }
}

#[async_trait]
impl ContentSource for OriginRegistry {
    async fn fetch_content(&self, id: ContentId, requester: GeoLocation) -> Result<FetchedContent> {
        let item = self
            .catalog
            .get(&id)
            .cloned()
            .ok_or(CdnError::ContentNotFound(id))?;

        let delay = {
            let mut rng = self.rng.lock();
            self.distance
                .sample(&requester, &self.location, LinkProfile::EdgeToOrigin, &mut *rng)
        };

        if self.time_scale > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay.total_secs() * self.time_scale)).await;
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(content_id = id, size = item.size(), "Origin served content");

        Ok(FetchedContent { item, delay })
    }
}
