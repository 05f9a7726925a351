//! Configuration for the edge CDN.
//!
//! Every tunable of the cache and routing core lives here, together with the
//! topology (edges, origin) and the simulated user population. The reference
//! values reproduce a four-edge continental deployment: New York, Chicago,
//! Los Angeles and Houston, with the origin in Ashburn, VA.

use crate::error::{CdnError, Result};
use crate::geo::GeoLocation;
use crate::session::{PopularityProfile, ThinkTime, UserProfile};
use crate::types::EdgeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// Edge nodes in the deployment.
    pub edges: Vec<EdgeDescriptor>,
    /// Per-edge cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Load tracking and broadcast configuration.
    #[serde(default)]
    pub load: LoadConfig,
    /// Node selection configuration.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Origin configuration.
    #[serde(default)]
    pub origin: OriginConfig,
    /// Simulated users and run parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl CdnConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CdnError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| CdnError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.edges.is_empty() {
            return Err(invalid("edges", "at least one edge is required"));
        }

        let mut ids = HashSet::new();
        for edge in &self.edges {
            if !ids.insert(edge.id) {
                return Err(invalid("edges", &format!("duplicate edge id {}", edge.id)));
            }
            if !edge.location.is_valid() {
                return Err(invalid(
                    "edges",
                    &format!("edge {} has out-of-range coordinates", edge.id),
                ));
            }
        }

        if self.cache.capacity == 0 {
            return Err(invalid("cache.capacity", "capacity must be non-zero"));
        }

        if self.load.saturation == 0 {
            return Err(invalid("load.saturation", "saturation must be non-zero"));
        }
        if self.load.soft_threshold >= self.load.saturation {
            return Err(invalid(
                "load.soft_threshold",
                "soft threshold must be below the saturation point",
            ));
        }
        if self.load.broadcast_interval.is_zero() {
            return Err(invalid("load.broadcast_interval", "interval must be non-zero"));
        }

        let unit = 0.0..=1.0;
        for (field, value) in [
            ("routing.overload_threshold", self.routing.overload_threshold),
            ("routing.relative_load_factor", self.routing.relative_load_factor),
            ("routing.load_weight", self.routing.load_weight),
            ("routing.distance_weight", self.routing.distance_weight),
        ] {
            if !unit.contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }
        if self.routing.stale_after < self.load.broadcast_interval {
            return Err(invalid(
                "routing.stale_after",
                "stale window must be at least one broadcast interval",
            ));
        }

        if self.origin.content_count == 0 {
            return Err(invalid("origin.content_count", "catalog must not be empty"));
        }
        if self.origin.min_content_size > self.origin.max_content_size {
            return Err(invalid(
                "origin.min_content_size",
                "minimum size exceeds maximum size",
            ));
        }

        if self.simulation.time_scale < 0.0 {
            return Err(invalid("simulation.time_scale", "must not be negative"));
        }

        Ok(())
    }

    /// The reference deployment: four US edges, 12 users, Chicago hot spot.
    pub fn reference() -> Self {
        Self {
            edges: vec![
                EdgeDescriptor::new(1, "New York, NY", GeoLocation::new(40.7128, -74.0060)),
                EdgeDescriptor::new(2, "Chicago, IL", GeoLocation::new(41.8781, -87.6298)),
                EdgeDescriptor::new(3, "Los Angeles, CA", GeoLocation::new(34.0522, -118.2437)),
                EdgeDescriptor::new(4, "Houston, TX", GeoLocation::new(29.7604, -95.3698)),
            ],
            cache: CacheConfig::default(),
            load: LoadConfig::default(),
            routing: RoutingConfig::default(),
            origin: OriginConfig::default(),
            simulation: SimulationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// A small, fast configuration for local runs and tests: no simulated
    /// sleeping, one user per edge region.
    pub fn development() -> Self {
        let mut config = Self::reference();
        config.simulation.time_scale = 0.0;
        config.simulation.users = reference_users()
            .into_iter()
            .filter(|u| [1, 7, 9, 11].contains(&u.id))
            .map(|mut u| {
                u.request_count = 10;
                u
            })
            .collect();
        config.observability.log_level = "debug".to_string();
        config
    }
}

fn invalid(field: &str, reason: &str) -> CdnError {
    CdnError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Per-edge cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum resident items per edge (C).
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

/// Load tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// In-flight requests at which the score reaches 0.25.
    pub soft_threshold: usize,
    /// In-flight requests at which the score saturates at 1.0 (`L_max`).
    pub saturation: usize,
    /// Period between load broadcasts.
    #[serde(with = "humantime_serde")]
    pub broadcast_interval: Duration,
    /// Delay before the first broadcast.
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub broadcast_initial_delay: Duration,
}

fn default_initial_delay() -> Duration {
    Duration::ZERO
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            soft_threshold: 3,
            saturation: 8,
            broadcast_interval: Duration::from_secs(2),
            broadcast_initial_delay: default_initial_delay(),
        }
    }
}

/// Node selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Own load above which peers are considered.
    pub overload_threshold: f64,
    /// A peer is eligible only below `own_load * relative_load_factor`.
    pub relative_load_factor: f64,
    /// Weight of the peer's load in the composite score.
    pub load_weight: f64,
    /// Weight of the normalized distance in the composite score.
    pub distance_weight: f64,
    /// Samples older than this are ignored.
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
    /// Recommendations a user follows before accepting service anywhere.
    pub max_recommendation_hops: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 0.70,
            relative_load_factor: 0.70,
            load_weight: 0.30,
            distance_weight: 0.70,
            stale_after: Duration::from_secs(4),
            max_recommendation_hops: 2,
        }
    }
}

/// Origin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Origin location.
    pub location: GeoLocation,
    /// Number of items in the catalog; ids are `0..content_count`.
    pub content_count: u64,
    /// Smallest generated payload, bytes.
    pub min_content_size: usize,
    /// Largest generated payload, bytes.
    pub max_content_size: usize,
    /// Fetch timeout seen by edges.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            location: GeoLocation::new(39.8283, -77.6115),
            content_count: 100,
            min_content_size: 1_000,
            max_content_size: 100_000,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Simulation run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for every random source in the run.
    pub seed: u64,
    /// Multiplier applied to simulated delays before sleeping; 0 disables sleeping.
    pub time_scale: f64,
    /// Simulated users.
    pub users: Vec<UserProfile>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            time_scale: 1.0,
            users: reference_users(),
        }
    }
}

fn reference_users() -> Vec<UserProfile> {
    let hot = |id, city: &str, lat, lon| UserProfile {
        id,
        city: city.to_string(),
        location: GeoLocation::new(lat, lon),
        request_count: 30,
        popularity: PopularityProfile::HotSet,
        think_time: ThinkTime::new(Duration::from_millis(50), Duration::from_millis(200)),
    };
    let standard = |id, city: &str, lat, lon| UserProfile {
        id,
        city: city.to_string(),
        location: GeoLocation::new(lat, lon),
        request_count: 20,
        popularity: PopularityProfile::Standard,
        think_time: ThinkTime::new(Duration::from_millis(100), Duration::from_millis(1000)),
    };

    vec![
        hot(1, "Chicago Downtown", 41.8781, -87.6298),
        hot(2, "Chicago North", 42.0451, -87.6877),
        hot(3, "Chicago West", 41.8825, -87.9089),
        hot(4, "Chicago South", 41.7275, -87.6533),
        hot(5, "Chicago East", 41.8936, -87.6224),
        hot(6, "Chicago Suburb", 42.0334, -87.7825),
        standard(7, "Manhattan", 40.7128, -74.0060),
        standard(8, "Newark", 40.7357, -74.1724),
        standard(9, "LA Downtown", 34.0522, -118.2437),
        standard(10, "Santa Monica", 34.0195, -118.4912),
        standard(11, "Houston Downtown", 29.7604, -95.3698),
        standard(12, "The Woodlands", 30.1658, -95.4613),
    ]
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using humantime format.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(s_val) = s.strip_suffix('s') {
            s_val
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_config() {
        let config = CdnConfig::reference();
        assert_eq!(config.edges.len(), 4);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.load.soft_threshold, 3);
        assert_eq!(config.load.saturation, 8);
        assert_eq!(config.load.broadcast_interval, Duration::from_secs(2));
        assert_eq!(config.routing.overload_threshold, 0.70);
        assert_eq!(config.routing.relative_load_factor, 0.70);
        assert_eq!(config.routing.stale_after, Duration::from_secs(4));
        assert_eq!(config.routing.max_recommendation_hops, 2);
        assert_eq!(config.simulation.users.len(), 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = CdnConfig::development();
        assert_eq!(config.simulation.time_scale, 0.0);
        assert_eq!(config.simulation.users.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = CdnConfig::reference();
        config.cache.capacity = 0;
        match config.validate() {
            Err(CdnError::InvalidConfig { field, .. }) => assert_eq!(field, "cache.capacity"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_edges() {
        let mut config = CdnConfig::reference();
        config.edges[1].id = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = CdnConfig::reference();
        config.routing.overload_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = CdnConfig::reference();
        config.load.soft_threshold = 8;
        assert!(config.validate().is_err());

        let mut config = CdnConfig::reference();
        config.routing.stale_after = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip_with_defaults() {
        let json = r#"{
            "edges": [
                { "id": 1, "name": "a", "location": { "latitude": 40.0, "longitude": -74.0 } }
            ],
            "load": { "soft_threshold": 2, "saturation": 6, "broadcast_interval": "500ms" }
        }"#;
        let config: CdnConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.load.broadcast_interval, Duration::from_millis(500));
        assert_eq!(config.load.broadcast_initial_delay, Duration::ZERO);
        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.routing.max_recommendation_hops, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("4s").unwrap(), Duration::from_secs(4));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("75").unwrap(), Duration::from_millis(75));
        assert!(parse_duration("soon").is_err());
    }
}
