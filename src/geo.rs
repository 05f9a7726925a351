//! Geographic distance and simulated network delay.
//!
//! The delay model is a pure function of two coordinates and a link profile:
//! fiber propagation, a router cost per estimated hop, a base latency and a
//! symmetric jitter. Randomness is supplied by the caller so the model holds
//! no mutable state and can be shared freely between concurrent requests.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Speed of light in vacuum, km/s.
const SPEED_OF_LIGHT_KM_PER_SEC: f64 = 299_792.0;

/// Refractive index of optical fiber.
const FIBER_REFRACTIVE_INDEX: f64 = 1.47;

/// Geographic location (latitude, longitude in degrees).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in degrees (-90 to 90)
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180)
    pub longitude: f64,
}

impl GeoLocation {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance to another point in kilometers.
    pub fn distance_km(&self, other: &GeoLocation) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }

    /// Check if coordinates are in range.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

/// Kind of link a request travels over.
///
/// Edge-to-origin links ride an optimized backbone: half the router cost and
/// a sub-millisecond base latency. Users reaching the origin directly pay a
/// millisecond-scale access latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkProfile {
    /// User to edge node.
    UserToEdge,
    /// Edge node to origin.
    EdgeToOrigin,
    /// User straight to origin.
    UserToOrigin,
}

impl LinkProfile {
    fn router_factor(self) -> f64 {
        match self {
            LinkProfile::EdgeToOrigin => 0.5,
            LinkProfile::UserToEdge | LinkProfile::UserToOrigin => 1.0,
        }
    }

    /// Base latency bounds in seconds.
    fn base_latency(self) -> (f64, f64) {
        match self {
            LinkProfile::UserToEdge | LinkProfile::EdgeToOrigin => (0.0001, 0.0002),
            LinkProfile::UserToOrigin => (0.001, 0.002),
        }
    }

    /// Jitter half-width in seconds.
    fn jitter(self) -> f64 {
        match self {
            LinkProfile::UserToEdge | LinkProfile::EdgeToOrigin => 0.00005,
            LinkProfile::UserToOrigin => 0.0005,
        }
    }
}

/// One simulated traversal of a link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkDelay {
    /// Great-circle distance in kilometers.
    pub distance_km: f64,
    /// Estimated router hops.
    pub hops: u32,
    /// Fiber propagation delay, seconds.
    pub propagation_secs: f64,
    /// Router delay across all hops, seconds.
    pub routing_secs: f64,
    /// Base access latency, seconds.
    pub base_secs: f64,
    /// Signed jitter, seconds.
    pub jitter_secs: f64,
}

impl NetworkDelay {
    /// Total one-way delay in seconds (never negative).
    pub fn total_secs(&self) -> f64 {
        (self.propagation_secs + self.routing_secs + self.base_secs + self.jitter_secs).max(0.0)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_secs())
    }
}

/// Distance and delay model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceModel {
    /// Signal speed in fiber, km/s.
    pub fiber_speed_km_per_sec: f64,
    /// Delay added by each router hop, seconds.
    pub router_delay_secs: f64,
    /// Router hops per 1000 km of distance.
    pub hops_per_1000_km: f64,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            fiber_speed_km_per_sec: SPEED_OF_LIGHT_KM_PER_SEC / FIBER_REFRACTIVE_INDEX,
            router_delay_secs: 0.0001,
            hops_per_1000_km: 2.0,
        }
    }
}

impl DistanceModel {
    /// Estimated router hops for a distance; at least one.
    pub fn hops(&self, distance_km: f64) -> u32 {
        let hops = (distance_km * self.hops_per_1000_km / 1000.0).floor();
        (hops as u32).max(1)
    }

    /// Fiber propagation delay in seconds.
    pub fn propagation_secs(&self, distance_km: f64) -> f64 {
        distance_km / self.fiber_speed_km_per_sec
    }

    /// Deterministic part of the delay: distance, hops, propagation and routing,
    /// with base latency at its midpoint and no jitter.
    pub fn estimate(
        &self,
        from: &GeoLocation,
        to: &GeoLocation,
        profile: LinkProfile,
    ) -> NetworkDelay {
        let distance_km = from.distance_km(to);
        let hops = self.hops(distance_km);
        let (base_lo, base_hi) = profile.base_latency();

        NetworkDelay {
            distance_km,
            hops,
            propagation_secs: self.propagation_secs(distance_km),
            routing_secs: hops as f64 * self.router_delay_secs * profile.router_factor(),
            base_secs: (base_lo + base_hi) / 2.0,
            jitter_secs: 0.0,
        }
    }

    /// Sample a full delay including random base latency and jitter.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        from: &GeoLocation,
        to: &GeoLocation,
        profile: LinkProfile,
        rng: &mut R,
    ) -> NetworkDelay {
        let (base_lo, base_hi) = profile.base_latency();
        let jitter = profile.jitter();

        NetworkDelay {
            base_secs: rng.gen_range(base_lo..base_hi),
            jitter_secs: rng.gen_range(-jitter..jitter),
            ..self.estimate(from, to, profile)
        }
    }
}
