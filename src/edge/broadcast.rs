// Load Broadcasting
//
// Each edge periodically pushes its load sample to every peer. Delivery is
// one-way and unacknowledged; a peer that misses reports simply ages them
// out through the selector's stale window.

use super::load::LoadSample;
use super::node::EdgeNode;
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Receiver of load reports
pub trait LoadReportSink: Send + Sync {
    /// Delivers one report; returns whether it was accepted
    fn deliver(&self, sample: LoadSample) -> bool;
}

impl LoadReportSink for EdgeNode {
    fn deliver(&self, sample: LoadSample) -> bool {
        self.receive_load_report(sample)
    }
}

/// Periodic load broadcaster for one edge
pub struct LoadBroadcaster {
    node: Arc<EdgeNode>,
    peers: Vec<Arc<dyn LoadReportSink>>,
    interval: Duration,
    initial_delay: Duration,
}

impl LoadBroadcaster {
    /// Creates a broadcaster for `node`
    pub fn new(node: Arc<EdgeNode>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            node,
            peers: Vec::new(),
            interval,
            initial_delay,
        }
    }

    /// Adds a peer to report to
    pub fn add_peer(&mut self, peer: Arc<dyn LoadReportSink>) {
        self.peers.push(peer);
    }

    /// Number of peers reported to
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Sends one sample to every peer; returns how many accepted it
    pub fn broadcast_once(&self) -> usize {
        let sample = self.node.load_sample();
        let accepted = self
            .peers
            .iter()
            .filter(|peer| peer.deliver(sample.clone()))
            .count();

        debug!(
            edge_id = sample.edge_id,
            load = sample.load,
            active = sample.active_requests,
            accepted,
            "Load broadcast"
        );
        accepted
    }

    /// Broadcasts every interval until shutdown
    pub async fn run(self, shutdown: ShutdownCoordinator) {
        tokio::select! {
            _ = tokio::time::sleep(self.initial_delay) => {}
            _ = shutdown.wait_for_shutdown() => return,
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.broadcast_once();
                }
                _ = shutdown.wait_for_shutdown() => {
                    info!(edge_id = self.node.id(), "Load broadcaster stopped");
                    break;
                }
            }
        }
    }

    /// Spawns the broadcast loop
    pub fn spawn(self, shutdown: ShutdownCoordinator) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
