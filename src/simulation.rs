//! Wiring of a complete run: origin, edges, broadcasters and users.

use crate::config::CdnConfig;
use crate::edge::{EdgeConfig, EdgeNode, LoadBroadcaster, LoadReportSink};
use crate::error::{CdnError, Result};
use crate::origin::{ContentSource, OriginRegistry};
use crate::report::RunReport;
use crate::session::{EdgeDirectory, UserSession};
use crate::shutdown::ShutdownCoordinator;
use crate::types::EdgeId;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A fully wired edge network ready to run.
pub struct Simulation {
    config: CdnConfig,
    origin: Arc<OriginRegistry>,
    edges: Arc<EdgeDirectory>,
    shutdown: ShutdownCoordinator,
}

impl Simulation {
    /// Builds the origin and one node per configured edge, each knowing
    /// every other edge as a peer.
    pub fn build(config: CdnConfig) -> Result<Self> {
        config.validate()?;

        let seed = config.simulation.seed;
        let time_scale = config.simulation.time_scale;
        let origin = Arc::new(OriginRegistry::new(&config.origin, seed, time_scale));
        let source: Arc<dyn ContentSource> = origin.clone();

        let mut edges = EdgeDirectory::new();
        for descriptor in &config.edges {
            origin.register_edge(descriptor.clone());

            let edge_config = EdgeConfig {
                descriptor: descriptor.clone(),
                cache_capacity: config.cache.capacity,
                load: config.load.clone(),
                routing: config.routing.clone(),
                fetch_timeout: config.origin.fetch_timeout,
                time_scale,
                seed: seed.wrapping_add(1_000 + descriptor.id),
            };
            let node = Arc::new(EdgeNode::new(edge_config, source.clone()));

            for peer in config.edges.iter().filter(|p| p.id != descriptor.id) {
                node.register_peer(peer.clone());
            }
            edges.insert(descriptor.id, node);
        }

        info!(
            edges = edges.len(),
            users = config.simulation.users.len(),
            catalog = origin.content_count(),
            "Simulation built"
        );

        Ok(Self {
            config,
            origin,
            edges: Arc::new(edges),
            shutdown: ShutdownCoordinator::new(),
        })
    }

    /// Gets the origin
    pub fn origin(&self) -> &Arc<OriginRegistry> {
        &self.origin
    }

    /// Gets an edge by id
    pub fn edge(&self, id: EdgeId) -> Option<&Arc<EdgeNode>> {
        self.edges.get(&id)
    }

    /// Gets the shutdown coordinator shared by all tasks of the run
    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    fn broadcasters(&self) -> Vec<LoadBroadcaster> {
        self.edges
            .values()
            .map(|node| {
                let mut broadcaster = LoadBroadcaster::new(
                    node.clone(),
                    self.config.load.broadcast_interval,
                    self.config.load.broadcast_initial_delay,
                );
                for peer in self.edges.values().filter(|p| p.id() != node.id()) {
                    broadcaster.add_peer(peer.clone() as Arc<dyn LoadReportSink>);
                }
                broadcaster
            })
            .collect()
    }

    /// Runs every user session concurrently and collects the results.
    ///
    /// Peers receive one round of load reports before the first request so
    /// that early overload can already be redirected.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();

        let broadcasters = self.broadcasters();
        for broadcaster in &broadcasters {
            broadcaster.broadcast_once();
        }
        let broadcast_handles: Vec<_> = broadcasters
            .into_iter()
            .map(|b| b.spawn(self.shutdown.clone()))
            .collect();

        let mut sessions = JoinSet::new();
        for (index, profile) in self.config.simulation.users.iter().enumerate() {
            let session = UserSession::new(
                profile.clone(),
                self.origin.clone(),
                self.edges.clone(),
                self.config.routing.max_recommendation_hops,
                self.config.simulation.seed.wrapping_add(10_000 + index as u64),
            )
            .with_time_scale(self.config.simulation.time_scale)
            .with_shutdown(self.shutdown.clone());
            sessions.spawn(session.run());
        }

        let mut records = Vec::new();
        let mut first_error = None;
        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(Ok(mut session_records)) => records.append(&mut session_records),
                Ok(Err(e)) => {
                    error!(error = %e, "Session failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Session task panicked");
                    first_error.get_or_insert(CdnError::Internal(e.to_string()));
                }
            }
        }

        self.shutdown.shutdown();
        let drain = join_broadcasters(broadcast_handles);
        if tokio::time::timeout(self.shutdown.timeout(), drain).await.is_err() {
            warn!("Load broadcasters did not stop in time");
        }

        if records.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.user_id.cmp(&b.user_id)));

        let mut edges: Vec<_> = self.edges.values().map(|e| e.stats()).collect();
        edges.sort_by_key(|s| s.edge_id);

        let report = RunReport::new(records, edges, started.elapsed());
        let summary = report.summary();
        info!(
            requests = summary.requests,
            served = summary.served,
            failed = summary.failed,
            hit_ratio = summary.hit_ratio,
            recommendations = summary.recommendations,
            "Simulation finished"
        );
        Ok(report)
    }
}

async fn join_broadcasters(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}
