//! Edge CDN core - adaptive replacement caching and load-aware edge selection.
//!
//! A set of geographically distributed edge nodes serves content on behalf of
//! a single origin. Each edge keeps an Adaptive Replacement Cache and tracks
//! its own load. When an edge is overloaded it does not serve; it points the
//! user at a less loaded peer, chosen from periodically broadcast load reports
//! by a weighted score of load and distance.
//!
//! # Features
//!
//! - **ARC caching**: recency and frequency lists with ghost-driven adaptation.
//! - **Load tracking**: in-flight requests mapped to a normalized score.
//! - **Node selection**: deterministic serve-or-recommend decisions.
//! - **Bounded redirects**: users follow at most a fixed number of
//!   recommendations before any edge must serve them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Users: sessions, popularity profiles, hop counting         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Edges: node selector | load tracker | ARC cache            │
//! │         ◄──── periodic load broadcast between peers ────►   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Origin: content catalog | edge discovery                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use cdn_edge::config::CdnConfig;
//!
//! #[tokio::main]
//! async fn main() -> cdn_edge::Result<()> {
//!     let config = CdnConfig::development();
//!     let report = cdn_edge::run(config).await?;
//!     println!("{}", report.summary_table());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod types;

pub mod cache;
pub mod edge;
pub mod geo;
pub mod origin;
pub mod report;
pub mod session;
pub mod shutdown;
pub mod simulation;

pub mod cli;
pub mod observability;

// Re-exports
pub use error::{CdnError, Result};
pub use types::*;

use config::CdnConfig;
use report::RunReport;
use shutdown::SignalHandler;
use simulation::Simulation;
use tracing::info;

/// Run a complete simulation with the given configuration.
///
/// Ctrl-C or SIGTERM stops the run early; sessions finish the request in
/// flight and the partial report is returned.
pub async fn run(config: CdnConfig) -> Result<RunReport> {
    info!(
        edges = config.edges.len(),
        users = config.simulation.users.len(),
        seed = config.simulation.seed,
        "Starting edge CDN simulation"
    );

    let simulation = Simulation::build(config)?;

    let signal_handler = SignalHandler::new(simulation.shutdown_coordinator());
    let signal_task = tokio::spawn(signal_handler.run());

    let report = simulation.run().await;
    signal_task.abort();

    info!("Simulation complete");
    report
}
