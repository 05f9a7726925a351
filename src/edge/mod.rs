//! Edge nodes for the CDN
//!
//! Each edge serves content from its own cache and keeps an eye on its peers:
//! - Edge cache nodes
//! - Load tracking
//! - Serve-or-recommend node selection
//! - Periodic load broadcasting

pub mod broadcast;
pub mod load;
pub mod node;
pub mod selector;

pub use broadcast::{LoadBroadcaster, LoadReportSink};
pub use load::{LoadSample, LoadTracker, RequestGuard};
pub use node::{
    ContentRequest, EdgeConfig, EdgeNode, EdgeResponse, EdgeStatsSnapshot, Recommendation,
    ServedContent,
};
pub use selector::{Candidate, NodeSelector, PeerState, PeerTable, RecommendationDecision};
