//! Error types for the edge CDN.
//!
//! This module provides a unified error type [`CdnError`] for all fallible
//! operations, along with a convenient [`Result`] type alias.
//!
//! # Error Categories
//!
//! - **Origin**: content lookups that fail at the origin (not found, timeout)
//! - **Topology**: edge discovery and unknown edge references
//! - **Configuration**: invalid settings or unreadable config files
//! - **External**: IO and serialization failures while writing reports
//!
//! Cache misses, stale peer samples and the absence of an eligible peer are
//! ordinary control flow and never surface as errors.
//!
//! # Example
//!
//! ```rust
//! use cdn_edge::error::{CdnError, Result};
//!
//! fn check_capacity(capacity: usize) -> Result<()> {
//!     if capacity == 0 {
//!         return Err(CdnError::InvalidConfig {
//!             field: "cache.capacity".into(),
//!             reason: "capacity must be non-zero".into(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_capacity(0).is_err());
//! ```

use crate::types::{ContentId, EdgeId};
use std::io;
use thiserror::Error;

/// Main error type for edge CDN operations.
#[derive(Error, Debug)]
pub enum CdnError {
    // Origin errors
    #[error("Content not found at origin: {0}")]
    ContentNotFound(ContentId),

    #[error("Origin fetch for content {content_id} timed out after {timeout_ms}ms")]
    OriginTimeout { content_id: ContentId, timeout_ms: u64 },

    // Topology errors
    #[error("No edge nodes registered")]
    NoEdges,

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // External errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CdnError {
    /// Whether the error means the origin could not deliver the content.
    pub fn is_origin_unavailable(&self) -> bool {
        matches!(
            self,
            CdnError::ContentNotFound(_) | CdnError::OriginTimeout { .. }
        )
    }

    /// Check if error is retryable by the caller.
    ///
    /// The edge never retries on its own; this only informs the user side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CdnError::OriginTimeout { .. })
    }
}

impl From<serde_json::Error> for CdnError {
    fn from(e: serde_json::Error) -> Self {
        CdnError::Serialization(e.to_string())
    }
}

/// Result type alias for edge CDN operations.
pub type Result<T> = std::result::Result<T, CdnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_classification() {
        assert!(CdnError::ContentNotFound(7).is_origin_unavailable());
        assert!(CdnError::OriginTimeout {
            content_id: 7,
            timeout_ms: 100
        }
        .is_origin_unavailable());
        assert!(!CdnError::NoEdges.is_origin_unavailable());
    }

    #[test]
    fn test_retryable() {
        let timeout = CdnError::OriginTimeout {
            content_id: 1,
            timeout_ms: 50,
        };
        assert!(timeout.is_retryable());
        assert!(!CdnError::ContentNotFound(1).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = CdnError::InvalidConfig {
            field: "cache.capacity".into(),
            reason: "must be non-zero".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration: cache.capacity: must be non-zero"
        );
    }
}
