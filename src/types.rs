//! Core type definitions for the edge CDN.
//!
//! # Key Types
//!
//! - [`ContentItem`]: an immutable piece of content owned by the origin
//! - [`Payload`]: cheaply clonable content bytes shared between origin and edges
//! - [`EdgeDescriptor`]: identity and placement of an edge node
//!
//! # Type Aliases
//!
//! - [`ContentId`] = `u64`: content key
//! - [`EdgeId`] = `u64`: edge node identifier
//! - [`UserId`] = `u64`: simulated user identifier
//!
//! # Examples
//!
//! ```rust
//! use cdn_edge::types::{ContentItem, Payload};
//!
//! let item = ContentItem::new(7, Payload::from(vec![0u8; 1024]));
//! assert_eq!(item.size(), 1024);
//!
//! // Clones share the same bytes
//! let copy = item.payload.clone();
//! assert!(copy.ptr_eq(&item.payload));
//! ```

use crate::geo::GeoLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Content identifier.
pub type ContentId = u64;

/// Edge node identifier.
pub type EdgeId = u64;

/// Simulated user identifier.
pub type UserId = u64;

/// Immutable content bytes.
///
/// Edges hold clones of the origin's payload; cloning never copies the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether two payloads share the same allocation.
    pub fn ptr_eq(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.len())
    }
}

/// A piece of content as stored at the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    /// Content key.
    pub id: ContentId,
    /// Content bytes.
    pub payload: Payload,
}

impl ContentItem {
    pub fn new(id: ContentId, payload: Payload) -> Self {
        Self { id, payload }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Identity and placement of an edge node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    /// Edge identifier.
    pub id: EdgeId,
    /// Human-readable name.
    pub name: String,
    /// Geographic location.
    pub location: GeoLocation,
}

impl EdgeDescriptor {
    pub fn new(id: EdgeId, name: impl Into<String>, location: GeoLocation) -> Self {
        Self {
            id,
            name: name.into(),
            location,
        }
    }
}

impl fmt::Display for EdgeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (edge {})", self.name, self.id)
    }
}
