//! Node ID generation for evaluation graph tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for unique node IDs
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a node in the evaluation graph
///
/// Every container and operator node carries one; the evaluation plan keys
/// its entries on it, which is what makes registration idempotent and the
/// graph a DAG rather than a tree. IDs are unique within a process lifetime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Create a new unique node ID
    #[inline]
    pub fn new() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
        assert!(id2.raw() > id1.raw());
    }
}
