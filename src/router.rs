//! Key-to-node routing over a topology snapshot

use crate::error::{Result, SlotwiseError};
use crate::slot::hash_slot;
use crate::topology::{ClusterTopology, NodeEndpoint};
use std::collections::HashMap;
use std::sync::Arc;

/// Routes keys to owning masters against one immutable snapshot.
///
/// A router is cheap to build and is meant to live for a single logical
/// operation; the next operation takes a fresh snapshot from the client.
#[derive(Debug, Clone)]
pub struct SlotRouter {
    topology: Arc<ClusterTopology>,
}

impl SlotRouter {
    pub fn new(topology: Arc<ClusterTopology>) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Master owning `key`'s slot.
    ///
    /// Fails with [`SlotwiseError::TopologyUnknown`] inside a coverage gap
    /// (slot migrating or cluster unhealthy).
    pub fn route_key(&self, key: &str) -> Result<NodeEndpoint> {
        let slot = hash_slot(key.as_bytes());
        self.topology
            .node_for_slot(slot)
            .cloned()
            .ok_or(SlotwiseError::TopologyUnknown { slot })
    }

    /// Group keys by owning master, remembering each key's position in the
    /// caller's order so gathered results can be reassembled request-ordered.
    pub fn route_keys<'k>(
        &self,
        keys: &[&'k str],
    ) -> Result<HashMap<NodeEndpoint, Vec<(usize, &'k str)>>> {
        let mut groups: HashMap<NodeEndpoint, Vec<(usize, &'k str)>> = HashMap::new();
        for (index, key) in keys.iter().enumerate() {
            let node = self.route_key(key)?;
            groups.entry(node).or_default().push((index, key));
        }
        Ok(groups)
    }
}
