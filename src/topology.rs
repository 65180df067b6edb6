//! Cluster topology snapshots
//!
//! A topology maps slot ranges to the master node that owns them. Snapshots
//! are immutable once built: the client publishes a fresh `Arc` on every
//! refresh and callers hold one snapshot for the duration of a logical
//! operation, so no routing decision ever observes a half-updated map.

use crate::error::{Result, SlotwiseError};
use crate::resp::RespValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Total number of hash slots (Redis-compatible)
pub const TOTAL_SLOTS: u16 = 16384;

/// Address of one reachable cluster master
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeEndpoint {
    type Err = SlotwiseError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| SlotwiseError::Protocol(format!("invalid endpoint {s:?}")))?;
        let port = port
            .parse()
            .map_err(|_| SlotwiseError::Protocol(format!("invalid port in endpoint {s:?}")))?;
        Ok(Self::new(host, port))
    }
}

/// Slot range (inclusive start, inclusive end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn new(start: u16, end: u16) -> Self {
        assert!(start <= end && end < TOTAL_SLOTS);
        Self { start, end }
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }
}

/// Immutable mapping from slot ranges to owning masters.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
    /// Assignments sorted by range start.
    ranges: Vec<(SlotRange, NodeEndpoint)>,
}

impl ClusterTopology {
    pub fn new(mut assignments: Vec<(SlotRange, NodeEndpoint)>) -> Self {
        assignments.sort_by_key(|(range, _)| range.start);
        Self {
            ranges: assignments,
        }
    }

    /// Build a topology from a `CLUSTER SLOTS` reply.
    ///
    /// Each entry is `[start, end, [host, port, ...], ...replicas]`; only
    /// the master (first node entry) is kept, since routing targets masters.
    pub fn from_cluster_slots(reply: &RespValue) -> Result<Self> {
        let entries = match reply {
            RespValue::Array(entries) => entries,
            other => {
                return Err(SlotwiseError::Protocol(format!(
                    "CLUSTER SLOTS returned {}",
                    other.type_name()
                )));
            }
        };

        let mut assignments = Vec::with_capacity(entries.len());
        for entry in entries {
            let RespValue::Array(parts) = entry else {
                return Err(SlotwiseError::Protocol(
                    "CLUSTER SLOTS entry is not an array".into(),
                ));
            };
            let (Some(RespValue::Integer(start)), Some(RespValue::Integer(end))) =
                (parts.first(), parts.get(1))
            else {
                return Err(SlotwiseError::Protocol(
                    "CLUSTER SLOTS entry missing slot bounds".into(),
                ));
            };
            let Some(RespValue::Array(master)) = parts.get(2) else {
                return Err(SlotwiseError::Protocol(
                    "CLUSTER SLOTS entry missing master".into(),
                ));
            };
            let (Some(host), Some(RespValue::Integer(port))) =
                (master.first().and_then(RespValue::bulk_string), master.get(1))
            else {
                return Err(SlotwiseError::Protocol(
                    "CLUSTER SLOTS master missing host or port".into(),
                ));
            };
            if host.is_empty() {
                return Err(SlotwiseError::Protocol(
                    "CLUSTER SLOTS master has empty host".into(),
                ));
            }
            if *start < 0 || *end >= i64::from(TOTAL_SLOTS) || start > end {
                return Err(SlotwiseError::Protocol(format!(
                    "CLUSTER SLOTS entry has invalid bounds {start}-{end}"
                )));
            }
            let port = u16::try_from(*port).map_err(|_| {
                SlotwiseError::Protocol(format!("CLUSTER SLOTS master has invalid port {port}"))
            })?;

            assignments.push((
                SlotRange::new(*start as u16, *end as u16),
                NodeEndpoint::new(host, port),
            ));
        }

        let topology = Self::new(assignments);
        debug!(
            nodes = topology.nodes().len(),
            ranges = topology.ranges.len(),
            full_coverage = topology.has_full_coverage(),
            "parsed cluster topology"
        );
        Ok(topology)
    }

    /// Master owning the slot, or `None` inside a coverage gap.
    pub fn node_for_slot(&self, slot: u16) -> Option<&NodeEndpoint> {
        self.ranges
            .iter()
            .find(|(range, _)| range.contains(slot))
            .map(|(_, node)| node)
    }

    /// Distinct masters in range order, first appearance wins.
    pub fn nodes(&self) -> Vec<NodeEndpoint> {
        let mut nodes: Vec<NodeEndpoint> = Vec::new();
        for (_, node) in &self.ranges {
            if !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        nodes
    }

    pub fn ranges(&self) -> &[(SlotRange, NodeEndpoint)] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True when the ranges are disjoint and cover all 16384 slots.
    /// Anything else indicates a migrating or unhealthy cluster.
    pub fn has_full_coverage(&self) -> bool {
        let mut next = 0u32;
        for (range, _) in &self.ranges {
            if u32::from(range.start) != next {
                return false;
            }
            next = u32::from(range.end) + 1;
        }
        next == u32::from(TOTAL_SLOTS)
    }
}
