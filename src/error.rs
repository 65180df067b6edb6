//! Error types for the slotwise client

use crate::topology::NodeEndpoint;
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for slotwise operations
pub type Result<T> = std::result::Result<T, SlotwiseError>;

/// slotwise error types
#[derive(Error, Debug)]
pub enum SlotwiseError {
    /// Transport-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent bytes that do not form a valid RESP reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error reply
    #[error("server error: {0}")]
    Server(String),

    /// No node in the current topology snapshot owns the slot
    #[error("no node owns slot {slot}")]
    TopologyUnknown { slot: u16 },

    /// Slot ownership kept moving: a second redirect arrived within one
    /// logical call, after a refresh and a single retry
    #[error("topology unstable while routing key {key:?}")]
    TopologyUnstable { key: String },

    /// A single node could not be reached
    #[error("node {node} unreachable: {reason}")]
    NodeUnreachable { node: NodeEndpoint, reason: String },

    /// A per-node call exceeded its command timeout
    #[error("command to node {node} timed out")]
    Timeout { node: NodeEndpoint },

    /// A multi-key command succeeded on some nodes and failed on others
    #[error("cross-slot command failed on {} node(s), {} key(s) affected",
            .0.failed_nodes.len(), .0.failed_keys.len())]
    CrossSlotPartialFailure(Box<PartialFailure>),

    /// Every node in the cluster failed the request
    #[error("all cluster nodes failed")]
    AllNodesFailed,

    /// The configuration contains no seed endpoints
    #[error("no seed nodes configured")]
    NoSeeds,

    /// The server replied with a type the command does not produce
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Detail payload of [`SlotwiseError::CrossSlotPartialFailure`].
///
/// Carries everything a caller needs for a selective retry: the values
/// already recovered, the keys still outstanding, and the nodes that
/// failed them.
#[derive(Debug, Default)]
pub struct PartialFailure {
    /// Values recovered from the nodes that answered, keyed by the
    /// original key. Empty for count-style commands such as DEL.
    pub partial: HashMap<String, Option<String>>,
    /// Keys whose per-node sub-command failed.
    pub failed_keys: Vec<String>,
    /// Nodes whose sub-command failed, with the rendered error.
    pub failed_nodes: Vec<(NodeEndpoint, String)>,
}
