//! Cluster client: discovery, topology snapshots, redirect-bounded routing

use crate::error::{Result, SlotwiseError};
use crate::kv::KvCommands;
use crate::resp::{self, Command, RespValue};
use crate::router::SlotRouter;
use crate::scatter::ClusterCommands;
use crate::topology::{ClusterTopology, NodeEndpoint};
use crate::transport::TcpTransport;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Cluster client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Seed endpoints used to discover the topology
    pub seeds: Vec<NodeEndpoint>,
    /// Per-node connect timeout (milliseconds)
    pub connect_timeout_ms: u64,
    /// Per-node command timeout (milliseconds)
    pub command_timeout_ms: u64,
}

impl ClusterConfig {
    /// Create a configuration with the given seed endpoints
    pub fn new(seeds: impl IntoIterator<Item = NodeEndpoint>) -> Self {
        Self {
            seeds: seeds.into_iter().collect(),
            connect_timeout_ms: 1_000,
            command_timeout_ms: 5_000,
        }
    }

    /// Set the per-node connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-node command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

struct ClientInner {
    config: ClusterConfig,
    transport: TcpTransport,
    /// Published topology snapshot; replaced wholesale on refresh.
    topology: RwLock<Arc<ClusterTopology>>,
}

/// Scatter/gather client for a Redis Cluster.
///
/// Cheap to clone; clones share the transport and the published topology
/// snapshot. Dropping an aggregate call's future abandons its in-flight
/// per-node requests; their results are simply never merged.
#[derive(Clone)]
pub struct ClusterClient {
    inner: Arc<ClientInner>,
}

impl ClusterClient {
    /// Discover the topology from the seeds and build a client.
    pub async fn connect(config: ClusterConfig) -> Result<Self> {
        if config.seeds.is_empty() {
            return Err(SlotwiseError::NoSeeds);
        }
        let transport = TcpTransport::new(config.connect_timeout(), config.command_timeout());
        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                topology: RwLock::new(Arc::new(ClusterTopology::default())),
            }),
        };
        client.refresh_topology().await?;
        Ok(client)
    }

    /// Key-value command interface
    pub fn kv(&self) -> KvCommands {
        KvCommands::new(self.clone())
    }

    /// Cluster-wide command interface (scatter/gather, topology)
    pub fn cluster(&self) -> ClusterCommands {
        ClusterCommands::new(self.clone())
    }

    /// Current topology snapshot. Valid for one logical operation; a
    /// refresh publishes a new snapshot without touching this one.
    pub fn topology(&self) -> Arc<ClusterTopology> {
        Arc::clone(&self.inner.topology.read())
    }

    /// Router over the current snapshot
    pub fn router(&self) -> SlotRouter {
        SlotRouter::new(self.topology())
    }

    /// Re-discover the topology and publish a fresh snapshot.
    ///
    /// Asks currently known masters first, then falls back to the seeds;
    /// the first node that answers `CLUSTER SLOTS` wins.
    pub async fn refresh_topology(&self) -> Result<Arc<ClusterTopology>> {
        let command = Command::new("CLUSTER").arg("SLOTS");

        let mut candidates = self.topology().nodes();
        for seed in &self.inner.config.seeds {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }

        for node in candidates {
            match self.inner.transport.request(&node, &command).await {
                Ok(RespValue::Error(message)) => {
                    warn!(node = %node, error = %message, "CLUSTER SLOTS rejected");
                }
                Ok(reply) => match ClusterTopology::from_cluster_slots(&reply) {
                    Ok(topology) => {
                        let topology = Arc::new(topology);
                        *self.inner.topology.write() = Arc::clone(&topology);
                        info!(
                            source = %node,
                            nodes = topology.nodes().len(),
                            full_coverage = topology.has_full_coverage(),
                            "refreshed cluster topology"
                        );
                        return Ok(topology);
                    }
                    Err(e) => {
                        warn!(node = %node, error = %e, "discarding malformed CLUSTER SLOTS reply");
                    }
                },
                Err(e) => {
                    warn!(node = %node, error = %e, "topology source unreachable");
                }
            }
        }

        Err(SlotwiseError::AllNodesFailed)
    }

    /// Execute a command on the master owning `key`, following at most one
    /// redirect.
    ///
    /// A `MOVED`/`ASK` reply triggers a topology refresh and a single
    /// retry against the new owner; a second redirect within the same call
    /// surfaces as [`SlotwiseError::TopologyUnstable`].
    pub(crate) async fn execute_keyed(&self, key: &str, command: &Command) -> Result<RespValue> {
        let mut snapshot = self.topology();
        let mut redirected = false;

        loop {
            let node = SlotRouter::new(Arc::clone(&snapshot)).route_key(key)?;
            let reply = self.inner.transport.request(&node, command).await?;

            if let RespValue::Error(message) = &reply {
                if let Some(redirect) = resp::parse_redirect(message) {
                    if redirected {
                        warn!(key, node = %node, "second redirect in one call");
                        return Err(SlotwiseError::TopologyUnstable { key: key.into() });
                    }
                    debug!(
                        key,
                        slot = redirect.slot,
                        target = %redirect.node,
                        kind = ?redirect.kind,
                        "redirect received, refreshing topology"
                    );
                    redirected = true;
                    snapshot = self.refresh_topology().await?;
                    continue;
                }
                return Err(SlotwiseError::Server(message.clone()));
            }

            return Ok(reply);
        }
    }

    /// Execute a command on one specific node, no routing or aggregation.
    pub async fn execute_on_node(
        &self,
        node: &NodeEndpoint,
        command: &Command,
    ) -> Result<RespValue> {
        let reply = self.inner.transport.request(node, command).await?;
        if let RespValue::Error(message) = reply {
            return Err(SlotwiseError::Server(message));
        }
        Ok(reply)
    }
}
