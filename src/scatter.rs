//! Scatter-gather execution across all cluster masters
//!
//! Every master in the current snapshot is contacted concurrently; each
//! per-node call carries its own timeout, and a failing node never aborts
//! its peers. The merge runs in the calling task after all per-node calls
//! settle, so the accumulator is owned by the call alone. Only when every
//! node fails does an operation return an error; anything less is an
//! outcome marked partial.

use crate::client::ClusterClient;
use crate::error::{Result, SlotwiseError};
use crate::resp::{Command, RespValue};
use crate::topology::{ClusterTopology, NodeEndpoint};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// One node's failure within a scatter
#[derive(Debug)]
pub struct NodeFailure {
    pub node: NodeEndpoint,
    pub error: SlotwiseError,
}

/// Merged result of a scatter across all masters
#[derive(Debug)]
pub struct ScatterOutcome<T> {
    /// Union/merge of the successful per-node results
    pub merged: T,
    /// Nodes that failed; empty means a complete result
    pub failures: Vec<NodeFailure>,
    /// Keys observed from more than one node. Correct slot partitioning
    /// makes this impossible; entries here flag a topology inconsistency.
    /// Only populated by key enumeration.
    pub duplicates: Vec<String>,
}

impl<T> ScatterOutcome<T> {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Cluster-wide command interface
#[derive(Clone)]
pub struct ClusterCommands {
    client: ClusterClient,
}

impl ClusterCommands {
    pub(crate) fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Current topology snapshot
    pub fn topology(&self) -> Arc<ClusterTopology> {
        self.client.topology()
    }

    /// Re-discover the topology and publish a fresh snapshot
    pub async fn refresh(&self) -> Result<()> {
        self.client.refresh_topology().await.map(|_| ())
    }

    /// Master owning `key` under the current snapshot
    pub fn route_key(&self, key: impl AsRef<str>) -> Result<NodeEndpoint> {
        self.client.router().route_key(key.as_ref())
    }

    /// Enumerate keys matching `pattern` across every master and merge the
    /// per-node sets into one.
    pub async fn keys(&self, pattern: &str) -> Result<ScatterOutcome<Vec<String>>> {
        let command = Command::new("KEYS").arg(pattern);
        let (successes, mut failures, total) = self.scatter(&command).await;

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut duplicates = Vec::new();
        for (node, reply) in successes {
            match string_array(reply, "KEYS") {
                Ok(node_keys) => {
                    for key in node_keys {
                        if seen.insert(key.clone()) {
                            merged.push(key);
                        } else {
                            warn!(key = %key, node = %node, "key reported by more than one node");
                            duplicates.push(key);
                        }
                    }
                }
                Err(error) => failures.push(NodeFailure { node, error }),
            }
        }

        if !failures.is_empty() && failures.len() == total {
            return Err(SlotwiseError::AllNodesFailed);
        }
        Ok(ScatterOutcome {
            merged,
            failures,
            duplicates,
        })
    }

    /// Enumerate keys matching `pattern` on one node only, no aggregation
    pub async fn keys_on_node(&self, node: &NodeEndpoint, pattern: &str) -> Result<Vec<String>> {
        let command = Command::new("KEYS").arg(pattern);
        string_array(self.client.execute_on_node(node, &command).await?, "KEYS")
    }

    /// Execute an arbitrary command on one specific node
    pub async fn execute_on_node(
        &self,
        node: &NodeEndpoint,
        command: &Command,
    ) -> Result<RespValue> {
        self.client.execute_on_node(node, command).await
    }

    /// Flush the keyspace of every master
    pub async fn flush_all(&self) -> Result<ScatterOutcome<()>> {
        self.scatter_unit(Command::new("FLUSHALL"), "FLUSHALL").await
    }

    /// Total number of keys across all masters
    pub async fn db_size(&self) -> Result<ScatterOutcome<u64>> {
        let (successes, mut failures, total) = self.scatter(&Command::new("DBSIZE")).await;

        let mut sum = 0u64;
        for (node, reply) in successes {
            match reply {
                RespValue::Integer(n) => sum += n.max(0) as u64,
                other => failures.push(NodeFailure {
                    node,
                    error: SlotwiseError::UnexpectedReply(format!(
                        "DBSIZE returned {}",
                        other.type_name()
                    )),
                }),
            }
        }

        if !failures.is_empty() && failures.len() == total {
            return Err(SlotwiseError::AllNodesFailed);
        }
        Ok(ScatterOutcome {
            merged: sum,
            failures,
            duplicates: Vec::new(),
        })
    }

    /// Liveness sweep over every master
    pub async fn ping_all(&self) -> Result<ScatterOutcome<()>> {
        self.scatter_unit(Command::new("PING"), "PING").await
    }

    /// Scatter a command whose per-node reply is a bare acknowledgement.
    async fn scatter_unit(&self, command: Command, name: &str) -> Result<ScatterOutcome<()>> {
        let (successes, mut failures, total) = self.scatter(&command).await;

        for (node, reply) in successes {
            if !matches!(reply, RespValue::Simple(_)) {
                failures.push(NodeFailure {
                    node,
                    error: SlotwiseError::UnexpectedReply(format!(
                        "{name} returned {}",
                        reply.type_name()
                    )),
                });
            }
        }

        if !failures.is_empty() && failures.len() == total {
            return Err(SlotwiseError::AllNodesFailed);
        }
        Ok(ScatterOutcome {
            merged: (),
            failures,
            duplicates: Vec::new(),
        })
    }

    /// Send `command` to every master concurrently. Returns the per-node
    /// successes, the per-node failures, and the number of nodes contacted.
    async fn scatter(
        &self,
        command: &Command,
    ) -> (Vec<(NodeEndpoint, RespValue)>, Vec<NodeFailure>, usize) {
        let nodes = self.client.topology().nodes();
        let total = nodes.len();

        let calls = nodes.into_iter().map(|node| {
            let client = self.client.clone();
            let command = command.clone();
            async move {
                let result = client.execute_on_node(&node, &command).await;
                (node, result)
            }
        });

        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (node, result) in join_all(calls).await {
            match result {
                Ok(reply) => successes.push((node, reply)),
                Err(error) => {
                    warn!(node = %node, error = %error, "scatter target failed");
                    failures.push(NodeFailure { node, error });
                }
            }
        }
        (successes, failures, total)
    }
}

fn string_array(reply: RespValue, command: &str) -> Result<Vec<String>> {
    let RespValue::Array(items) = reply else {
        return Err(SlotwiseError::UnexpectedReply(format!(
            "{command} returned {}",
            reply.type_name()
        )));
    };
    items
        .into_iter()
        .map(|item| {
            item.bulk_string().ok_or_else(|| {
                SlotwiseError::UnexpectedReply(format!(
                    "{command} item was {}",
                    item.type_name()
                ))
            })
        })
        .collect()
}
