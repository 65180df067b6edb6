//! Key-value commands
//!
//! Single-key operations route to the owning master with bounded redirect
//! retry. Multi-key operations are partitioned per owning node, executed as
//! one sub-command per node, and reassembled in the caller's key order.

use crate::client::ClusterClient;
use crate::error::{PartialFailure, Result, SlotwiseError};
use crate::resp::{Command, RespValue};
use futures::future::join_all;
use tracing::warn;

/// Key-value command interface
#[derive(Clone)]
pub struct KvCommands {
    client: ClusterClient,
}

impl KvCommands {
    pub(crate) fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    /// Set a key to a value on its owning master
    pub async fn set(&self, key: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let key = key.as_ref();
        let command = Command::new("SET").arg(key).arg(value.as_ref());
        match self.client.execute_keyed(key, &command).await? {
            RespValue::Simple(_) => Ok(()),
            other => Err(SlotwiseError::UnexpectedReply(format!(
                "SET returned {}",
                other.type_name()
            ))),
        }
    }

    /// Get a key's value, `None` if it does not exist
    pub async fn get(&self, key: impl AsRef<str>) -> Result<Option<String>> {
        let key = key.as_ref();
        let command = Command::new("GET").arg(key);
        optional_value(self.client.execute_keyed(key, &command).await?, "GET")
    }

    /// Delete a single key. Returns whether the key existed.
    pub async fn del(&self, key: impl AsRef<str>) -> Result<bool> {
        let key = key.as_ref();
        let command = Command::new("DEL").arg(key);
        match self.client.execute_keyed(key, &command).await? {
            RespValue::Integer(n) => Ok(n > 0),
            other => Err(SlotwiseError::UnexpectedReply(format!(
                "DEL returned {}",
                other.type_name()
            ))),
        }
    }

    /// Check whether a key exists
    pub async fn exists(&self, key: impl AsRef<str>) -> Result<bool> {
        let key = key.as_ref();
        let command = Command::new("EXISTS").arg(key);
        match self.client.execute_keyed(key, &command).await? {
            RespValue::Integer(n) => Ok(n > 0),
            other => Err(SlotwiseError::UnexpectedReply(format!(
                "EXISTS returned {}",
                other.type_name()
            ))),
        }
    }

    /// Get many keys that may span slots and nodes.
    ///
    /// Keys are grouped per owning master, one `MGET` sub-command is issued
    /// per node concurrently, and values come back in the order the keys
    /// were requested, not grouped by node. If some sub-commands fail while
    /// others succeed the call fails with
    /// [`SlotwiseError::CrossSlotPartialFailure`] carrying the recovered
    /// values and the failed keys/nodes for selective retry.
    pub async fn mget(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let groups = self.client.router().route_keys(keys)?;
        let group_count = groups.len();

        let calls = groups.into_iter().map(|(node, entries)| {
            let client = self.client.clone();
            async move {
                let mut command = Command::new("MGET");
                for (_, key) in &entries {
                    command = command.arg(key);
                }
                let result = client.execute_keyed(entries[0].1, &command).await;
                (node, entries, result)
            }
        });

        let mut slots: Vec<Option<Option<String>>> = vec![None; keys.len()];
        let mut failure = PartialFailure::default();

        for (node, entries, result) in join_all(calls).await {
            let values: Result<Vec<Option<String>>> = result.and_then(|reply| match reply {
                RespValue::Array(items) if items.len() == entries.len() => items
                    .into_iter()
                    .map(|item| optional_value(item, "MGET"))
                    .collect(),
                other => Err(SlotwiseError::UnexpectedReply(format!(
                    "MGET returned {}",
                    other.type_name()
                ))),
            });
            match values {
                Ok(values) => {
                    for ((index, _), value) in entries.iter().zip(values) {
                        slots[*index] = Some(value);
                    }
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "MGET sub-command failed");
                    failure
                        .failed_keys
                        .extend(entries.iter().map(|(_, key)| (*key).to_string()));
                    failure.failed_nodes.push((node, e.to_string()));
                }
            }
        }

        if !failure.failed_nodes.is_empty() {
            if failure.failed_nodes.len() == group_count {
                return Err(SlotwiseError::AllNodesFailed);
            }
            for (index, key) in keys.iter().enumerate() {
                if let Some(value) = &slots[index] {
                    failure.partial.insert((*key).to_string(), value.clone());
                }
            }
            return Err(SlotwiseError::CrossSlotPartialFailure(Box::new(failure)));
        }

        Ok(slots.into_iter().map(|slot| slot.unwrap_or(None)).collect())
    }

    /// Delete many keys that may span slots and nodes. Returns the number
    /// of keys removed. Same partial-failure contract as [`Self::mget`].
    pub async fn del_many(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let groups = self.client.router().route_keys(keys)?;
        let group_count = groups.len();

        let calls = groups.into_iter().map(|(node, entries)| {
            let client = self.client.clone();
            async move {
                let mut command = Command::new("DEL");
                for (_, key) in &entries {
                    command = command.arg(key);
                }
                let result = client.execute_keyed(entries[0].1, &command).await;
                (node, entries, result)
            }
        });

        let mut removed = 0u64;
        let mut failure = PartialFailure::default();

        for (node, entries, result) in join_all(calls).await {
            match result {
                Ok(RespValue::Integer(n)) => removed += n.max(0) as u64,
                Ok(other) => {
                    let e = SlotwiseError::UnexpectedReply(format!(
                        "DEL returned {}",
                        other.type_name()
                    ));
                    warn!(node = %node, error = %e, "DEL sub-command failed");
                    failure
                        .failed_keys
                        .extend(entries.iter().map(|(_, key)| (*key).to_string()));
                    failure.failed_nodes.push((node, e.to_string()));
                }
                Err(e) => {
                    warn!(node = %node, error = %e, "DEL sub-command failed");
                    failure
                        .failed_keys
                        .extend(entries.iter().map(|(_, key)| (*key).to_string()));
                    failure.failed_nodes.push((node, e.to_string()));
                }
            }
        }

        if !failure.failed_nodes.is_empty() {
            if failure.failed_nodes.len() == group_count {
                return Err(SlotwiseError::AllNodesFailed);
            }
            return Err(SlotwiseError::CrossSlotPartialFailure(Box::new(failure)));
        }

        Ok(removed)
    }
}

fn optional_value(value: RespValue, command: &str) -> Result<Option<String>> {
    match value {
        RespValue::Bulk(_) | RespValue::Simple(_) => Ok(value.bulk_string()),
        RespValue::Null => Ok(None),
        other => Err(SlotwiseError::UnexpectedReply(format!(
            "{command} returned {}",
            other.type_name()
        ))),
    }
}
