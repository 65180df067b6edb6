//! Single-node TCP transport
//!
//! One request/response exchange per connection. The cluster layer above
//! opens at most one socket per node per logical call, which keeps the
//! transport free of pooling state and makes per-node timeouts trivial.

use crate::error::{Result, SlotwiseError};
use crate::resp::{self, Command, RespValue};
use crate::topology::NodeEndpoint;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Plain TCP transport speaking RESP2 to a single node at a time.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }

    /// Send one command to `node` and read one reply.
    ///
    /// Connect failures map to [`SlotwiseError::NodeUnreachable`], an
    /// exchange exceeding the command timeout to [`SlotwiseError::Timeout`].
    /// Error replies are returned as values; the caller decides whether an
    /// error reply is a redirect, a server error, or expected.
    pub async fn request(&self, node: &NodeEndpoint, command: &Command) -> Result<RespValue> {
        trace!(node = %node, command = %command.name(), "sending command");

        let stream = timeout(
            self.connect_timeout,
            TcpStream::connect((node.host.as_str(), node.port)),
        )
        .await
        .map_err(|_| SlotwiseError::NodeUnreachable {
            node: node.clone(),
            reason: "connect timed out".into(),
        })?
        .map_err(|e| SlotwiseError::NodeUnreachable {
            node: node.clone(),
            reason: e.to_string(),
        })?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let exchange = async {
            write_half.write_all(&command.encode()).await?;
            resp::read_value(&mut reader).await
        };

        match timeout(self.command_timeout, exchange).await {
            Err(_) => Err(SlotwiseError::Timeout { node: node.clone() }),
            Ok(Err(SlotwiseError::Io(e))) => Err(SlotwiseError::NodeUnreachable {
                node: node.clone(),
                reason: e.to_string(),
            }),
            Ok(other) => other,
        }
    }
}
