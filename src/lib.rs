//! # slotwise
//!
//! Scatter/gather client for Redis Cluster.
//!
//! A routing and aggregation layer over a cluster of masters: keys map to
//! hash slots (CRC16 mod 16384, hash tags honored), slots map to nodes via
//! a discovered topology snapshot, and operations either route to the one
//! owning node, fan out to every master with a merged result, or span
//! slots with per-node sub-commands reassembled in request order.
//!
//! ## Features
//!
//! - **Slot routing**: point commands go straight to the owning master,
//!   with a single bounded retry on `MOVED`/`ASK` redirects
//! - **Scatter/gather**: pattern key enumeration and cluster-wide commands
//!   fan out concurrently; one dead node yields a partial result, not a
//!   failed call
//! - **Cross-slot commands**: `MGET`/`DEL` over keys on different nodes,
//!   results in caller order, partial failures carry retryable detail
//! - **Immutable topology snapshots**: refreshed on connect and on
//!   redirect, never mutated in place
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slotwise::{ClusterClient, ClusterConfig, NodeEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClusterConfig::new([NodeEndpoint::new("127.0.0.1", 7000)]);
//!     let client = ClusterClient::connect(config).await?;
//!
//!     client.kv().set("key-1", "foo").await?;
//!     client.kv().set("key-2", "bar").await?;
//!
//!     // Union of keys across every master
//!     let keys = client.cluster().keys("*").await?;
//!     println!("cluster holds {} keys", keys.merged.len());
//!
//!     // Cross-slot fetch, values in request order
//!     let values = client.kv().mget(&["key-1", "key-2"]).await?;
//!     println!("values: {:?}", values);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod kv;
pub mod resp;
pub mod router;
pub mod scatter;
pub mod slot;
pub mod topology;
pub mod transport;

pub use client::{ClusterClient, ClusterConfig};
pub use error::{PartialFailure, Result, SlotwiseError};
pub use kv::KvCommands;
pub use resp::{Command, Redirect, RedirectKind, RespValue};
pub use router::SlotRouter;
pub use scatter::{ClusterCommands, NodeFailure, ScatterOutcome};
pub use slot::hash_slot;
pub use topology::{ClusterTopology, NodeEndpoint, SlotRange, TOTAL_SLOTS};
pub use transport::TcpTransport;
