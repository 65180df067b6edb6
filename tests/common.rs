//! Common test utilities: scripted mock cluster nodes speaking RESP2.
//!
//! Each mock node is a real TCP listener with its own keyspace, a
//! configurable `CLUSTER SLOTS` view, and a queue of scripted redirect
//! replies, so tests can drive routing, scatter and redirect handling
//! without a live Redis Cluster.

use slotwise::{ClusterClient, ClusterConfig, NodeEndpoint};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

/// One slot-range assignment as served in a `CLUSTER SLOTS` reply
pub type SlotView = (u16, u16, NodeEndpoint);

#[derive(Default)]
struct NodeState {
    store: Mutex<HashMap<String, String>>,
    slots: Mutex<Vec<SlotView>>,
    redirects: Mutex<VecDeque<String>>,
}

/// A scripted single mock cluster node
pub struct MockNode {
    endpoint: NodeEndpoint,
    state: Arc<NodeState>,
}

#[allow(dead_code)] // Used by other test modules
impl MockNode {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(NodeState::default());
        tokio::spawn(accept_loop(listener, Arc::clone(&state)));
        Self {
            endpoint: NodeEndpoint::new("127.0.0.1", port),
            state,
        }
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        self.endpoint.clone()
    }

    /// Replace the `CLUSTER SLOTS` view this node serves
    pub fn set_slots(&self, views: Vec<SlotView>) {
        *self.state.slots.lock().unwrap() = views;
    }

    /// Queue an error reply served instead of the next keyed data command
    pub fn push_redirect(&self, message: impl Into<String>) {
        self.state.redirects.lock().unwrap().push_back(message.into());
    }

    pub fn key_count(&self) -> usize {
        self.state.store.lock().unwrap().len()
    }

    /// Seed this node's keyspace directly, bypassing routing
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state
            .store
            .lock()
            .unwrap()
            .insert(key.into(), value.into());
    }
}

/// Reserve an endpoint nothing listens on (bound once, then released)
#[allow(dead_code)]
pub async fn dead_endpoint() -> NodeEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    NodeEndpoint::new("127.0.0.1", port)
}

/// Two masters splitting the slot space: A owns 0-5460, B owns
/// 5461-16383. Returns a connected client seeded from A.
#[allow(dead_code)]
pub async fn two_node_cluster() -> (MockNode, MockNode, ClusterClient) {
    let node_a = MockNode::start().await;
    let node_b = MockNode::start().await;

    let views = vec![
        (0, 5460, node_a.endpoint()),
        (5461, 16383, node_b.endpoint()),
    ];
    node_a.set_slots(views.clone());
    node_b.set_slots(views);

    let config = ClusterConfig::new([node_a.endpoint()])
        .with_connect_timeout(std::time::Duration::from_millis(500))
        .with_command_timeout(std::time::Duration::from_millis(500));
    let client = ClusterClient::connect(config).await.unwrap();
    (node_a, node_b, client)
}

async fn accept_loop(listener: TcpListener, state: Arc<NodeState>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(handle_connection(stream, Arc::clone(&state)));
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<NodeState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    while let Some(args) = read_command(&mut reader).await {
        let reply = respond(&state, &args);
        if write_half.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Read one command (a RESP array of bulk strings) off the wire
async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let mut header = String::new();
    if reader.read_line(&mut header).await.ok()? == 0 {
        return None;
    }
    let count: usize = header.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        let mut len_line = String::new();
        reader.read_line(&mut len_line).await.ok()?;
        let len: usize = len_line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8_lossy(&data).into_owned());
    }
    Some(args)
}

fn respond(state: &NodeState, args: &[String]) -> String {
    let Some(command) = args.first() else {
        return error("ERR empty command");
    };
    let command = command.to_uppercase();

    // Scripted redirects hijack the next keyed data command
    if matches!(command.as_str(), "GET" | "SET" | "DEL" | "EXISTS" | "MGET") {
        if let Some(message) = state.redirects.lock().unwrap().pop_front() {
            return error(&message);
        }
    }

    let mut store = state.store.lock().unwrap();
    match command.as_str() {
        "PING" => simple("PONG"),
        "SET" if args.len() >= 3 => {
            store.insert(args[1].clone(), args[2].clone());
            simple("OK")
        }
        "GET" if args.len() == 2 => match store.get(&args[1]) {
            Some(value) => bulk(value),
            None => null(),
        },
        "DEL" if args.len() >= 2 => {
            let removed = args[1..]
                .iter()
                .filter(|key| store.remove(*key).is_some())
                .count();
            integer(removed as i64)
        }
        "EXISTS" if args.len() >= 2 => {
            let found = args[1..].iter().filter(|key| store.contains_key(*key)).count();
            integer(found as i64)
        }
        "MGET" if args.len() >= 2 => {
            let items: Vec<String> = args[1..]
                .iter()
                .map(|key| match store.get(key) {
                    Some(value) => bulk(value),
                    None => null(),
                })
                .collect();
            array(&items)
        }
        "KEYS" if args.len() == 2 => {
            let items: Vec<String> = store
                .keys()
                .filter(|key| glob_match(&args[1], key))
                .map(|key| bulk(key))
                .collect();
            array(&items)
        }
        "DBSIZE" => integer(store.len() as i64),
        "FLUSHALL" => {
            store.clear();
            simple("OK")
        }
        "CLUSTER" if args.get(1).is_some_and(|sub| sub.eq_ignore_ascii_case("SLOTS")) => {
            cluster_slots_reply(&state.slots.lock().unwrap())
        }
        _ => error(&format!("ERR unknown command '{command}'")),
    }
}

fn cluster_slots_reply(views: &[SlotView]) -> String {
    let entries: Vec<String> = views
        .iter()
        .map(|(start, end, node)| {
            let master = array(&[bulk(&node.host), integer(i64::from(node.port))]);
            array(&[integer(i64::from(*start)), integer(i64::from(*end)), master])
        })
        .collect();
    array(&entries)
}

fn simple(s: &str) -> String {
    format!("+{s}\r\n")
}

fn error(s: &str) -> String {
    format!("-{s}\r\n")
}

fn integer(n: i64) -> String {
    format!(":{n}\r\n")
}

fn bulk(s: &str) -> String {
    format!("${}\r\n{s}\r\n", s.len())
}

fn null() -> String {
    "$-1\r\n".to_string()
}

fn array(items: &[String]) -> String {
    format!("*{}\r\n{}", items.len(), items.concat())
}

/// Minimal glob supporting `*` wildcards, which is all the tests use
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    if !rest.starts_with(parts[0]) {
        return false;
    }
    rest = &rest[parts[0].len()..];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    let last = parts[parts.len() - 1];
    last.is_empty() || rest.ends_with(last)
}
