//! RESP2 wire codec
//!
//! Encodes commands as arrays of bulk strings and decodes the reply types a
//! cluster client sees: simple strings, errors, integers, bulk strings,
//! arrays and nulls. Redirect errors (`MOVED`/`ASK`) get their own parser
//! since routing reacts to them.

use crate::error::{Result, SlotwiseError};
use crate::topology::NodeEndpoint;
use bytes::{BufMut, Bytes, BytesMut};
use futures::future::BoxFuture;
use std::io::ErrorKind;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// One decoded RESP reply
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    /// String content of a bulk or simple string reply.
    pub fn bulk_string(&self) -> Option<String> {
        match self {
            RespValue::Bulk(data) => Some(String::from_utf8_lossy(data).into_owned()),
            RespValue::Simple(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::Simple(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::Bulk(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
        }
    }
}

/// Command builder: name plus arguments, encoded as a RESP array.
#[derive(Debug, Clone)]
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![name.as_ref().to_vec()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Command name, for logging.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.args[0]).into_owned()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(format!("*{}\r\n", self.args.len()).as_bytes());
        for arg in &self.args {
            buf.put_slice(format!("${}\r\n", arg.len()).as_bytes());
            buf.put_slice(arg);
            buf.put_slice(b"\r\n");
        }
        buf.freeze()
    }
}

/// Redirect kind signalled by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Slot ownership moved permanently
    Moved,
    /// Slot is migrating; target holds the key right now
    Ask,
}

/// A parsed `MOVED`/`ASK` error reply
#[derive(Debug, Clone, PartialEq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub slot: u16,
    pub node: NodeEndpoint,
}

/// Parse a redirect out of an error reply, `None` for ordinary errors.
///
/// Wire format: `MOVED 12422 127.0.0.1:7001` / `ASK 12422 127.0.0.1:7001`.
pub fn parse_redirect(message: &str) -> Option<Redirect> {
    let mut parts = message.split_whitespace();
    let kind = match parts.next()? {
        "MOVED" => RedirectKind::Moved,
        "ASK" => RedirectKind::Ask,
        _ => return None,
    };
    let slot = parts.next()?.parse().ok()?;
    let node = parts.next()?.parse().ok()?;
    Some(Redirect { kind, slot, node })
}

/// Read one RESP value off the stream.
///
/// Boxed because arrays recurse.
pub(crate) fn read_value<'a, R>(reader: &'a mut R) -> BoxFuture<'a, Result<RespValue>>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let line = read_line(reader).await?;
        let (prefix, rest) = line.split_at(1);
        match prefix.as_bytes()[0] {
            b'+' => Ok(RespValue::Simple(rest.to_string())),
            b'-' => Ok(RespValue::Error(rest.to_string())),
            b':' => rest
                .parse()
                .map(RespValue::Integer)
                .map_err(|_| SlotwiseError::Protocol(format!("bad integer reply {rest:?}"))),
            b'$' => {
                let len: i64 = rest
                    .parse()
                    .map_err(|_| SlotwiseError::Protocol(format!("bad bulk length {rest:?}")))?;
                if len < 0 {
                    return Ok(RespValue::Null);
                }
                let mut data = vec![0u8; len as usize + 2];
                reader.read_exact(&mut data).await?;
                if &data[len as usize..] != b"\r\n" {
                    return Err(SlotwiseError::Protocol("bulk string missing CRLF".into()));
                }
                data.truncate(len as usize);
                Ok(RespValue::Bulk(Bytes::from(data)))
            }
            b'*' => {
                let len: i64 = rest
                    .parse()
                    .map_err(|_| SlotwiseError::Protocol(format!("bad array length {rest:?}")))?;
                if len < 0 {
                    return Ok(RespValue::Null);
                }
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(read_value(reader).await?);
                }
                Ok(RespValue::Array(items))
            }
            other => Err(SlotwiseError::Protocol(format!(
                "unknown reply prefix {:?}",
                other as char
            ))),
        }
    })
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(
            std::io::Error::new(ErrorKind::UnexpectedEof, "connection closed mid-reply").into(),
        );
    }
    if !line.ends_with("\r\n") {
        return Err(SlotwiseError::Protocol("reply line missing CRLF".into()));
    }
    line.truncate(line.len() - 2);
    if line.is_empty() {
        return Err(SlotwiseError::Protocol("empty reply line".into()));
    }
    Ok(line)
}
