//! Minimal OVSDB JSON-RPC client.
//!
//! Every operation opens a fresh connection, sends one `transact` request and
//! waits for the reply carrying the same id. Replies are read in chunks until
//! they form a complete JSON document.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use opscli_core::command::HandlerError;
use serde_json::{Deserializer, Value, json};
use thiserror::Error;
use tracing::{debug, trace};

pub const DEFAULT_DATABASE: &str = "OpenSwitch";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
const CHUNK_SIZE: usize = 4096;

#[derive(Debug, Error)]
pub enum OvsdbError {
    #[error("invalid server `{0}`")]
    InvalidEndpoint(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no reply within {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("malformed reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(String),
    #[error("unexpected reply: {0}")]
    Protocol(String),
}

impl From<OvsdbError> for HandlerError {
    fn from(err: OvsdbError) -> Self {
        HandlerError::failed(err)
    }
}

/// Where the database server listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddrV4),
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = OvsdbError;

    fn from_str(server: &str) -> Result<Self, Self::Err> {
        let invalid = || OvsdbError::InvalidEndpoint(server.to_owned());
        let parts: Vec<&str> = server.split(':').collect();
        match parts.as_slice() {
            ["tcp", address, port] if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
                let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
                let port: u16 = port.parse().map_err(|_| invalid())?;
                Ok(Endpoint::Tcp(SocketAddrV4::new(address, port)))
            }
            ["unix", path] if !path.is_empty() => Ok(Endpoint::Unix(PathBuf::from(*path))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(address) => write!(f, "tcp:{address}"),
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        debug!(%endpoint, "connecting");
        let stream = match endpoint {
            Endpoint::Tcp(address) => {
                let stream = TcpStream::connect_timeout(&SocketAddr::V4(*address), timeout)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Stream::Tcp(stream)
            }
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)?;
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                Stream::Unix(stream)
            }
        };
        debug!(%endpoint, "connected");
        Ok(stream)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.read(buf),
            Stream::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(stream) => stream.write(buf),
            Stream::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush(),
            Stream::Unix(stream) => stream.flush(),
        }
    }
}

/// Transactional access to the configuration database.
///
/// Implementors provide [`Database::transact`]; the table helpers build the
/// operations and unpack the first result.
pub trait Database {
    /// Runs `operations` as one transaction and returns one result per
    /// operation. Per-operation errors are reported as [`OvsdbError::Server`].
    fn transact(&self, operations: Vec<Value>) -> Result<Vec<Value>, OvsdbError>;

    /// Rows of `table` matching `conditions`, restricted to `columns` when
    /// any are given.
    fn get(&self, table: &str, columns: &[&str], conditions: &[Value]) -> Result<Vec<Value>, OvsdbError> {
        let mut select = json!({
            "op": "select",
            "table": table,
            "where": conditions,
        });
        if !columns.is_empty() {
            select["columns"] = json!(columns);
        }
        let result = single(self.transact(vec![select])?)?;
        match result.get("rows") {
            Some(Value::Array(rows)) => Ok(rows.clone()),
            _ => Err(OvsdbError::Protocol("select result without rows".into())),
        }
    }

    /// The map stored in `column` of the first matching row.
    fn get_map(
        &self,
        table: &str,
        column: &str,
        conditions: &[Value],
    ) -> Result<BTreeMap<String, String>, OvsdbError> {
        let rows = self.get(table, &[column], conditions)?;
        let row = rows
            .first()
            .ok_or_else(|| OvsdbError::Protocol(format!("no rows in {table}")))?;
        decode_map(&row[column])
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, OvsdbError> {
        single(self.transact(vec![json!({
            "op": "insert",
            "table": table,
            "row": row,
        })])?)
    }

    fn update(&self, table: &str, row: Value, conditions: &[Value]) -> Result<Value, OvsdbError> {
        single(self.transact(vec![json!({
            "op": "update",
            "table": table,
            "where": conditions,
            "row": row,
        })])?)
    }

    fn mutate(&self, table: &str, mutations: Vec<Value>, conditions: &[Value]) -> Result<Value, OvsdbError> {
        single(self.transact(vec![json!({
            "op": "mutate",
            "table": table,
            "where": conditions,
            "mutations": mutations,
        })])?)
    }

    /// Replaces `key` in the map column, inserting it when absent.
    fn map_set_key(
        &self,
        table: &str,
        column: &str,
        key: &str,
        value: &str,
        conditions: &[Value],
    ) -> Result<Value, OvsdbError> {
        self.mutate(
            table,
            vec![
                json!([column, "delete", ["set", [key]]]),
                json!([column, "insert", ["map", [[key, value]]]]),
            ],
            conditions,
        )
    }

    fn map_delete_key(
        &self,
        table: &str,
        column: &str,
        key: &str,
        conditions: &[Value],
    ) -> Result<Value, OvsdbError> {
        self.mutate(
            table,
            vec![json!([column, "delete", ["set", [key]]])],
            conditions,
        )
    }
}

/// `[column, "==", value]` condition.
pub fn equals(column: &str, value: impl Into<Value>) -> Value {
    json!([column, "==", value.into()])
}

fn single(results: Vec<Value>) -> Result<Value, OvsdbError> {
    results
        .into_iter()
        .next()
        .ok_or_else(|| OvsdbError::Protocol("empty transaction result".into()))
}

/// Decodes an OVSDB `["map", [[key, value], ...]]` datum.
pub fn decode_map(datum: &Value) -> Result<BTreeMap<String, String>, OvsdbError> {
    let malformed = || OvsdbError::Protocol(format!("not a map: {datum}"));
    let pairs = match datum {
        Value::Array(parts) if parts.len() == 2 && parts[0] == "map" => {
            parts[1].as_array().ok_or_else(malformed)?
        }
        _ => return Err(malformed()),
    };
    pairs
        .iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([key, value]) => Ok((atom(key), atom(value))),
            _ => Err(malformed()),
        })
        .collect()
}

/// Renders a scalar datum as text.
pub fn atom(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Socket-backed [`Database`].
#[derive(Debug)]
pub struct Ovsdb {
    endpoint: Endpoint,
    database: String,
    timeout: Duration,
    seq: Cell<u64>,
}

impl Ovsdb {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Ovsdb {
            endpoint,
            database: DEFAULT_DATABASE.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            seq: Cell::new(0),
        }
    }

    fn next_id(&self) -> u64 {
        let id = self.seq.get() + 1;
        self.seq.set(id);
        id
    }

    fn receive(&self, stream: &mut Stream, id: u64) -> Result<Value, OvsdbError> {
        let mut data: Vec<u8> = Vec::new();
        let mut chunk = [0_u8; CHUNK_SIZE];
        loop {
            let received = match stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(OvsdbError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed",
                    )));
                }
                Ok(received) => received,
                Err(err)
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(OvsdbError::Timeout(self.timeout));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            debug!(bytes = received, "received");
            data.extend_from_slice(&chunk[..received]);

            let mut messages = Deserializer::from_slice(&data).into_iter::<Value>();
            let mut consumed = 0;
            while let Some(message) = messages.next() {
                match message {
                    Ok(message) => {
                        consumed = messages.byte_offset();
                        trace!(%message, "message");
                        if message.get("id") == Some(&json!(id)) {
                            return Ok(message);
                        }
                    }
                    Err(err) if err.is_eof() => break,
                    Err(err) => return Err(err.into()),
                }
            }
            data.drain(..consumed);
        }
    }
}

impl Database for Ovsdb {
    fn transact(&self, operations: Vec<Value>) -> Result<Vec<Value>, OvsdbError> {
        let id = self.next_id();
        let mut params = vec![Value::String(self.database.clone())];
        params.extend(operations);
        let request = json!({
            "method": "transact",
            "params": params,
            "id": id,
        });

        let mut stream = Stream::connect(&self.endpoint, self.timeout)?;
        let payload = serde_json::to_vec(&request)?;
        debug!(id, bytes = payload.len(), "sending transaction");
        stream.write_all(&payload)?;
        stream.flush()?;

        let reply = self.receive(&mut stream, id)?;
        debug!(endpoint = %self.endpoint, "closing connection");

        match reply.get("error") {
            None | Some(Value::Null) => {}
            Some(error) => return Err(OvsdbError::Server(atom(error))),
        }
        let results = match reply.get("result") {
            Some(Value::Array(results)) => results.clone(),
            _ => return Err(OvsdbError::Protocol("reply without result".into())),
        };
        if let Some(failed) = results.iter().find(|result| result.get("error").is_some()) {
            return Err(OvsdbError::Server(failed.to_string()));
        }
        Ok(results)
    }
}
