//! Wire format: one JSON object per `\n`-terminated line.
//!
//! ```text
//! client -> host   {"id":7,"method":"script/read","params":{"path":"Assets/A.cs"}}
//! host -> client   {"id":7,"result":{...}}
//!                  {"id":7,"error":{"kind":"NotFoundError","message":"..."}}
//!                  {"event":"project/changed","data":{...}}
//! ```
//!
//! An inbound line carrying `event` and no `id` is an unsolicited
//! notification, never a response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};

use crate::error::BridgeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BridgeError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, error: BridgeError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn from_result(id: u64, result: Result<Value, BridgeError>) -> Self {
        match result {
            Ok(value) => Self::ok(id, value),
            Err(error) => Self::err(id, error),
        }
    }

    pub fn into_result(self) -> Result<Value, BridgeError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(value)) => Ok(value),
            (None, None) => Ok(Value::Null),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "compile/started")]
    CompileStarted,
    #[serde(rename = "compile/finished")]
    CompileFinished,
    #[serde(rename = "project/changed")]
    ProjectChanged,
    #[serde(other)]
    Unknown,
}

/// Unsolicited host notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(event: EventKind, data: Value) -> Self {
        Self { event, data }
    }
}

/// A decoded host-to-client line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Event(Event),
}

pub fn decode_inbound(line: &str) -> Result<Inbound, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("event").is_some() && value.get("id").is_none() {
        Ok(Inbound::Event(serde_json::from_value(value)?))
    } else {
        Ok(Inbound::Response(serde_json::from_value(value)?))
    }
}

/// Read the next non-blank line. `Ok(None)` at end of stream.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Serialize `message` as one line and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let mut bytes = serde_json::to_vec(message).map_err(io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()
}
