//! Protocol messages for talking to the index service
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message
//!
//! A query is answered by zero or more `Row` messages followed by exactly one
//! terminal message: `End`, `Timeout` or `Error`.

use crate::backend::Row;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest message accepted from the service
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Request from client to service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Run a query
    Query {
        /// Query text in the service dialect
        text: String,
        /// Timeout in seconds, 0 for none
        timeout_secs: u64,
        /// Maximum number of rows
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },

    /// Ping for connection testing
    Ping,
}

/// Response from service to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// One result row
    Row(Row),

    /// All rows were sent
    End,

    /// The query timed out; rows sent so far are incomplete
    Timeout,

    /// The query failed
    Error { message: String },

    /// Pong response
    Pong,
}

impl Response {
    /// Whether this message ends the answer to a query
    pub fn is_terminal(&self) -> bool {
        matches!(self, Response::End | Response::Timeout | Response::Error { .. })
    }
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;

    let len = u32::try_from(json.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "Message too large")
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read a message from a stream with length prefix
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    serde_json::from_slice(&buf).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })
}
