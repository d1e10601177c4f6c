// src/core/commands/reply.rs

use crate::core::protocol::RespFrame;
use bytes::Bytes;

/// The five reply shapes a command can produce on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A `+...` simple string (`OK`, `PONG`).
    Simple(String),
    /// A bulk string carrying backend data.
    Bulk(Bytes),
    /// The null bulk string.
    Nil,
    Integer(i64),
    /// A flat array of bulk strings.
    Array(Vec<Bytes>),
    /// An `-ERR ...` line.
    Error(String),
}

impl Reply {
    pub fn into_frame(self) -> RespFrame {
        match self {
            Reply::Simple(s) => RespFrame::SimpleString(s),
            Reply::Bulk(b) => RespFrame::BulkString(b),
            Reply::Nil => RespFrame::Null,
            Reply::Integer(i) => RespFrame::Integer(i),
            Reply::Array(items) => {
                RespFrame::Array(items.into_iter().map(RespFrame::BulkString).collect())
            }
            Reply::Error(e) => RespFrame::Error(e),
        }
    }
}
