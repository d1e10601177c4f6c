// src/core/binlog/record.rs

use crate::core::backend::{BackendOp, OpParams};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One replicable operation observed to have reached only part of a slot's
/// replica set. `source` is a backend that took the write, `target` the one
/// that must still receive it; only `target` is contacted on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinlogRecord {
    /// Monotonic per-target id, assigned at append time.
    pub id: u64,
    pub source: String,
    pub target: String,
    pub op: BackendOp,
    pub params: OpParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Bytes>,
    /// Unix seconds at enqueue time.
    pub enqueued_at: u64,
}

/// One line of a per-target binlog file. Acks are appended rather than
/// rewriting the log; the file is truncated once every record is acked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum BinlogEntry {
    Record(BinlogRecord),
    Ack { id: u64 },
}
