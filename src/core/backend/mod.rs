// src/core/backend/mod.rs

//! The HTTP face of a HustDB backend: opcode-to-endpoint mapping, typed
//! request parameters, and the transport seam the dispatcher and binlog
//! replayer call through.

mod client;

pub use client::{HttpTransport, Transport};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Every backend operation the gate issues, each mapping to one endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BackendOp {
    Get,
    Get2,
    Put,
    Exists,
    Del,
    Hget,
    Hset,
    Hexists,
    Hdel,
    Hincrby,
    Sadd,
    Sismember,
    Srem,
    Zadd,
    Zscore,
    Zrem,
    Zrangebyrank,
    Zrangebyscore,
    Stat,
    Alive,
}

impl BackendOp {
    /// The URL path of the endpoint implementing this operation. The liveness
    /// probe path is resolved by the transport, which may override it from
    /// configuration.
    pub fn path(&self) -> &'static str {
        match self {
            BackendOp::Get => "/hustdb/get",
            BackendOp::Get2 => "/hustdb/get2",
            BackendOp::Put => "/hustdb/put",
            BackendOp::Exists => "/hustdb/exist",
            BackendOp::Del => "/hustdb/del",
            BackendOp::Hget => "/hustdb/hget",
            BackendOp::Hset => "/hustdb/hset",
            BackendOp::Hexists => "/hustdb/hexist",
            BackendOp::Hdel => "/hustdb/hdel",
            BackendOp::Hincrby => "/hustdb/hincrby",
            BackendOp::Sadd => "/hustdb/sadd",
            BackendOp::Sismember => "/hustdb/sismember",
            BackendOp::Srem => "/hustdb/srem",
            BackendOp::Zadd => "/hustdb/zadd",
            BackendOp::Zscore => "/hustdb/zscore",
            BackendOp::Zrem => "/hustdb/zrem",
            BackendOp::Zrangebyrank => "/hustdb/zrangebyrank",
            BackendOp::Zrangebyscore => "/hustdb/zrangebyscore",
            BackendOp::Stat => "/hustdb/stat",
            BackendOp::Alive => "/status.html",
        }
    }
}

/// The closed set of query-string parameter names a backend accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParamKey {
    Key,
    Tb,
    Val,
    Ttl,
    Score,
    Opt,
    Host,
    Min,
    Max,
    Offset,
    Size,
    Noval,
}

/// A typed, ordered small map of request parameters. Values are raw bytes;
/// the transport percent-encodes them into the query string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpParams {
    pairs: Vec<(ParamKey, Bytes)>,
}

impl OpParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ParamKey, value: impl Into<Bytes>) -> Self {
        self.push(key, value);
        self
    }

    /// Sets a parameter, replacing any prior value under the same key.
    pub fn push(&mut self, key: ParamKey, value: impl Into<Bytes>) {
        let value = value.into();
        if let Some(entry) = self.pairs.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.pairs.push((key, value));
        }
    }

    pub fn get(&self, key: ParamKey) -> Option<&Bytes> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(ParamKey, Bytes)> {
        self.pairs.iter()
    }
}

/// One backend's reply to one HTTP call.
///
/// `code` is the HTTP status; transport failures and deadline overruns are
/// reported as `code == 0` so aggregation treats them uniformly as failures.
/// `version` carries the backend's `X-Version` header, 0 when absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub host: String,
    pub code: u16,
    pub version: u64,
    pub body: Bytes,
}

impl BackendResponse {
    pub const HTTP_OK: u16 = 200;

    /// The "nil" sentinel returned without contacting any backend.
    pub fn nil() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.code == Self::HTTP_OK
    }
}
