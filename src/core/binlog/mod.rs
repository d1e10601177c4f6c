// src/core/binlog/mod.rs

//! The durable, per-target retry queue that replicates partial writes.
//!
//! When a WRITE-ALL fan-out succeeds on some replicas and fails on others,
//! the dispatcher appends a record here. Records are durable before the
//! append returns, grouped by target host, and replayed in append order by
//! one worker per target until the target acknowledges with HTTP 200.

mod engine;
mod record;
mod replayer;

pub use engine::BinlogEngine;
pub use record::{BinlogEntry, BinlogRecord};
