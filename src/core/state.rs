// src/core/state.rs

//! Defines the central `ServerState` struct, holding all shared state.
//!
//! Everything here is constructed once during initialization and passed down
//! explicitly; there are no process-wide globals.

use crate::config::Config;
use crate::core::backend::Transport;
use crate::core::binlog::BinlogEngine;
use crate::core::dispatch::Dispatcher;
use crate::core::routing::PartitionMap;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ServerState {
    /// The configuration loaded at boot. Liveness lives in the partition
    /// map, not here; the config itself is immutable for the process.
    pub config: Config,
    /// The path the partition table is reloaded from on SIGHUP.
    pub config_path: PathBuf,
    pub partition: Arc<PartitionMap>,
    pub transport: Arc<dyn Transport>,
    pub binlog: Arc<BinlogEngine>,
    pub dispatcher: Arc<Dispatcher>,
}
