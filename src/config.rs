// src/config.rs

//! Manages the gate's configuration: a single JSON document (`ha.json`)
//! describing timeouts, the health-check cadence, the binlog, admission
//! limits, and the peer table.

use crate::core::routing::PeerGroup;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpConfig {
    /// Deadline for one backend HTTP call, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra time the aggregation loop waits past the per-call deadline.
    #[serde(default = "default_slack_secs")]
    pub slack_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            slack_secs: default_slack_secs(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthCheckConfig {
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Probe endpoint; HTTP 200 means alive, anything else means dead.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_path: default_probe_path(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BinlogConfig {
    #[serde(default = "default_binlog_dir")]
    pub dir: String,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl Default for BinlogConfig {
    fn default() -> Self {
        Self {
            dir: default_binlog_dir(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub binlog: BinlogConfig,
    /// Admission control: commands concurrently in fan-out.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub peers: Vec<PeerGroup>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config: Config = serde_json::from_slice(&raw)
            .with_context(|| format!("could not parse config file {}", path.display()))?;
        if config.peers.is_empty() {
            anyhow::bail!("config has an empty peer table");
        }
        if config.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn aggregation_slack(&self) -> Duration {
        Duration::from_secs(self.http.slack_secs)
    }

    pub fn health_cycle(&self) -> Duration {
        Duration::from_secs(self.health_check.cycle_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check.probe_timeout_secs)
    }

    pub fn binlog_retry_interval(&self) -> Duration {
        Duration::from_secs(self.binlog.retry_interval_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    55555
}
fn default_http_timeout_secs() -> u64 {
    2
}
fn default_slack_secs() -> u64 {
    1
}
fn default_cycle_secs() -> u64 {
    5
}
fn default_probe_timeout_secs() -> u64 {
    5
}
fn default_probe_path() -> String {
    "/status.html".to_string()
}
fn default_binlog_dir() -> String {
    "binlog".to_string()
}
fn default_retry_interval_secs() -> u64 {
    2
}
fn default_concurrency() -> usize {
    512
}
fn default_max_clients() -> usize {
    10000
}
fn default_log_level() -> String {
    "info".to_string()
}
