// tests/common/mod.rs

//! Shared test fixtures: a scripted transport and partition-map builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hustgate::core::backend::{BackendOp, BackendResponse, OpParams, Transport};
use hustgate::core::binlog::BinlogEngine;
use hustgate::core::dispatch::Dispatcher;
use hustgate::core::routing::{BackendPair, BackendSlot, PartitionMap, PeerGroup};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub host: String,
    pub op: BackendOp,
    pub params: OpParams,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct Scripted {
    pub code: u16,
    pub version: u64,
    pub body: Bytes,
}

/// A transport whose replies are scripted per host. Each host holds a queue
/// of replies; the last one is sticky. Hosts with no script fail with the
/// transport-error sentinel (`code == 0`).
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<CallRecord>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes `host` reply with the given status from now on.
    pub fn respond(&self, host: &str, code: u16, version: u64, body: &[u8]) {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.entry(host.to_string()).or_default();
        queue.clear();
        queue.push_back(Scripted {
            code,
            version,
            body: Bytes::copy_from_slice(body),
        });
    }

    /// Queues a one-shot reply ahead of whatever the host replies afterwards.
    pub fn respond_once(&self, host: &str, code: u16, version: u64, body: &[u8]) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.to_string())
            .or_default()
            .push_front(Scripted {
                code,
                version,
                body: Bytes::copy_from_slice(body),
            });
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, host: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.host == host)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(
        &self,
        host: &str,
        op: BackendOp,
        params: &OpParams,
        body: Option<Bytes>,
        _deadline: Duration,
    ) -> BackendResponse {
        self.calls.lock().unwrap().push(CallRecord {
            host: host.to_string(),
            op,
            params: params.clone(),
            body,
        });
        let mut scripts = self.scripts.lock().unwrap();
        let Some(queue) = scripts.get_mut(host) else {
            return BackendResponse {
                host: host.to_string(),
                ..Default::default()
            };
        };
        let scripted = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(Scripted {
                code: 0,
                version: 0,
                body: Bytes::new(),
            })
        };
        BackendResponse {
            host: host.to_string(),
            code: scripted.code,
            version: scripted.version,
            body: scripted.body,
        }
    }
}

pub fn slot_entry(host: &str, alive: bool) -> BackendSlot {
    BackendSlot {
        host: host.to_string(),
        alive,
    }
}

/// One group owning every slot, with the given master/slave liveness.
pub fn single_group(master: (&str, bool), slave: (&str, bool)) -> Vec<PeerGroup> {
    vec![PeerGroup {
        region: [0, 1024],
        backends: BackendPair {
            master: slot_entry(master.0, master.1),
            slave: slot_entry(slave.0, slave.1),
        },
    }]
}

pub fn two_groups(
    first: ((&str, bool), (&str, bool)),
    second: ((&str, bool), (&str, bool)),
) -> Vec<PeerGroup> {
    vec![
        PeerGroup {
            region: [0, 512],
            backends: BackendPair {
                master: slot_entry(first.0.0, first.0.1),
                slave: slot_entry(first.1.0, first.1.1),
            },
        },
        PeerGroup {
            region: [512, 1024],
            backends: BackendPair {
                master: slot_entry(second.0.0, second.0.1),
                slave: slot_entry(second.1.0, second.1.1),
            },
        },
    ]
}

pub struct Harness {
    pub partition: Arc<PartitionMap>,
    pub transport: Arc<MockTransport>,
    pub binlog: Arc<BinlogEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown_tx: broadcast::Sender<()>,
    // Held so the binlog directory outlives the test body.
    pub binlog_dir: tempfile::TempDir,
}

/// Builds the full dispatch stack over a scripted transport and a fresh
/// binlog directory.
pub async fn harness(groups: Vec<PeerGroup>, concurrency: usize) -> Harness {
    let partition = Arc::new(PartitionMap::from_groups(groups).unwrap());
    let transport = MockTransport::new();
    let binlog_dir = tempfile::tempdir().unwrap();
    let (shutdown_tx, _) = broadcast::channel(1);
    let binlog = BinlogEngine::open(
        binlog_dir.path().to_path_buf(),
        Duration::from_millis(20),
        Duration::from_millis(200),
        partition.clone(),
        transport.clone(),
        shutdown_tx.clone(),
    )
    .await
    .unwrap();
    let dispatcher = Arc::new(Dispatcher::new(
        partition.clone(),
        transport.clone(),
        binlog.clone(),
        concurrency,
        Duration::from_millis(200),
        Duration::from_millis(100),
    ));
    Harness {
        partition,
        transport,
        binlog,
        dispatcher,
        shutdown_tx,
        binlog_dir,
    }
}

/// Polls until the binlog has no pending records or the deadline passes.
pub async fn wait_for_drain(binlog: &BinlogEngine, deadline: Duration) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if binlog.total_pending().await == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
