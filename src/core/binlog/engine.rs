// src/core/binlog/engine.rs

use super::record::{BinlogEntry, BinlogRecord};
use super::replayer;
use crate::core::HustGateError;
use crate::core::backend::{BackendOp, OpParams, Transport};
use crate::core::routing::PartitionMap;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{info, warn};

/// The open log file of one target plus the counters guarded with it.
/// `pending` and `next_id` live under the same mutex as the file so the
/// drained-queue truncation cannot race a concurrent append.
struct TargetLog {
    file: File,
    pending: u64,
    next_id: u64,
}

struct TargetState {
    log: Mutex<TargetLog>,
    tx: mpsc::UnboundedSender<BinlogRecord>,
}

/// The binlog engine: one durable append-only file and one replay worker per
/// target host.
pub struct BinlogEngine {
    dir: PathBuf,
    pub(super) retry_interval: Duration,
    pub(super) call_timeout: Duration,
    pub(super) partition: Arc<PartitionMap>,
    pub(super) transport: Arc<dyn Transport>,
    shutdown_tx: broadcast::Sender<()>,
    targets: Mutex<HashMap<String, Arc<TargetState>>>,
}

impl BinlogEngine {
    /// Opens the binlog directory, replays any logs left by a previous run,
    /// and starts replay workers for the targets that still have pending
    /// records.
    pub async fn open(
        dir: PathBuf,
        retry_interval: Duration,
        call_timeout: Duration,
        partition: Arc<PartitionMap>,
        transport: Arc<dyn Transport>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Result<Arc<Self>, HustGateError> {
        tokio::fs::create_dir_all(&dir).await?;
        let engine = Arc::new(Self {
            dir,
            retry_interval,
            call_timeout,
            partition,
            transport,
            shutdown_tx,
            targets: Mutex::new(HashMap::new()),
        });
        engine.recover().await?;
        Ok(engine)
    }

    /// Durably appends one record for `target` and hands it to the target's
    /// replay worker. The record has hit disk before this returns.
    pub async fn append(
        self: &Arc<Self>,
        source: &str,
        target: &str,
        op: BackendOp,
        params: OpParams,
        payload: Option<Bytes>,
    ) -> Result<(), HustGateError> {
        let state = self.target_state(target).await?;
        let mut log = state.log.lock().await;
        let record = BinlogRecord {
            id: log.next_id,
            source: source.to_string(),
            target: target.to_string(),
            op,
            params,
            payload,
            enqueued_at: unix_now(),
        };
        write_entry(&mut log.file, &BinlogEntry::Record(record.clone())).await?;
        log.next_id += 1;
        log.pending += 1;
        drop(log);

        // The worker owns the receiving side for the lifetime of the engine;
        // a send failure means we are shutting down.
        let _ = state.tx.send(record);
        Ok(())
    }

    /// Durably acknowledges one replayed record. When the ack empties the
    /// target's queue the log file is truncated instead.
    pub(super) async fn ack(&self, target: &str, id: u64) -> Result<(), HustGateError> {
        let Some(state) = self.targets.lock().await.get(target).cloned() else {
            return Ok(());
        };
        let mut log = state.log.lock().await;
        if log.pending <= 1 {
            log.file.set_len(0).await?;
            log.file.sync_all().await?;
        } else {
            write_entry(&mut log.file, &BinlogEntry::Ack { id }).await?;
        }
        log.pending = log.pending.saturating_sub(1);
        Ok(())
    }

    /// Records still awaiting acknowledgement for one target.
    pub async fn pending_for(&self, target: &str) -> u64 {
        match self.targets.lock().await.get(target) {
            Some(state) => state.log.lock().await.pending,
            None => 0,
        }
    }

    /// Records still awaiting acknowledgement across all targets.
    pub async fn total_pending(&self) -> u64 {
        let states: Vec<_> = self.targets.lock().await.values().cloned().collect();
        let mut total = 0;
        for state in states {
            total += state.log.lock().await.pending;
        }
        total
    }

    async fn target_state(
        self: &Arc<Self>,
        target: &str,
    ) -> Result<Arc<TargetState>, HustGateError> {
        let mut targets = self.targets.lock().await;
        if let Some(state) = targets.get(target) {
            return Ok(state.clone());
        }
        let state = self
            .start_target(target.to_string(), 0, 1, Vec::new())
            .await?;
        targets.insert(target.to_string(), state.clone());
        Ok(state)
    }

    /// Opens (or creates) the log file for `target`, spawns its replay
    /// worker, and feeds it any backlog recovered from disk.
    async fn start_target(
        self: &Arc<Self>,
        target: String,
        pending: u64,
        next_id: u64,
        backlog: Vec<BinlogRecord>,
    ) -> Result<Arc<TargetState>, HustGateError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(&target))
            .await?;
        let (tx, rx) = mpsc::unbounded_channel();
        for record in backlog {
            let _ = tx.send(record);
        }
        let state = Arc::new(TargetState {
            log: Mutex::new(TargetLog {
                file,
                pending,
                next_id,
            }),
            tx,
        });
        tokio::spawn(replayer::run_worker(
            self.clone(),
            target,
            rx,
            self.shutdown_tx.subscribe(),
        ));
        Ok(state)
    }

    async fn recover(self: &Arc<Self>) -> Result<(), HustGateError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("binlog") {
                continue;
            }
            let raw = tokio::fs::read(&path).await?;
            let (backlog, next_id) = parse_log(&raw, &path)?;
            let Some(target) = backlog.first().map(|r| r.target.clone()) else {
                // Fully acked log from a previous run.
                tokio::fs::remove_file(&path).await?;
                continue;
            };
            info!(
                "Binlog recovery: {} pending record(s) for {target}",
                backlog.len()
            );
            // Compact on recovery: rewrite the file with just the survivors.
            let mut lines = Vec::new();
            for record in &backlog {
                lines.extend_from_slice(&serde_json::to_vec(&BinlogEntry::Record(
                    record.clone(),
                ))?);
                lines.push(b'\n');
            }
            tokio::fs::write(&path, &lines).await?;

            let pending = backlog.len() as u64;
            let state = self
                .start_target(target.clone(), pending, next_id, backlog)
                .await?;
            self.targets.lock().await.insert(target, state);
        }
        Ok(())
    }

    fn log_path(&self, target: &str) -> PathBuf {
        let sanitized: String = target
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.binlog"))
    }
}

/// Replays one log file into the surviving records, in append order, and the
/// next id to assign. Truncated or garbled trailing lines are tolerated: a
/// crash mid-append may leave one, and the record it would have described was
/// never acknowledged to the dispatcher as durable.
fn parse_log(
    raw: &[u8],
    path: &std::path::Path,
) -> Result<(Vec<BinlogRecord>, u64), HustGateError> {
    let mut records: Vec<BinlogRecord> = Vec::new();
    let mut next_id = 1;
    for line in raw.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<BinlogEntry>(line) {
            Ok(BinlogEntry::Record(record)) => {
                next_id = next_id.max(record.id + 1);
                records.push(record);
            }
            Ok(BinlogEntry::Ack { id }) => {
                records.retain(|r| r.id != id);
            }
            Err(e) => {
                warn!(
                    "Skipping unparsable binlog line in {}: {e}",
                    path.display()
                );
            }
        }
    }
    Ok((records, next_id))
}

async fn write_entry(file: &mut File, entry: &BinlogEntry) -> Result<(), HustGateError> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await?;
    // The entry must be on disk before the caller is told it is.
    file.sync_all().await?;
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
