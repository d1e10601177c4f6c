// src/core/dispatch/mod.rs

//! The per-command fan-out and aggregation engine.
//!
//! Every RESP verb maps onto one of five replication patterns. The dispatcher
//! resolves the key's slot against the partition map's derived view, issues
//! the pattern's HTTP calls against the live replica pair, merges replies,
//! and appends a binlog record when a write reached only part of the pair.
//! Partition-map locks are never held across network I/O: hosts are cloned
//! out of the lock-free slot table before any call is made.

use crate::core::HustGateError;
use crate::core::backend::{BackendOp, BackendResponse, OpParams, ParamKey, Transport};
use crate::core::binlog::BinlogEngine;
use crate::core::routing::{PartitionMap, slot_of};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error};

pub struct Dispatcher {
    partition: Arc<PartitionMap>,
    transport: Arc<dyn Transport>,
    binlog: Arc<BinlogEngine>,
    /// Admission control: one permit per in-flight command (`Concurrency`).
    permits: Arc<Semaphore>,
    /// Deadline for one backend call.
    http_timeout: Duration,
    /// Deadline for one aggregation loop; replies past it count as failures.
    cmd_timeout: Duration,
}

/// A permit representing one admitted command, held from before fan-out
/// until the reply is written.
pub type AdmissionPermit = tokio::sync::OwnedSemaphorePermit;

impl Dispatcher {
    pub fn new(
        partition: Arc<PartitionMap>,
        transport: Arc<dyn Transport>,
        binlog: Arc<BinlogEngine>,
        concurrency: usize,
        http_timeout: Duration,
        slack: Duration,
    ) -> Self {
        Self {
            partition,
            transport,
            binlog,
            permits: Arc::new(Semaphore::new(concurrency)),
            http_timeout,
            cmd_timeout: http_timeout + slack,
        }
    }

    /// Acquires one admission token. Backpressure shows up here as latency,
    /// never as a connection reset.
    pub async fn admit(&self) -> Result<AdmissionPermit, HustGateError> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| HustGateError::Internal("admission semaphore closed".into()))
    }

    /// READ-FIRST-OK: try the live hosts sequentially, first 200 wins.
    pub async fn read_first_ok(
        &self,
        op: BackendOp,
        routing_key: &[u8],
        params: OpParams,
    ) -> BackendResponse {
        let hosts = self.partition.live_hosts(slot_of(routing_key));
        for host in &hosts {
            let response = self
                .transport
                .call(host, op, &params, None, self.http_timeout)
                .await;
            if response.is_ok() {
                return response;
            }
        }
        BackendResponse::nil()
    }

    /// READ-NEWEST: fan out in parallel, keep the 200 with the highest
    /// backend-reported version.
    pub async fn read_newest(
        &self,
        op: BackendOp,
        routing_key: &[u8],
        params: OpParams,
    ) -> BackendResponse {
        let hosts = self.partition.live_hosts(slot_of(routing_key));
        if hosts.is_empty() {
            return BackendResponse::nil();
        }
        let replies = self.fan_out(&hosts, op, &params, None).await;

        let mut best = BackendResponse::nil();
        for reply in replies.into_iter().flatten() {
            if reply.is_ok() && (!best.is_ok() || reply.version > best.version) {
                best = reply;
            }
        }
        best
    }

    /// WRITE-ALL: fan out in parallel; 200 if at least one replica took the
    /// write. A strictly partial success appends a binlog record replicating
    /// from one succeeded replica to one failed replica.
    pub async fn write_all(
        &self,
        op: BackendOp,
        routing_key: &[u8],
        params: OpParams,
        payload: Option<Bytes>,
    ) -> BackendResponse {
        let hosts = self.partition.live_hosts(slot_of(routing_key));
        if hosts.is_empty() {
            return BackendResponse::nil();
        }
        let replies = self.fan_out(&hosts, op, &params, payload.clone()).await;

        let mut first_success: Option<BackendResponse> = None;
        let mut first_failure: Option<&str> = None;
        let mut succeeded = 0usize;
        // Host declaration order keeps source/target choice deterministic
        // regardless of reply arrival order.
        for (host, reply) in hosts.iter().zip(&replies) {
            match reply {
                Some(reply) if reply.is_ok() => {
                    succeeded += 1;
                    if first_success.is_none() {
                        first_success = Some(reply.clone());
                    }
                }
                _ => {
                    if first_failure.is_none() {
                        first_failure = Some(host);
                    }
                }
            }
        }

        let Some(winner) = first_success else {
            // Nothing succeeded, so there is nothing to replicate from.
            return BackendResponse::nil();
        };

        if succeeded < hosts.len()
            && let Some(target) = first_failure
        {
            debug!(
                "Partial {op} ({succeeded}/{} replicas): binlogging {} -> {target}",
                hosts.len(),
                winner.host
            );
            if let Err(e) = self
                .binlog
                .append(&winner.host, target, op, params, payload)
                .await
            {
                error!("Binlog append for {target} failed: {e}");
            }
        }
        winner
    }

    /// COORD-WRITE: pick the live master (or the slave when only it lives),
    /// hand it the sibling's host so the backend can run its own sync, and
    /// return its reply verbatim.
    pub async fn coord_write(
        &self,
        op: BackendOp,
        routing_key: &[u8],
        mut params: OpParams,
    ) -> BackendResponse {
        let Some((chosen, sibling)) = self.partition.coord_pair(slot_of(routing_key)) else {
            return BackendResponse::nil();
        };
        params.push(ParamKey::Host, sibling.into_bytes());
        self.transport
            .call(&chosen, op, &params, None, self.http_timeout)
            .await
    }

    /// STAT-SCATTER: one live host per peer group, deduplicated; numeric
    /// bodies are summed. Any failed or missing reply yields the zero-value
    /// sentinel, since a partial sum would be silently wrong.
    pub async fn stat_scatter(&self, op: BackendOp, params: OpParams) -> BackendResponse {
        let targets = self.partition.stat_targets();
        if targets.is_empty() {
            return BackendResponse::nil();
        }
        let replies = self.fan_out(&targets, op, &params, None).await;

        let mut total: i64 = 0;
        for reply in &replies {
            match reply {
                Some(reply) if reply.is_ok() => {
                    total += std::str::from_utf8(&reply.body)
                        .ok()
                        .and_then(|s| s.trim().parse::<i64>().ok())
                        .unwrap_or(0);
                }
                _ => return BackendResponse::nil(),
            }
        }
        BackendResponse {
            host: String::new(),
            code: BackendResponse::HTTP_OK,
            version: 0,
            body: Bytes::from(total.to_string()),
        }
    }

    /// Issues one call per host on sibling tasks and joins them over a
    /// bounded channel of capacity `|hosts|`. The join is deadline-guarded:
    /// replies past `cmd_timeout` are dropped and reported as `None`, so a
    /// stuck backend can only stall a command, never wedge it.
    async fn fan_out(
        &self,
        hosts: &[String],
        op: BackendOp,
        params: &OpParams,
        body: Option<Bytes>,
    ) -> Vec<Option<BackendResponse>> {
        let (tx, mut rx) = mpsc::channel::<(usize, BackendResponse)>(hosts.len());
        for (index, host) in hosts.iter().enumerate() {
            let transport = self.transport.clone();
            let tx = tx.clone();
            let host = host.clone();
            let params = params.clone();
            let body = body.clone();
            let deadline = self.http_timeout;
            tokio::spawn(async move {
                let response = transport.call(&host, op, &params, body, deadline).await;
                let _ = tx.send((index, response)).await;
            });
        }
        drop(tx);

        let mut replies: Vec<Option<BackendResponse>> = vec![None; hosts.len()];
        let mut received = 0usize;
        let deadline = tokio::time::sleep(self.cmd_timeout);
        tokio::pin!(deadline);
        while received < hosts.len() {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some((index, response)) => {
                        replies[index] = Some(response);
                        received += 1;
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    debug!("Aggregation deadline hit for {op}; dropping late replies");
                    break;
                }
            }
        }
        replies
    }
}
