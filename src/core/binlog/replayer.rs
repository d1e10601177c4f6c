// src/core/binlog/replayer.rs

use super::engine::BinlogEngine;
use super::record::BinlogRecord;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

/// The replay loop for one target host.
///
/// Records arrive in append order and are retried until the target returns
/// HTTP 200, so delivery is at-least-once and per-key order is preserved.
/// While the partition map reports the target dead the worker parks on the
/// map's rebuild channel rather than burning retries.
pub(super) async fn run_worker(
    engine: Arc<BinlogEngine>,
    target: String,
    mut rx: mpsc::UnboundedReceiver<BinlogRecord>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut rebuild_rx = engine.partition.subscribe_rebuilds();

    loop {
        let record = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return,
            maybe = rx.recv() => match maybe {
                Some(record) => record,
                None => return,
            },
        };

        loop {
            while !engine.partition.is_alive(&target) {
                debug!("Binlog worker for {target} waiting: target is down");
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => return,
                    changed = rebuild_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let response = engine
                .transport
                .call(
                    &target,
                    record.op,
                    &record.params,
                    record.payload.clone(),
                    engine.call_timeout,
                )
                .await;

            if response.is_ok() {
                if let Err(e) = engine.ack(&target, record.id).await {
                    error!("Failed to ack binlog record {} for {target}: {e}", record.id);
                }
                break;
            }

            warn!(
                "Binlog replay of {} (record {}) against {target} failed with code {}; retrying",
                record.op, record.id, response.code
            );
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(engine.retry_interval) => {}
            }
        }
    }
}
