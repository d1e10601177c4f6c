// src/server/initialization.rs

//! Handles the complete server initialization process: partition map from
//! config, transport, binlog recovery, dispatcher, and the TCP listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::backend::{HttpTransport, Transport};
use crate::core::binlog::BinlogEngine;
use crate::core::dispatch::Dispatcher;
use crate::core::routing::PartitionMap;
use crate::core::state::ServerState;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tracing::info;

pub async fn setup(config: Config, config_path: PathBuf) -> Result<ServerContext> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let partition = Arc::new(
        PartitionMap::from_groups(config.peers.clone())
            .context("invalid peer table in configuration")?,
    );
    info!(
        "Partition map initialized: {} peer group(s) over 1024 slots",
        config.peers.len()
    );

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(config.health_check.probe_path.clone()));

    let binlog = BinlogEngine::open(
        PathBuf::from(&config.binlog.dir),
        config.binlog_retry_interval(),
        config.http_timeout(),
        partition.clone(),
        transport.clone(),
        shutdown_tx.clone(),
    )
    .await
    .context("binlog recovery failed")?;
    let pending = binlog.total_pending().await;
    if pending > 0 {
        info!("Binlog recovery found {pending} pending record(s)");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        partition.clone(),
        transport.clone(),
        binlog.clone(),
        config.concurrency,
        config.http_timeout(),
        config.aggregation_slack(),
    ));

    let listener = TcpListener::bind((config.listen.host.as_str(), config.listen.port))
        .await
        .with_context(|| {
            format!(
                "could not bind {}:{}",
                config.listen.host, config.listen.port
            )
        })?;
    info!(
        "HustGate listening on {}:{}",
        config.listen.host, config.listen.port
    );

    let connection_permits = Arc::new(Semaphore::new(config.max_clients));
    let state = Arc::new(ServerState {
        config,
        config_path,
        partition,
        transport,
        binlog,
        dispatcher,
    });

    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}
