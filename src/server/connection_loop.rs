// src/server/connection_loop.rs

//! Contains the main accept loop and graceful-shutdown handling.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Waits for SIGINT or SIGTERM.
#[cfg(unix)]
async fn await_shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to create SIGINT stream");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to create SIGTERM stream");
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }
}

#[cfg(not(unix))]
async fn await_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Ctrl-C received, initiating graceful shutdown.");
}

pub async fn run(mut ctx: ServerContext) {
    let mut client_tasks = JoinSet::new();

    #[cfg(unix)]
    let mut sighup = signal(SignalKind::hangup()).expect("failed to create SIGHUP stream");

    loop {
        #[cfg(unix)]
        let reload_signal = sighup.recv();
        #[cfg(not(unix))]
        let reload_signal = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = await_shutdown_signal() => break,

            // The partition table can be reloaded in place without a restart.
            _ = reload_signal => {
                match ctx.state.partition.reload(&ctx.state.config_path) {
                    Ok(()) => info!("SIGHUP: partition table reloaded"),
                    Err(e) => warn!("SIGHUP: partition table reload rejected, keeping prior view: {e}"),
                }
            },

            // A failed background task (health checker) is fatal.
            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => info!("A background task completed."),
                    Ok(Err(e)) => { error!("CRITICAL: background task failed: {e}. Shutting down."); break; }
                    Err(e) => { error!("CRITICAL: background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                            warn!("Rejecting connection from {addr}: max clients reached");
                            continue;
                        };
                        debug!("Accepted new connection from {addr}");
                        let state = ctx.state.clone();
                        let shutdown_rx = ctx.shutdown_tx.subscribe();
                        client_tasks.spawn(async move {
                            let _permit = permit;
                            let mut handler = ConnectionHandler::new(socket, addr, state, shutdown_rx);
                            if let Err(e) = handler.run().await {
                                warn!("Connection from {addr} terminated unexpectedly: {e}");
                            }
                        });
                    }
                    Err(e) => error!("Failed to accept connection: {e}"),
                }
            },

            // Reap finished connection tasks so the set does not grow.
            Some(_) = client_tasks.join_next(), if !client_tasks.is_empty() => {},
        }
    }

    info!("Shutting down: signalling tasks and draining connections.");
    let _ = ctx.shutdown_tx.send(());

    let drain = async {
        while client_tasks.join_next().await.is_some() {}
        while ctx.background_tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
        warn!("Shutdown drain timed out; aborting remaining tasks.");
        client_tasks.abort_all();
        ctx.background_tasks.abort_all();
    }
    info!("Shutdown complete.");
}
