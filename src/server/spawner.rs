// src/server/spawner.rs

//! Spawns the gate's long-running background tasks. The binlog replay
//! workers are not spawned here; the engine starts one per target on demand.

use super::context::ServerContext;
use crate::core::routing::HealthChecker;

pub fn spawn_all(ctx: &mut ServerContext) {
    let state = &ctx.state;

    let checker = HealthChecker::new(
        state.partition.clone(),
        state.transport.clone(),
        state.config.health_cycle(),
        state.config.probe_timeout(),
    );
    let shutdown_rx = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        checker.run(shutdown_rx).await;
        Ok(())
    });
}
