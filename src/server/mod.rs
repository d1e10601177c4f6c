// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

mod connection_loop;
mod context;
mod initialization;
mod spawner;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(config: Config, config_path: PathBuf) -> Result<()> {
    // 1. Initialize server state, partition map, binlog recovery, listener.
    let mut server_context = initialization::setup(config, config_path).await?;

    // 2. Spawn the long-running background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Run the accept loop until shutdown.
    connection_loop::run(server_context).await;

    Ok(())
}
