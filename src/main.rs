// src/main.rs

//! The main entry point for the HustGate server.

use anyhow::Result;
use hustgate::config::Config;
use hustgate::server;
use std::env;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("HustGate version {VERSION}");
        return Ok(());
    }

    // The single CLI flag: `-conf <dir>`, defaulting to `conf/` beside the
    // executable. The configuration document itself is `<dir>/ha.json`.
    let conf_dir = args
        .iter()
        .position(|arg| arg == "-conf")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_conf_dir);
    let config_path = conf_dir.join("ha.json");

    let config = match Config::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load configuration from \"{}\": {e:#}",
                config_path.display()
            );
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config, config_path).await {
        error!("Server runtime error: {e}");
        return Err(e);
    }

    Ok(())
}

fn default_conf_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conf")
}
