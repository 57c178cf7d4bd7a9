//! linerpc Daemon
//!
//! Serves the built-in `sayHello` and `add` methods over TCP.

use anyhow::Result;
use clap::Parser;
use linerpc_core::storage::ConfigStorage;
use linerpc_server::methods::register_builtin;
use linerpc_server::{MethodRegistry, RpcServer};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "linerpcd")]
#[command(about = "linerpc daemon - JSON-RPC over TCP", long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let storage = match &args.config {
        Some(path) => ConfigStorage::for_file(path),
        None => ConfigStorage::default_location()?,
    };
    let mut config = storage.load()?.server;
    if let Some(host) = args.host.clone() {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(level) = args.log_level.clone() {
        config.log_level = level;
    }
    config.validate()?;

    init_logging(&config.log_level, args.log_file.as_ref())?;

    tracing::info!("linerpc daemon starting...");
    tracing::info!("Config file: {}", storage.config_path().display());

    let mut registry = MethodRegistry::new();
    register_builtin(&mut registry);
    tracing::info!("Registered methods: {}", registry.method_names().join(", "));

    let server = Arc::new(RpcServer::new(registry, config));

    let mut server_handle = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down...");
            server.shutdown();
            server_handle.await??;
        }
        finished = &mut server_handle => {
            // The accept loop only returns on its own when binding fails.
            finished??;
        }
    }

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&PathBuf>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;

            // Write to both file and stdout
            use tracing_subscriber::fmt::writer::MakeWriterExt;
            let stdout_writer = std::io::stdout.with_max_level(tracing::Level::INFO);
            let file_writer = file.with_max_level(tracing::Level::DEBUG);

            tracing_subscriber::fmt()
                .with_writer(stdout_writer.and(file_writer))
                .with_env_filter(level)
                .with_ansi(false)
                .init();
            tracing::info!("Log file: {}", path.display());
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(level).init();
        }
    }
    Ok(())
}
