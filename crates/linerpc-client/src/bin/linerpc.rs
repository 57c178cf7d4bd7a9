//! linerpc command line client

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linerpc_client::RpcClient;
use linerpc_core::storage::ConfigStorage;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "linerpc")]
#[command(about = "Call methods on a linerpc server", long_about = None)]
struct Args {
    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add two integers
    Add {
        #[arg(allow_negative_numbers = true)]
        a: i64,
        #[arg(allow_negative_numbers = true)]
        b: i64,
    },
    /// Ask the server to greet NAME
    Hello { name: String },
    /// Call any method with JSON params
    Call {
        method: String,
        /// Params as a JSON array or object
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(&args.log_level)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rpc err: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let storage = match &args.config {
        Some(path) => ConfigStorage::for_file(path),
        None => ConfigStorage::default_location()?,
    };
    let mut config = storage.load()?.client;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    let client = RpcClient::with_config(&config);
    tracing::debug!("Using server {}", client.addr());

    match args.command {
        Command::Add { a, b } => {
            let sum = client.add(a, b).await?;
            println!("sum = {}", sum);
        }
        Command::Hello { name } => {
            let greeting = client.say_hello(&name).await?;
            println!("{}", greeting);
        }
        Command::Call { method, params } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("params are not valid JSON")?,
                None => Value::Array(Vec::new()),
            };
            let result = client.call(&method, params).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
