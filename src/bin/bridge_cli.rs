/// bridge_cli - send one command to a backend and print the response
///
/// Timeouts and limits honour the `SWAP_BRIDGE_*` environment variables.

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::sync::Arc;
use swap_bridge_lib::{init_logging, Bridge, BridgeConfig, Store, TcpTransport};
use tracing::info;

/// Send a single command to a swap backend over TCP
#[derive(Parser, Debug)]
#[command(name = "bridge_cli")]
#[command(about = "Send one command to a swap backend and print the JSON response")]
#[command(version)]
struct Args {
    /// Backend host
    #[arg(long, env = "SWAP_BRIDGE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Backend port
    #[arg(long, env = "SWAP_BRIDGE_PORT")]
    port: u16,

    /// Command name, e.g. get_balance
    command: String,

    /// Command arguments as a JSON document
    #[arg(value_parser = parse_json)]
    args: Option<Value>,
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("arguments must be valid JSON: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();

    let config = BridgeConfig::default()
        .apply_env()
        .context("invalid SWAP_BRIDGE_* environment")?;

    info!("Connecting to {}:{}", args.host, args.port);
    let transport = TcpTransport::builder(args.host.as_str(), args.port)
        .timeout(config.connect_timeout_duration())
        .max_frame_len(config.max_frame_len)
        .connect()
        .await
        .with_context(|| format!("could not reach backend at {}:{}", args.host, args.port))?;

    let bridge = Bridge::start(Arc::new(transport), Store::new(), config)?;

    let result = bridge.invoke(&args.command, args.args).await;
    let _ = bridge.shutdown().await;

    let response = result.with_context(|| format!("'{}' failed", args.command))?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
