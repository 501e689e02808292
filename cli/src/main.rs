//! chainrelay CLI: drive the RPC client façade from the terminal.
//!
//! Usage:
//! ```bash
//! # Send a JSON-RPC call, falling back to a second endpoint
//! chainrelay call --url https://cloudflare-eth.com --method eth_blockNumber \
//!     --fallback https://eth.llamarpc.com
//!
//! # Several calls in one batch
//! chainrelay batch --url https://cloudflare-eth.com --methods eth_chainId,eth_blockNumber
//!
//! # Print the default client config
//! chainrelay config
//! ```

use std::env;
use std::process;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing_subscriber::EnvFilter;

use chainrelay_core::{BatchRequest, ClientConfig, RpcClient, RpcTransport};
use chainrelay_http::HttpRpcClient;

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "call" => cmd_call(&args[2..]).await,
        "batch" => cmd_batch(&args[2..]).await,
        "test" => cmd_test(&args[2..]).await,
        "config" => cmd_config(),
        "version" | "--version" | "-V" => {
            println!("chainrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("chainrelay {}", env!("CARGO_PKG_VERSION"));
    println!("Rate-limited, cached, failover JSON-RPC calls\n");
    println!("USAGE:");
    println!("    chainrelay <COMMAND>\n");
    println!("COMMANDS:");
    println!("    call       Send one JSON-RPC call");
    println!("    batch      Send several calls as one batch");
    println!("    test       Test an RPC endpoint (latency, chain id, block number)");
    println!("    config     Print the default client config as JSON");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("FLAGS:");
    println!("    --url <URL>         RPC endpoint URL  [required]");
    println!("    --method <NAME>     Method for `call`");
    println!("    --params <JSON>     JSON array of params for `call`  [default: []]");
    println!("    --methods <A,B,..>  Comma-separated methods for `batch`");
    println!("    --fallback <URL>    Fallback endpoint, repeatable, tried in order");
    println!("    --config <FILE>     JSON client config (see `chainrelay config`)\n");
    println!("Set RUST_LOG=chainrelay_core=debug to watch cache, retry and fallback decisions.");
}

async fn cmd_call(args: &[String]) -> Result<(), String> {
    let method = parse_flag(args, "--method").ok_or("--method is required")?;
    let params = match parse_flag(args, "--params") {
        Some(raw) => parse_params(&raw)?,
        None => vec![],
    };
    let (client, primary) = build(args)?;

    let result = client
        .make_request(primary.as_ref(), &method, params)
        .await
        .map_err(|e| e.to_string())?;

    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
    Ok(())
}

async fn cmd_batch(args: &[String]) -> Result<(), String> {
    let methods = parse_flag(args, "--methods").ok_or("--methods is required")?;
    let requests: Vec<BatchRequest> = methods
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| BatchRequest::new(m, vec![]))
        .collect();
    let (client, primary) = build(args)?;

    let results = client.batch_requests(primary.as_ref(), requests.clone()).await;
    for (req, result) in requests.iter().zip(results) {
        match result {
            Ok(value) => println!("{:<28} {value}", req.method),
            Err(e) => println!("{:<28} error: {e}", req.method),
        }
    }
    Ok(())
}

async fn cmd_test(args: &[String]) -> Result<(), String> {
    let url = parse_flag(args, "--url").ok_or("--url is required")?;
    let node = HttpRpcClient::default_for(&url).map_err(|e| e.to_string())?;
    let client = RpcClient::new(ClientConfig::default()).map_err(|e| e.to_string())?;

    println!("Testing {url}...");

    let start = Instant::now();
    let block: String = client
        .call(&node, "eth_blockNumber", vec![])
        .await
        .map_err(|e| e.to_string())?;
    let latency = start.elapsed();
    let chain_id = node.chain_id().await.map_err(|e| e.to_string())?;

    let block_num = u64::from_str_radix(block.trim_start_matches("0x"), 16).unwrap_or(0);

    println!("  Status:       OK");
    println!("  Chain id:     {chain_id}");
    println!("  Block number: {block_num} ({block})");
    println!("  Latency:      {}ms", latency.as_millis());
    println!("  Batching:     {}", node.supports_batch());

    Ok(())
}

fn cmd_config() -> Result<(), String> {
    let json = serde_json::to_string_pretty(&ClientConfig::default()).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

/// Build the client (with fallbacks registered) and the primary provider.
fn build(args: &[String]) -> Result<(RpcClient, Arc<dyn RpcTransport>), String> {
    let url = parse_flag(args, "--url").ok_or("--url is required")?;
    let config = match parse_flag(args, "--config") {
        Some(path) => ClientConfig::from_json_file(&path).map_err(|e| format!("{path}: {e}"))?,
        None => ClientConfig::default(),
    };

    let client = RpcClient::new(config).map_err(|e| e.to_string())?;
    for fallback in parse_all_flags(args, "--fallback") {
        let node = HttpRpcClient::default_for(fallback).map_err(|e| e.to_string())?;
        client.add_fallback_provider(Arc::new(node));
    }

    tracing::info!(
        url = %url,
        fallbacks = client.fallback_count(),
        rps = client.config().max_requests_per_second,
        "client ready"
    );
    let primary = HttpRpcClient::default_for(url).map_err(|e| e.to_string())?;
    Ok((client, Arc::new(primary)))
}

fn parse_params(raw: &str) -> Result<Vec<Value>, String> {
    match serde_json::from_str::<Value>(raw).map_err(|e| format!("--params: {e}"))? {
        Value::Array(items) => Ok(items),
        single => Ok(vec![single]),
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn parse_all_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
        .collect()
}
