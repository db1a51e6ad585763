use std::io::Write;

use anyhow::Context;
use clap::Parser;
use serde_json::{json, Value};
use tracing::info;
use tycho_rpc_batch::{BlockScanner, HttpBatchTransport, RPCRetryConfig, ScanConfig};

/// Fetches a range of blocks from an Ethereum node using batched JSON-RPC calls
///
/// Every selected block is printed to stdout as one JSON object per line.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct CliArgs {
    /// Ethereum node client rpc url
    #[clap(long, env = "RPC_URL")]
    rpc_url: String,

    /// First block of the range (inclusive)
    #[clap(long)]
    start_block: u64,

    /// Last block of the range (inclusive)
    #[clap(long)]
    end_block: u64,

    /// Number of consecutive blocks covered by one batch request
    #[clap(long, default_value = "100")]
    batch_size: usize,

    /// Only fetch every n-th block of each batch, counting from the batch's first block
    #[clap(long, default_value = "1")]
    block_interval: usize,

    /// How often a failed call is retried before giving up
    #[clap(long, default_value = "10")]
    max_retries: usize,

    /// Backoff scale in milliseconds; the n-th retry waits about base_delay_ms * 2^n
    #[clap(long, default_value = "50")]
    base_delay_ms: u64,

    /// Include full transaction objects instead of only their hashes
    #[clap(long)]
    full_transactions: bool,

    /// Enable verbose logging.
    #[clap(long)]
    verbose: bool,
}

impl CliArgs {
    fn validate(&self) -> Result<(), String> {
        if self.start_block > self.end_block {
            return Err("start_block must not be greater than end_block".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero".to_string());
        }
        if self.block_interval == 0 {
            return Err("block_interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    args.validate().map_err(anyhow::Error::msg)?;

    // Logs go to stderr, stdout only carries block data
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set up logging subscriber: {e}"))?;

    let transport = HttpBatchTransport::new(&args.rpc_url)?;
    let scanner = BlockScanner::from_config(
        &transport,
        &ScanConfig::new(args.batch_size, args.block_interval),
        &RPCRetryConfig::new(args.max_retries, args.base_delay_ms),
    );

    info!(
        start_block = args.start_block,
        end_block = args.end_block,
        batch_size = args.batch_size,
        block_interval = args.block_interval,
        "Scanning blocks"
    );

    let full_transactions = args.full_transactions;
    let mut stdout = std::io::stdout().lock();
    let mut fetched = 0usize;
    for chunk in scanner.chunks(args.start_block, args.end_block)? {
        let blocks: Vec<(u64, Value)> = scanner
            .fetch_chunk(&chunk, "eth_getBlockByNumber", |block| {
                (format!("0x{block:x}"), full_transactions)
            })
            .await?;

        for (number, block) in blocks {
            writeln!(stdout, "{}", json!({ "number": number, "block": block }))
                .context("Failed to write block to stdout")?;
        }
        fetched += chunk.len();
    }

    info!(fetched, "Scan finished");
    Ok(())
}
