use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use cat_admin_lib::commands::{BagSource, parse_hash, unwind_the_bag};
use cat_admin_lib::{RpcConfig, full_node_client, init_logging, wallet_client};
use cat_admin_sdk::{BatchingPolicy, UnwindConfig};
use clap::Parser;

/// Spend a secured bag's tree on chain until its targets exist.
#[derive(Debug, Parser)]
#[command(name = "unwind_the_bag", version)]
struct Cli {
    /// Coin whose spend created the root of the bag
    #[arg(long)]
    genesis_coin_id: String,

    /// Asset id of the CAT in the bag; omit for XCH
    #[arg(long)]
    tail_hash: Option<String>,

    /// CSV of `puzzle_hash,amount` rows the bag was built from
    #[arg(long = "secure-the-bag-targets-path", alias = "targets")]
    targets_path: PathBuf,

    /// Unwind only the path to this target; the whole bag otherwise
    #[arg(long)]
    unwind_target_puzzle_hash: Option<String>,

    #[arg(long, default_value_t = 100)]
    leaf_width: usize,

    #[arg(long, default_value_t = BatchingPolicy::Simple)]
    policy: BatchingPolicy,

    /// Fee per pushed transaction in mojos
    #[arg(short = 'm', long, default_value_t = 0)]
    fee: u64,

    /// Wallet that pays fees
    #[arg(long, default_value_t = 1)]
    wallet_id: u32,

    #[arg(short = 'f', long)]
    fingerprint: Option<u32>,

    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    #[arg(long, default_value_t = 120)]
    max_polls: u32,

    /// Node spends per transaction in a whole-bag unwind
    #[arg(long, default_value_t = 10)]
    spend_batch_size: usize,

    #[arg(long, env = "CHIA_ROOT")]
    root_path: Option<PathBuf>,

    #[arg(long)]
    full_node_rpc_port: Option<u16>,

    #[arg(long)]
    wallet_rpc_port: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let genesis_coin_id = parse_hash("genesis-coin-id", &cli.genesis_coin_id)?;
    let asset_id = cli
        .tail_hash
        .as_deref()
        .map(|h| parse_hash("tail-hash", h))
        .transpose()?;
    let target = cli
        .unwind_target_puzzle_hash
        .as_deref()
        .map(|h| parse_hash("unwind-target-puzzle-hash", h))
        .transpose()?;

    let config = RpcConfig::load(cli.root_path.clone())?
        .with_ports(cli.full_node_rpc_port, cli.wallet_rpc_port);
    let full_node = full_node_client(&config).context("connecting to the full node")?;
    let wallet = wallet_client(&config, cli.fingerprint)
        .await
        .context("connecting to the wallet")?;

    let source = BagSource {
        targets_path: cli.targets_path,
        amount: None,
        leaf_width: cli.leaf_width,
        asset_id,
        policy: cli.policy,
    };
    let unwind = UnwindConfig {
        fee: cli.fee,
        wallet_id: cli.wallet_id,
        poll_interval: Duration::from_secs(cli.poll_interval_secs),
        max_polls: cli.max_polls,
        spend_batch_size: cli.spend_batch_size,
        ..Default::default()
    };

    let report = unwind_the_bag(&source, genesis_coin_id, target, &full_node, &wallet, unwind).await?;
    println!(
        "{} spends pushed in {} transactions",
        report.spends, report.transactions
    );
    Ok(())
}
