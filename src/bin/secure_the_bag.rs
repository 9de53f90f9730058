use std::path::PathBuf;

use cat_admin_lib::commands::{BagSource, curried_tail, secure_the_bag};
use cat_admin_lib::init_logging;
use cat_admin_sdk::{BatchingPolicy, Network};
use clap::Parser;

/// Commit a list of payouts to a single root puzzle hash.
#[derive(Debug, Parser)]
#[command(name = "secure_the_bag", version)]
struct Cli {
    /// TAIL of the CAT being distributed, serialized CLVM hex; omit for XCH
    #[arg(short = 'l', long)]
    tail: Option<String>,

    /// Serialized argument to curry into the TAIL (repeatable)
    #[arg(short = 'c', long, requires = "tail")]
    curry: Vec<String>,

    /// Expected total of the target amounts in mojos
    #[arg(short = 'a', long)]
    amount: Option<u64>,

    /// CSV of `puzzle_hash,amount` rows
    #[arg(long = "secure-the-bag-targets-path", alias = "targets")]
    targets_path: PathBuf,

    #[arg(long, default_value_t = 100)]
    leaf_width: usize,

    /// How targets are grouped into leaves; must match at unwind time
    #[arg(long, default_value_t = BatchingPolicy::Simple)]
    policy: BatchingPolicy,

    /// Network the root address is printed for
    #[arg(long, default_value = "mainnet")]
    network: Network,

    /// Address prefix, overriding the network's
    #[arg(long)]
    prefix: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let asset_id = match &cli.tail {
        Some(tail) => Some(curried_tail(tail, &cli.curry)?.1),
        None => None,
    };
    let source = BagSource {
        targets_path: cli.targets_path,
        amount: cli.amount,
        leaf_width: cli.leaf_width,
        asset_id,
        policy: cli.policy,
    };
    let prefix = cli
        .prefix
        .unwrap_or_else(|| cli.network.address_prefix().to_string());
    let response = secure_the_bag(&source, &prefix)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("Secure the bag root puzzle hash: {}", response.outer_root_puzzle_hash);
        println!("Secure the bag root address: {}", response.root_address);
    }
    Ok(())
}
