use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use cat_admin_lib::commands::{IssuanceResponse, IssueInput, prepare_issuance};
use cat_admin_lib::{RpcConfig, init_logging, wallet_client};
use clap::Parser;

/// Mint a CAT: fund an eve coin from the wallet and reveal the TAIL in its spend.
#[derive(Debug, Parser)]
#[command(name = "cats", version)]
struct Cli {
    /// TAIL program as serialized CLVM hex, inline or in a file
    #[arg(short = 'l', long)]
    tail: String,

    /// Serialized argument to curry into the TAIL (repeatable)
    #[arg(short = 'c', long)]
    curry: Vec<String>,

    /// Solution for the TAIL, serialized CLVM hex
    #[arg(short = 's', long, default_value = "80")]
    solution: String,

    /// Address the minted CAT goes to
    #[arg(short = 't', long)]
    send_to: String,

    /// Amount to issue in mojos, funded with regular XCH
    #[arg(short = 'a', long)]
    amount: u64,

    /// Fee for the funding transaction in mojos
    #[arg(short = 'm', long, default_value_t = 0)]
    fee: u64,

    /// Wallet key fingerprint to log in with
    #[arg(short = 'f', long)]
    fingerprint: Option<u32>,

    #[arg(long, default_value_t = 1)]
    wallet_id: u32,

    /// Extra BLS signature (hex) to aggregate into the bundle (repeatable)
    #[arg(long = "signature")]
    signatures: Vec<String>,

    /// Extra JSON spend bundle, inline or a file, to aggregate (repeatable)
    #[arg(long = "spend")]
    spends: Vec<String>,

    /// Only print the wallet coin that funds the eve coin
    #[arg(long)]
    select_coin: bool,

    /// Do not prompt before pushing
    #[arg(short, long)]
    quiet: bool,

    /// Push without asking
    #[arg(short, long)]
    push: bool,

    #[arg(long, env = "CHIA_ROOT")]
    root_path: Option<PathBuf>,

    #[arg(long)]
    wallet_rpc_port: Option<u16>,

    #[arg(short, long)]
    verbose: bool,
}

fn confirm_push() -> anyhow::Result<bool> {
    print!("The transaction has been created, would you like to push it to the network? (Y/N) ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = RpcConfig::load(cli.root_path.clone())?.with_ports(None, cli.wallet_rpc_port);
    let wallet = wallet_client(&config, cli.fingerprint)
        .await
        .context("connecting to the wallet; make sure it is running")?;

    let input = IssueInput {
        tail: cli.tail,
        curry: cli.curry,
        solution: cli.solution,
        send_to: cli.send_to,
        amount: cli.amount,
        fee: cli.fee,
        wallet_id: cli.wallet_id,
        signatures: cli.signatures,
        spends: cli.spends,
    };
    let issued = prepare_issuance(&wallet, &input).await?;

    if cli.select_coin {
        println!("{}", serde_json::to_string_pretty(&issued.primary_coin)?);
        println!("Name: {}", hex::encode(issued.primary_coin.coin_id()));
        return Ok(());
    }

    let response = IssuanceResponse::from(&issued);
    let confirmed = if cli.push {
        true
    } else if cli.quiet {
        false
    } else {
        confirm_push()?
    };
    if confirmed {
        wallet
            .push_tx(&issued.bundle)
            .await
            .context("error pushing transaction")?;
        println!("Successfully pushed the transaction to the network");
    }

    println!("Asset ID: {}", response.asset_id);
    println!("Eve Coin ID: {}", response.eve_coin_id);
    if !confirmed {
        println!(
            "Spend Bundle: {}",
            serde_json::to_string_pretty(&response.spend_bundle)?
        );
    }
    Ok(())
}
