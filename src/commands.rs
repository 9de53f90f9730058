use std::path::{Path, PathBuf};

use cat_admin_sdk::chain::{FullNodeService, WalletService};
use cat_admin_sdk::program::{curry_program, tree_hash};
use cat_admin_sdk::spend::{bundle_from_json, bytes32_hex};
use cat_admin_sdk::{
    BatchingPolicy, Bytes32, IssuanceRequest, IssuedCat, Program, SecuredBag, SpendBundle,
    UnwindConfig, UnwindReport, Unwinder, decode_puzzle_hash, encode_puzzle_hash, parse_bytes32,
    parse_program, parse_signature, read_targets,
};
use serde::Serialize;
use thiserror::Error;

use crate::chain_adapter::ChainAdapterError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Sdk(#[from] cat_admin_sdk::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chain(#[from] ChainAdapterError),

    #[error("invalid input: {0}")]
    Input(String),
}

/// Curry `curry` into the TAIL and return the program with its asset id.
pub fn curried_tail(tail: &str, curry: &[String]) -> Result<(Program, Bytes32), CommandError> {
    let tail = parse_program(tail)?;
    let args = curry
        .iter()
        .map(|arg| parse_program(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let curried = if args.is_empty() { tail } else { curry_program(&tail, &args)? };
    let asset_id = tree_hash(&curried)?;
    Ok((curried, asset_id))
}

// ---------------------------------------------------------------------------
// Secure the bag
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BagSource {
    pub targets_path: PathBuf,
    /// Expected sum of the target amounts.
    pub amount: Option<u64>,
    pub leaf_width: usize,
    pub asset_id: Option<Bytes32>,
    pub policy: BatchingPolicy,
}

impl BagSource {
    /// Read the targets and rebuild the tree.
    pub fn load(&self) -> Result<SecuredBag, CommandError> {
        let targets = read_targets(&self.targets_path, self.amount)?;
        Ok(cat_admin_sdk::secure_the_bag(
            &targets,
            self.leaf_width,
            self.asset_id,
            self.policy,
        )?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SecuredBagResponse {
    pub root_puzzle_hash: String,
    /// Where the funding transaction pays: the CAT-wrapped root for a bag of
    /// CATs, the root itself otherwise.
    pub outer_root_puzzle_hash: String,
    /// Address of the inner root, for sending CATs from a wallet.
    pub root_address: String,
    pub root_amount: u64,
    pub target_count: usize,
    pub depth: usize,
}

pub fn secure_the_bag(source: &BagSource, prefix: &str) -> Result<SecuredBagResponse, CommandError> {
    let bag = source.load()?;
    Ok(SecuredBagResponse {
        root_puzzle_hash: hex::encode(bag.root_puzzle_hash()),
        outer_root_puzzle_hash: hex::encode(bag.outer_root_puzzle_hash()),
        root_address: encode_puzzle_hash(bag.root_puzzle_hash(), prefix)?,
        root_amount: bag.root_amount(),
        target_count: bag.leaf_batches().iter().map(Vec::len).sum(),
        depth: bag.depth(),
    })
}

// ---------------------------------------------------------------------------
// Unwind
// ---------------------------------------------------------------------------

/// Unwind one target when `target` is given, otherwise the whole bag.
pub async fn unwind_the_bag(
    source: &BagSource,
    genesis_coin_id: Bytes32,
    target: Option<Bytes32>,
    full_node: &dyn FullNodeService,
    wallet: &dyn WalletService,
    config: UnwindConfig,
) -> Result<UnwindReport, CommandError> {
    let bag = source.load()?;
    let unwinder = Unwinder::new(&bag, genesis_coin_id, full_node, wallet, config);
    let report = match target {
        Some(target) => unwinder.unwind_target(target).await?,
        None => unwinder.unwind_bag().await?,
    };
    log::info!(
        "unwind finished: {} spends in {} transactions",
        report.spends,
        report.transactions
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// CAT issuance
// ---------------------------------------------------------------------------

/// Raw issuance inputs as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct IssueInput {
    pub tail: String,
    pub curry: Vec<String>,
    pub solution: String,
    /// Destination address.
    pub send_to: String,
    pub amount: u64,
    pub fee: u64,
    pub wallet_id: u32,
    /// Hex BLS signatures to aggregate.
    pub signatures: Vec<String>,
    /// JSON spend bundles, inline or as file paths.
    pub spends: Vec<String>,
}

fn parse_spend_bundle(input: &str) -> Result<SpendBundle, CommandError> {
    let path = Path::new(input.trim());
    let text = if path.is_file() {
        std::fs::read_to_string(path)
            .map_err(|e| CommandError::Input(format!("{}: {e}", path.display())))?
    } else {
        input.to_string()
    };
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| CommandError::Input(format!("spend bundle is not JSON: {e}")))?;
    // Accept the bare bundle or a push_tx style wrapper.
    let bundle = value.get("spend_bundle").unwrap_or(&value);
    Ok(bundle_from_json(bundle)?)
}

impl IssueInput {
    pub fn to_request(&self) -> Result<IssuanceRequest, CommandError> {
        if self.amount == 0 {
            return Err(CommandError::Input("amount must be greater than zero".into()));
        }
        let tail = parse_program(&self.tail)?;
        let curried_args = self
            .curry
            .iter()
            .map(|arg| parse_program(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(IssuanceRequest {
            tail,
            curried_args,
            tail_solution: parse_program(&self.solution)?,
            destination: decode_puzzle_hash(&self.send_to)?,
            amount: self.amount,
            fee: self.fee,
            wallet_id: self.wallet_id,
            extra_signatures: self
                .signatures
                .iter()
                .map(|s| parse_signature(s))
                .collect::<Result<Vec<_>, _>>()?,
            extra_bundles: self
                .spends
                .iter()
                .map(|s| parse_spend_bundle(s))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuanceResponse {
    pub asset_id: String,
    pub eve_coin_id: String,
    pub primary_coin_id: String,
    pub spend_bundle: SpendBundle,
}

impl From<&IssuedCat> for IssuanceResponse {
    fn from(issued: &IssuedCat) -> Self {
        Self {
            asset_id: hex::encode(issued.asset_id),
            eve_coin_id: hex::encode(issued.eve_coin.coin_id()),
            primary_coin_id: hex::encode(issued.primary_coin.coin_id()),
            spend_bundle: issued.bundle.clone(),
        }
    }
}

pub async fn prepare_issuance(
    wallet: &dyn WalletService,
    input: &IssueInput,
) -> Result<IssuedCat, CommandError> {
    let request = input.to_request()?;
    let issued = cat_admin_sdk::issue_cat(wallet, &request).await?;
    log::info!(
        "eve coin {} funded by {}",
        bytes32_hex(&issued.eve_coin.coin_id()),
        bytes32_hex(&issued.primary_coin.coin_id())
    );
    Ok(issued)
}

/// `0x`-optional hex coin id or puzzle hash from a flag.
pub fn parse_hash(flag: &str, value: &str) -> Result<Bytes32, CommandError> {
    parse_bytes32(value).map_err(|e| CommandError::Input(format!("--{flag}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use cat_admin_sdk::{Coin, CoinSpend, Signature, Target, bundle_to_json, unsigned_bundle};

    fn targets_file(rows: &[Target]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for t in rows {
            writeln!(file, "{},{}", hex::encode(t.puzzle_hash), t.amount).unwrap();
        }
        file
    }

    #[test]
    fn secure_the_bag_reports_root_and_address() {
        let rows: Vec<Target> = (1..=5u8)
            .map(|i| Target::new(Bytes32::new([i; 32]), 10 * i as u64))
            .collect();
        let file = targets_file(&rows);
        let source = BagSource {
            targets_path: file.path().to_path_buf(),
            amount: Some(150),
            leaf_width: 2,
            asset_id: None,
            policy: BatchingPolicy::Simple,
        };
        let response = secure_the_bag(&source, "txch").unwrap();
        assert_eq!(response.root_amount, 150);
        assert_eq!(response.target_count, 5);
        assert_eq!(response.root_puzzle_hash, response.outer_root_puzzle_hash);
        assert!(response.root_address.starts_with("txch1"));
        assert_eq!(
            hex::encode(decode_puzzle_hash(&response.root_address).unwrap()),
            response.root_puzzle_hash
        );

        let (_, asset_id) = curried_tail("ff0180", &[]).unwrap();
        let wrapped = secure_the_bag(&BagSource { asset_id: Some(asset_id), ..source.clone() }, "xch").unwrap();
        assert_eq!(wrapped.root_puzzle_hash, response.root_puzzle_hash);
        assert_ne!(wrapped.outer_root_puzzle_hash, response.outer_root_puzzle_hash);

        let mismatch = BagSource { amount: Some(151), ..source };
        assert!(matches!(
            secure_the_bag(&mismatch, "xch"),
            Err(CommandError::Sdk(cat_admin_sdk::Error::AmountMismatch { .. }))
        ));
    }

    #[test]
    fn curry_changes_the_asset_id() {
        let (plain, plain_id) = curried_tail("ff0180", &[]).unwrap();
        let (curried, curried_id) = curried_tail("0xff0180", &["07".to_string()]).unwrap();
        assert_eq!(plain_id, tree_hash(&plain).unwrap());
        assert_eq!(curried_id, tree_hash(&curried).unwrap());
        assert_ne!(plain_id, curried_id);
    }

    #[test]
    fn issue_input_validation() {
        let destination = encode_puzzle_hash(Bytes32::new([0xde; 32]), "xch").unwrap();
        let input = IssueInput {
            tail: "ff0180".into(),
            solution: "80".into(),
            send_to: destination,
            amount: 1_000,
            wallet_id: 1,
            signatures: vec![hex::encode(Signature::default().to_bytes())],
            ..Default::default()
        };
        let request = input.to_request().unwrap();
        assert_eq!(request.destination, Bytes32::new([0xde; 32]));
        assert_eq!(request.extra_signatures.len(), 1);

        let zero = IssueInput { amount: 0, ..input.clone() };
        assert!(matches!(zero.to_request(), Err(CommandError::Input(_))));

        let bad_address = IssueInput { send_to: "not-an-address".into(), ..input };
        assert!(bad_address.to_request().is_err());
    }

    #[test]
    fn spend_bundles_inline_or_from_file() {
        let coin = Coin::new(Bytes32::new([1; 32]), Bytes32::new([2; 32]), 5);
        let bundle = unsigned_bundle(vec![CoinSpend::new(coin, Program::default(), Program::default())]);
        let inline = bundle_to_json(&bundle).unwrap().to_string();
        assert_eq!(parse_spend_bundle(&inline).unwrap(), bundle);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let wrapped = serde_json::json!({ "spend_bundle": bundle_to_json(&bundle).unwrap() });
        write!(file, "{wrapped}").unwrap();
        assert_eq!(parse_spend_bundle(file.path().to_str().unwrap()).unwrap(), bundle);

        assert!(matches!(parse_spend_bundle("{nope"), Err(CommandError::Input(_))));
    }
}
