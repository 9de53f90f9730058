//! Coin spends and spend bundles, plus their RPC JSON form.

use chia_bls::Signature;
use chia_protocol::{Bytes32, Coin};
use clvmr::allocator::Allocator;
use serde_json::Value;

pub use chia_protocol::{CoinSpend, SpendBundle};

use crate::conditions::{Condition, run_puzzle};
use crate::error::{Error, Result};
use crate::program::tree_hash;

pub fn unsigned_bundle(coin_spends: Vec<CoinSpend>) -> SpendBundle {
    SpendBundle::new(coin_spends, Signature::default())
}

/// Dry-run `spend`. Fails when the reveal does not match the coin or the
/// puzzle raises.
pub fn spend_conditions(
    a: &mut Allocator,
    spend: &CoinSpend,
    max_cost: u64,
) -> Result<(u64, Vec<Condition>)> {
    let reveal_hash = tree_hash(&spend.puzzle_reveal)?;
    if reveal_hash != spend.coin.puzzle_hash {
        return Err(Error::ScriptExecution(format!(
            "puzzle reveal {} does not match coin puzzle hash {}",
            hex::encode(reveal_hash),
            hex::encode(spend.coin.puzzle_hash)
        )));
    }
    run_puzzle(a, &spend.puzzle_reveal, &spend.solution, max_cost)
}

pub fn spend_additions(spend: &CoinSpend, max_cost: u64) -> Result<Vec<Coin>> {
    let parent = spend.coin.coin_id();
    let mut a = Allocator::new();
    let (_, conditions) = spend_conditions(&mut a, spend, max_cost)?;
    Ok(conditions
        .into_iter()
        .filter_map(|c| match c {
            Condition::CreateCoin(create_coin) => Some(Coin::new(
                parent,
                create_coin.puzzle_hash,
                create_coin.amount,
            )),
            _ => None,
        })
        .collect())
}

pub fn bundle_additions(bundle: &SpendBundle, max_cost: u64) -> Result<Vec<Coin>> {
    let mut out = Vec::new();
    for spend in &bundle.coin_spends {
        out.extend(spend_additions(spend, max_cost)?);
    }
    Ok(out)
}

pub fn bundle_removals(bundle: &SpendBundle) -> Vec<Coin> {
    bundle.coin_spends.iter().map(|cs| cs.coin).collect()
}

pub fn bundle_to_json(bundle: &SpendBundle) -> Result<Value> {
    serde_json::to_value(bundle).map_err(|e| Error::SpendBundle(e.to_string()))
}

pub fn bundle_from_json(value: &Value) -> Result<SpendBundle> {
    serde_json::from_value(value.clone()).map_err(|e| Error::SpendBundle(e.to_string()))
}

pub fn coin_spend_from_json(value: &Value) -> Result<CoinSpend> {
    serde_json::from_value(value.clone()).map_err(|e| Error::SpendBundle(e.to_string()))
}

pub fn coin_to_json(coin: &Coin) -> Result<Value> {
    serde_json::to_value(coin).map_err(|e| Error::SpendBundle(e.to_string()))
}

pub fn coin_from_json(value: &Value) -> Result<Coin> {
    serde_json::from_value(value.clone()).map_err(|e| Error::SpendBundle(format!("coin: {e}")))
}

pub fn parse_signature(s: &str) -> Result<Signature> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(trimmed).map_err(|e| Error::SpendBundle(format!("signature hex: {e}")))?;
    let arr: [u8; 96] = bytes
        .try_into()
        .map_err(|_| Error::SpendBundle("signature must be 96 bytes".into()))?;
    Signature::from_bytes(&arr).map_err(|e| Error::SpendBundle(format!("signature: {e:?}")))
}

pub fn bytes32_hex(b: &Bytes32) -> String {
    format!("0x{}", hex::encode(b))
}
