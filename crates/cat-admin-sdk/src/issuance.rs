//! Mint a CAT: wallet funds an eve coin whose spend reveals the TAIL.

use chia_bls::Signature;
use chia_protocol::{Bytes32, Coin};
use chia_wallet_sdk::driver::SpendContext;

use crate::cat::{SpendableCat, cat_puzzle_hash, spend_cats};
use crate::chain::{TransactionRequest, WalletService};
use crate::conditions::{Conditions, conditions_puzzle};
use crate::error::{Error, Result};
use crate::program::{Program, curry_program, tree_hash};
use crate::spend::{SpendBundle, unsigned_bundle};
use crate::target::Target;

#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    pub tail: Program,
    /// Arguments curried into `tail`; empty for an uncurried TAIL.
    pub curried_args: Vec<Program>,
    pub tail_solution: Program,
    pub destination: Bytes32,
    pub amount: u64,
    pub fee: u64,
    pub wallet_id: u32,
    pub extra_signatures: Vec<Signature>,
    pub extra_bundles: Vec<SpendBundle>,
}

#[derive(Debug, Clone)]
pub struct IssuedCat {
    pub asset_id: Bytes32,
    pub eve_coin: Coin,
    /// Wallet coin whose spend created the eve coin.
    pub primary_coin: Coin,
    pub bundle: SpendBundle,
}

impl IssuanceRequest {
    pub fn curried_tail(&self) -> Result<Program> {
        if self.curried_args.is_empty() {
            Ok(self.tail.clone())
        } else {
            curry_program(&self.tail, &self.curried_args)
        }
    }
}

/// `(q . ((51 () -113 tail solution) (51 dest amount (dest))))`
pub fn eve_inner_puzzle(
    curried_tail: &Program,
    tail_solution: &Program,
    destination: Bytes32,
    amount: u64,
) -> Result<Program> {
    let mut ctx = SpendContext::new();
    let tail = ctx.alloc(curried_tail)?;
    let solution = ctx.alloc(tail_solution)?;
    let conditions = Conditions::new().run_cat_tail(tail, solution);
    let conditions = Target::new(destination, amount).add_create_coin(&mut ctx, conditions)?;
    conditions_puzzle(&mut ctx, conditions)
}

/// Build the issuance bundle. Nothing is pushed.
pub async fn issue_cat(wallet: &dyn WalletService, request: &IssuanceRequest) -> Result<IssuedCat> {
    let curried_tail = request.curried_tail()?;
    let asset_id = tree_hash(&curried_tail)?;
    let eve_inner =
        eve_inner_puzzle(&curried_tail, &request.tail_solution, request.destination, request.amount)?;
    let eve_puzzle_hash = cat_puzzle_hash(asset_id, tree_hash(&eve_inner)?);
    log::info!("issuing {} mojos of asset {}", request.amount, hex::encode(asset_id));

    let funding = wallet
        .create_signed_transaction(&TransactionRequest {
            wallet_id: request.wallet_id,
            additions: vec![Target::new(eve_puzzle_hash, request.amount)],
            fee: request.fee,
            ..Default::default()
        })
        .await?;

    let eve_coin = funding
        .additions()
        .map_err(|e| Error::Wallet(format!("signed transaction does not run: {e:?}")))?
        .into_iter()
        .find(|c| c.puzzle_hash == eve_puzzle_hash && c.amount == request.amount)
        .ok_or_else(|| Error::Wallet("signed transaction does not create the eve coin".into()))?;
    let primary_coin = funding
        .coin_spends
        .iter()
        .map(|cs| cs.coin)
        .find(|c| c.coin_id() == eve_coin.parent_coin_info)
        .ok_or_else(|| Error::Wallet("eve coin parent is not spent by the transaction".into()))?;

    let eve_spends = spend_cats(
        asset_id,
        &[SpendableCat {
            coin: eve_coin,
            inner_puzzle: eve_inner,
            inner_solution: Program::default(),
            lineage_proof: None,
        }],
    )?;

    let mut parts = vec![funding, unsigned_bundle(eve_spends)];
    parts.extend(request.extra_bundles.iter().cloned());
    parts.push(SpendBundle::new(
        Vec::new(),
        chia_bls::aggregate(&request.extra_signatures),
    ));

    Ok(IssuedCat {
        asset_id,
        eve_coin,
        primary_coin,
        bundle: SpendBundle::aggregate(&parts),
    })
}
