//! CAT v2 outer puzzle: wrapping, matching and ring spends.
//!
//! A CAT coin's puzzle is the CAT module curried with its own hash, the
//! asset id (TAIL hash) and an inner puzzle. Coins spent together are
//! linked in a ring by [`Cat::spend_all`], which also works out the
//! subtotals the module uses to check that value is conserved.

use chia_protocol::{Bytes32, Coin};
use chia_puzzle_types::cat::CatArgs;
use chia_puzzles::{CAT_PUZZLE, CAT_PUZZLE_HASH};
use chia_wallet_sdk::driver::{Cat, CatInfo, CatSpend, Spend, SpendContext};
use clvm_traits::{FromClvm, ToClvm};
use clvm_utils::{CurriedProgram, TreeHash};
use clvmr::allocator::{Allocator, NodePtr};

pub use chia_puzzle_types::LineageProof;

use crate::error::{Error, Result};
use crate::program::{Program, tree_hash};
use crate::spend::CoinSpend;

pub fn cat_mod_hash() -> Bytes32 {
    Bytes32::new(CAT_PUZZLE_HASH)
}

/// Outer puzzle hash of a CAT with the given asset id and inner puzzle hash.
pub fn cat_puzzle_hash(asset_id: Bytes32, inner_puzzle_hash: Bytes32) -> Bytes32 {
    CatArgs::curry_tree_hash(asset_id, TreeHash::from(inner_puzzle_hash)).into()
}

pub fn construct_cat_puzzle(asset_id: Bytes32, inner_puzzle: &Program) -> Result<Program> {
    let mut ctx = SpendContext::new();
    let module = ctx.alloc(&Program::from(CAT_PUZZLE.to_vec()))?;
    let puzzle = CurriedProgram {
        program: module,
        args: CatArgs::new(asset_id, inner_puzzle),
    };
    Ok(ctx.serialize(&puzzle)?)
}

/// Split a CAT v2 puzzle into `(asset_id, inner_puzzle)`.
pub fn match_cat_puzzle(puzzle: &Program) -> Result<Option<(Bytes32, Program)>> {
    let mut a = Allocator::new();
    let node = puzzle.to_clvm(&mut a)?;
    let Ok(curried) = CurriedProgram::<NodePtr, CatArgs<Program>>::from_clvm(&a, node) else {
        return Ok(None);
    };
    if curried.args.mod_hash != cat_mod_hash()
        || clvm_utils::tree_hash(&a, curried.program) != TreeHash::new(CAT_PUZZLE_HASH)
    {
        return Ok(None);
    }
    Ok(Some((curried.args.asset_id, curried.args.inner_puzzle)))
}

/// Lineage proof a child of `parent_spend` presents, given that the
/// parent is itself a CAT of `asset_id`.
pub fn lineage_from_parent_spend(parent_spend: &CoinSpend, asset_id: Bytes32) -> Result<LineageProof> {
    let (parent_asset, inner) = match_cat_puzzle(&parent_spend.puzzle_reveal)?.ok_or_else(|| {
        Error::NotCat(format!(
            "parent {} is not a CAT",
            hex::encode(parent_spend.coin.coin_id())
        ))
    })?;
    if parent_asset != asset_id {
        return Err(Error::NotCat(format!(
            "parent asset {} differs from {}",
            hex::encode(parent_asset),
            hex::encode(asset_id)
        )));
    }
    Ok(LineageProof {
        parent_parent_coin_info: parent_spend.coin.parent_coin_info,
        parent_inner_puzzle_hash: tree_hash(&inner)?,
        parent_amount: parent_spend.coin.amount,
    })
}

#[derive(Debug, Clone)]
pub struct SpendableCat {
    pub coin: Coin,
    pub inner_puzzle: Program,
    pub inner_solution: Program,
    /// `None` only for an eve spend that reveals the TAIL.
    pub lineage_proof: Option<LineageProof>,
}

/// Spend `cats` of `asset_id` together as one ring. No signature is attached.
pub fn spend_cats(asset_id: Bytes32, cats: &[SpendableCat]) -> Result<Vec<CoinSpend>> {
    if cats.is_empty() {
        return Ok(Vec::new());
    }

    let mut ctx = SpendContext::new();
    let mut spends = Vec::with_capacity(cats.len());
    for cat in cats {
        let inner_puzzle_hash = tree_hash(&cat.inner_puzzle)?;
        let puzzle = ctx.alloc(&cat.inner_puzzle)?;
        let solution = ctx.alloc(&cat.inner_solution)?;
        let info = CatInfo::new(asset_id, None, inner_puzzle_hash);
        spends.push(CatSpend::new(
            Cat::new(cat.coin, cat.lineage_proof, info),
            Spend::new(puzzle, solution),
        ));
    }
    Cat::spend_all(&mut ctx, &spends)?;
    Ok(ctx.take())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{Conditions, conditions_puzzle};
    use crate::program::{MAX_BLOCK_COST_CLVM, program_from_hex};
    use crate::spend::spend_additions;
    use crate::target::Target;

    #[test]
    fn module_hash_matches_the_published_value() {
        assert_eq!(
            hex::encode(cat_mod_hash()),
            "37bef360ee858133b69d595a906dc45d01af50379dad515eb9518abb7c1d2a7a"
        );
        assert_eq!(
            tree_hash(&Program::from(CAT_PUZZLE.to_vec())).unwrap(),
            cat_mod_hash()
        );
    }

    #[test]
    fn wrapped_hash_matches_the_curried_puzzle() {
        let asset_id = Bytes32::new([0xaa; 32]);
        let inner = program_from_hex("ff0180").unwrap();
        let puzzle = construct_cat_puzzle(asset_id, &inner).unwrap();
        assert_eq!(
            tree_hash(&puzzle).unwrap(),
            cat_puzzle_hash(asset_id, tree_hash(&inner).unwrap())
        );

        let (matched_asset, matched_inner) = match_cat_puzzle(&puzzle).unwrap().unwrap();
        assert_eq!(matched_asset, asset_id);
        assert_eq!(matched_inner, inner);
        assert!(match_cat_puzzle(&inner).unwrap().is_none());
    }

    #[test]
    fn lineage_comes_from_the_parent_reveal() {
        let asset_id = Bytes32::new([0x11; 32]);
        let inner = program_from_hex("01").unwrap();
        let parent = Coin::new(
            Bytes32::new([0x44; 32]),
            cat_puzzle_hash(asset_id, tree_hash(&inner).unwrap()),
            7,
        );
        let spend = CoinSpend::new(
            parent,
            construct_cat_puzzle(asset_id, &inner).unwrap(),
            Program::default(),
        );

        let proof = lineage_from_parent_spend(&spend, asset_id).unwrap();
        assert_eq!(proof.parent_parent_coin_info, parent.parent_coin_info);
        assert_eq!(proof.parent_inner_puzzle_hash, tree_hash(&inner).unwrap());
        assert_eq!(proof.parent_amount, 7);

        assert!(matches!(
            lineage_from_parent_spend(&spend, Bytes32::new([0x12; 32])),
            Err(Error::NotCat(_))
        ));
        let plain = CoinSpend::new(parent, inner, Program::default());
        assert!(matches!(lineage_from_parent_spend(&plain, asset_id), Err(Error::NotCat(_))));
    }

    #[test]
    fn ring_spend_runs_and_morphs_outputs() {
        let asset_id = Bytes32::new([0x11; 32]);
        let dest = Target::new(Bytes32::new([0x22; 32]), 100);
        let mut ctx = SpendContext::new();
        let conditions = dest.add_create_coin(&mut ctx, Conditions::new()).unwrap();
        let inner = conditions_puzzle(&mut ctx, conditions).unwrap();

        let parent_inner = Bytes32::new([0x33; 32]);
        let grandparent = Bytes32::new([0x44; 32]);
        let parent_coin = Coin::new(grandparent, cat_puzzle_hash(asset_id, parent_inner), 100);
        let coin = Coin::new(
            parent_coin.coin_id(),
            cat_puzzle_hash(asset_id, tree_hash(&inner).unwrap()),
            100,
        );

        let spends = spend_cats(
            asset_id,
            &[SpendableCat {
                coin,
                inner_puzzle: inner,
                inner_solution: Program::default(),
                lineage_proof: Some(LineageProof {
                    parent_parent_coin_info: grandparent,
                    parent_inner_puzzle_hash: parent_inner,
                    parent_amount: 100,
                }),
            }],
        )
        .unwrap();
        assert_eq!(spends.len(), 1);

        let additions = spend_additions(&spends[0], MAX_BLOCK_COST_CLVM).unwrap();
        assert_eq!(
            additions,
            vec![Coin::new(
                coin.coin_id(),
                cat_puzzle_hash(asset_id, dest.puzzle_hash),
                100
            )]
        );
    }
}
