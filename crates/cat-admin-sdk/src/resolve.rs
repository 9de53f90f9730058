//! Derive tree coins from the funding coin without touching the ledger.
//!
//! A node coin's id is `sha256(parent_id, puzzle_hash, amount)`, so given
//! the genesis coin (whose spend created the root) and the lookup table
//! every coin in the tree can be predicted before it exists.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chia_protocol::{Bytes32, Coin};

use crate::bag::{BagNode, ParentLookup, SecuredBag, TargetCoin};
use crate::cat::{LineageProof, construct_cat_puzzle};
use crate::error::{Error, Result};
use crate::program::Program;
use crate::spend::CoinSpend;

/// The spend of one tree node coin. Node puzzles ignore their solution.
#[derive(Debug, Clone)]
pub struct BagSpend {
    pub coin: Coin,
    pub node: Arc<BagNode>,
    /// Distance from the genesis coin; the root node coin is at depth 0.
    pub depth: usize,
    /// Lineage of the parent when the parent is itself a tree node.
    /// `None` for the root node coin, whose parent is the genesis coin.
    pub lineage: Option<LineageProof>,
}

impl BagSpend {
    pub fn coin_id(&self) -> Bytes32 {
        self.coin.coin_id()
    }

    pub fn inner_puzzle(&self) -> &Program {
        &self.node.puzzle
    }

    pub fn inner_puzzle_hash(&self) -> Bytes32 {
        self.node.puzzle_hash
    }

    /// Puzzle reveal of the coin: the node puzzle, CAT-wrapped when
    /// `asset_id` is given.
    pub fn puzzle_reveal(&self, asset_id: Option<Bytes32>) -> Result<Program> {
        match asset_id {
            Some(asset_id) => construct_cat_puzzle(asset_id, &self.node.puzzle),
            None => Ok(self.node.puzzle.clone()),
        }
    }

    /// The spend with an empty solution. Spendable as-is for a plain bag;
    /// a bag of CATs needs the ring solution built on top.
    pub fn to_coin_spend(&self, asset_id: Option<Bytes32>) -> Result<CoinSpend> {
        Ok(CoinSpend::new(
            self.coin,
            self.puzzle_reveal(asset_id)?,
            Program::default(),
        ))
    }

    fn lineage_for_children(&self) -> LineageProof {
        LineageProof {
            parent_parent_coin_info: self.coin.parent_coin_info,
            parent_inner_puzzle_hash: self.inner_puzzle_hash(),
            parent_amount: self.coin.amount,
        }
    }
}

/// Lookup records from `puzzle_hash` up to the root node, leaf side first.
fn chain_to_root<'a>(puzzle_hash: Bytes32, lookup: &'a ParentLookup) -> Result<Vec<&'a TargetCoin>> {
    let mut chain = Vec::new();
    let mut key = puzzle_hash;
    while let Some(record) = lookup.get(&key) {
        chain.push(record);
        if chain.len() > lookup.len() {
            return Err(Error::LookupCycle(hex::encode(puzzle_hash)));
        }
        key = record.puzzle_hash;
    }
    Ok(chain)
}

/// Every node spend between the genesis coin and the coin with
/// `puzzle_hash`, leaf side first. Empty when `puzzle_hash` is the root.
pub fn ancestor_spends(
    genesis_coin_id: Bytes32,
    puzzle_hash: Bytes32,
    lookup: &ParentLookup,
) -> Result<Vec<BagSpend>> {
    let chain = chain_to_root(puzzle_hash, lookup)?;

    let mut spends: Vec<BagSpend> = Vec::with_capacity(chain.len());
    let mut parent_id = genesis_coin_id;
    for (depth, record) in chain.iter().rev().enumerate() {
        let coin = Coin::new(parent_id, record.puzzle_hash, record.amount());
        let lineage = spends.last().map(BagSpend::lineage_for_children);
        parent_id = coin.coin_id();
        spends.push(BagSpend {
            coin,
            node: Arc::clone(&record.node),
            depth,
            lineage,
        });
    }
    spends.reverse();
    Ok(spends)
}

/// The spend that creates the coin with `puzzle_hash`, and the id of the
/// coin being spent (the new coin's parent).
///
/// For a puzzle hash outside the lookup (the root) this is
/// `(None, genesis_coin_id)`.
pub fn parent_of_puzzle_hash(
    genesis_coin_id: Bytes32,
    puzzle_hash: Bytes32,
    lookup: &ParentLookup,
) -> Result<(Option<BagSpend>, Bytes32)> {
    let spend = ancestor_spends(genesis_coin_id, puzzle_hash, lookup)?
        .into_iter()
        .next();
    let parent_id = match &spend {
        Some(spend) => spend.coin_id(),
        None => genesis_coin_id,
    };
    Ok((spend, parent_id))
}

/// Every node spend in the tree, root first and then level by level.
///
/// Coins are derived downwards from the genesis coin through each node's
/// members, so targets that repeat a puzzle hash still get one coin per
/// occurrence. Members that would create the same coin twice under one
/// parent collapse into a single spend, as they do on the ledger.
pub fn node_spends(genesis_coin_id: Bytes32, bag: &SecuredBag) -> Result<Vec<BagSpend>> {
    let Some(root) = bag.levels().last().and_then(|level| level.first()) else {
        return Ok(Vec::new());
    };
    let nodes: HashMap<Bytes32, &Arc<BagNode>> = bag
        .levels()
        .iter()
        .flatten()
        .map(|node| (node.puzzle_hash, node))
        .collect();

    let mut spends = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([BagSpend {
        coin: Coin::new(genesis_coin_id, bag.key_for(root.puzzle_hash), root.amount),
        node: Arc::clone(root),
        depth: 0,
        lineage: None,
    }]);
    while let Some(spend) = queue.pop_front() {
        if spend.depth + 1 < bag.depth() {
            let parent_id = spend.coin_id();
            for member in &spend.node.members {
                let node = nodes.get(&member.puzzle_hash).ok_or_else(|| {
                    Error::Config(format!("bag has no node {}", hex::encode(member.puzzle_hash)))
                })?;
                let coin = Coin::new(parent_id, bag.key_for(member.puzzle_hash), member.amount);
                if !seen.insert(coin.coin_id()) {
                    continue;
                }
                queue.push_back(BagSpend {
                    coin,
                    node: Arc::clone(node),
                    depth: spend.depth + 1,
                    lineage: Some(spend.lineage_for_children()),
                });
            }
        }
        spends.push(spend);
    }
    Ok(spends)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::{BatchingPolicy, secure_the_bag};
    use crate::program::MAX_BLOCK_COST_CLVM;
    use crate::spend::spend_additions;
    use crate::target::Target;

    fn bag(n: u8, width: usize) -> crate::bag::SecuredBag {
        let targets: Vec<Target> = (0..n)
            .map(|i| Target::new(Bytes32::new([i; 32]), 100 + i as u64))
            .collect();
        secure_the_bag(&targets, width, None, BatchingPolicy::Simple).unwrap()
    }

    #[test]
    fn root_resolves_to_genesis() {
        let bag = bag(4, 2);
        let genesis = Bytes32::new([0xee; 32]);
        let (spend, parent) =
            parent_of_puzzle_hash(genesis, bag.root_puzzle_hash(), bag.lookup()).unwrap();
        assert!(spend.is_none());
        assert_eq!(parent, genesis);
    }

    #[test]
    fn chain_is_depth_long_and_links_up() {
        let bag = bag(9, 2);
        let genesis = Bytes32::new([0xee; 32]);
        let leaf = Bytes32::new([0u8; 32]);
        let spends = ancestor_spends(genesis, leaf, bag.lookup()).unwrap();
        assert_eq!(spends.len(), bag.depth());

        let root_spend = spends.last().unwrap();
        assert_eq!(root_spend.depth, 0);
        assert_eq!(root_spend.coin.parent_coin_info, genesis);
        assert_eq!(root_spend.coin.puzzle_hash, bag.root_puzzle_hash());
        assert_eq!(root_spend.coin.amount, bag.root_amount());
        assert!(root_spend.lineage.is_none());

        for pair in spends.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            assert_eq!(child.coin.parent_coin_info, parent.coin_id());
            assert_eq!(child.depth, parent.depth + 1);
            let lineage = child.lineage.unwrap();
            assert_eq!(lineage.parent_parent_coin_info, parent.coin.parent_coin_info);
            assert_eq!(lineage.parent_inner_puzzle_hash, parent.inner_puzzle_hash());

            // The parent's puzzle really creates the child coin.
            let additions =
                spend_additions(&parent.to_coin_spend(None).unwrap(), MAX_BLOCK_COST_CLVM).unwrap();
            assert!(additions.contains(&child.coin));
        }

        let (first, parent_id) = parent_of_puzzle_hash(genesis, leaf, bag.lookup()).unwrap();
        let first = first.unwrap();
        assert_eq!(first.coin, spends[0].coin);
        assert_eq!(parent_id, spends[0].coin_id());
    }

    #[test]
    fn resolution_is_deterministic() {
        let bag = bag(5, 2);
        let genesis = Bytes32::new([1; 32]);
        let leaf = Bytes32::new([4u8; 32]);
        let (a, ida) = parent_of_puzzle_hash(genesis, leaf, bag.lookup()).unwrap();
        let (b, idb) = parent_of_puzzle_hash(genesis, leaf, bag.lookup()).unwrap();
        assert_eq!(ida, idb);
        assert_eq!(a.unwrap().coin, b.unwrap().coin);
    }

    #[test]
    fn enumeration_reaches_every_node_coin() {
        let bag = bag(9, 2);
        let genesis = Bytes32::new([0xee; 32]);
        let spends = node_spends(genesis, &bag).unwrap();
        let node_count: usize = bag.levels().iter().map(Vec::len).sum();
        assert_eq!(spends.len(), node_count);
        assert_eq!(spends[0].coin.parent_coin_info, genesis);
        assert!(spends.windows(2).all(|pair| pair[0].depth <= pair[1].depth));

        // Agrees with the bottom-up walk for every leaf batch.
        for leaf in bag.leaf_batches().iter().map(|batch| batch[0].puzzle_hash) {
            let chain = ancestor_spends(genesis, leaf, bag.lookup()).unwrap();
            for spend in chain {
                assert!(spends.iter().any(|s| s.coin == spend.coin && s.lineage == spend.lineage));
            }
        }

        // Leaf node spends create exactly the targets.
        let mut paid = Vec::new();
        for spend in spends.iter().filter(|s| s.depth + 1 == bag.depth()) {
            paid.extend(spend_additions(&spend.to_coin_spend(None).unwrap(), MAX_BLOCK_COST_CLVM).unwrap());
        }
        assert_eq!(paid.len(), 9);
    }

    #[test]
    fn repeated_hashes_each_get_a_coin() {
        let a = Target::new(Bytes32::new([0xa; 32]), 1);
        let a2 = Target::new(Bytes32::new([0xa; 32]), 2);
        let b = Target::new(Bytes32::new([0xb; 32]), 1);
        let c = Target::new(Bytes32::new([0xc; 32]), 1);
        let bag = secure_the_bag(&[a, b, a2, c], 2, None, BatchingPolicy::Simple).unwrap();
        let spends = node_spends(Bytes32::new([1; 32]), &bag).unwrap();
        assert_eq!(spends.len(), 3);

        let mut paid = Vec::new();
        for spend in &spends[1..] {
            paid.extend(spend_additions(&spend.to_coin_spend(None).unwrap(), MAX_BLOCK_COST_CLVM).unwrap());
        }
        let mut amounts: Vec<(Bytes32, u64)> = paid.iter().map(|c| (c.puzzle_hash, c.amount)).collect();
        amounts.sort();
        assert_eq!(
            amounts,
            vec![(a.puzzle_hash, 1), (a.puzzle_hash, 2), (b.puzzle_hash, 1), (c.puzzle_hash, 1)]
        );
    }

    #[test]
    fn single_target_bag_has_no_spends() {
        let t = Target::new(Bytes32::new([3; 32]), 9);
        let bag = secure_the_bag(&[t], 2, None, BatchingPolicy::Simple).unwrap();
        assert!(node_spends(Bytes32::new([1; 32]), &bag).unwrap().is_empty());
    }
}
