//! Secure the bag: commit a large payout fan-out to a single puzzle hash.
//!
//! Targets are grouped into batches of at most `leaf_width`. Each batch
//! becomes a node whose puzzle announces `"$"` and creates one coin per
//! member. Nodes are batched again, level by level, until a single root
//! remains. Funding the root and spending nodes top-down eventually pays
//! every target.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chia_protocol::Bytes32;
use chia_wallet_sdk::driver::SpendContext;

use crate::cat::cat_puzzle_hash;
use crate::conditions::{Conditions, SELF_ANNOUNCEMENT, conditions_puzzle};
use crate::error::{Error, Result};
use crate::program::{Program, tree_hash};
use crate::target::{Target, total_amount};

// ── Batching ────────────────────────────────────────────────────────

/// How targets are partitioned into batches. Switching policy changes
/// every derived hash, so a funded root must always be unwound with the
/// policy it was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchingPolicy {
    /// Consecutive chunks in input order.
    Simple,
    /// Never places two identical `(puzzle_hash, amount)` pairs in one batch.
    CollisionAvoiding,
}

impl BatchingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchingPolicy::Simple => "simple",
            BatchingPolicy::CollisionAvoiding => "collision-avoiding",
        }
    }
}

impl fmt::Display for BatchingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchingPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(BatchingPolicy::Simple),
            "collision-avoiding" | "collision_avoiding" | "collision" => {
                Ok(BatchingPolicy::CollisionAvoiding)
            }
            _ => Err(format!("invalid batching policy: {}", s)),
        }
    }
}

/// Partition `targets` into batches of at most `leaf_width`.
pub fn batch_the_bag(
    targets: &[Target],
    leaf_width: usize,
    policy: BatchingPolicy,
) -> Result<Vec<Vec<Target>>> {
    if leaf_width == 0 {
        return Err(Error::InvalidLeafWidth(leaf_width));
    }
    let batches = match policy {
        BatchingPolicy::Simple => targets.chunks(leaf_width).map(<[Target]>::to_vec).collect(),
        BatchingPolicy::CollisionAvoiding => batch_avoiding_collisions(targets, leaf_width),
    };
    Ok(batches)
}

fn batch_avoiding_collisions(targets: &[Target], leaf_width: usize) -> Vec<Vec<Target>> {
    let mut batches = Vec::new();
    let mut current: Vec<Target> = Vec::with_capacity(leaf_width);
    let mut collisions: VecDeque<Target> = VecDeque::new();

    for target in targets {
        if current.contains(target) {
            collisions.push_back(*target);
            continue;
        }
        current.push(*target);
        while current.len() == leaf_width {
            batches.push(std::mem::take(&mut current));
            refill(&mut current, &mut collisions, leaf_width);
        }
    }

    // Whatever is left never shares a batch with its twin.
    loop {
        refill(&mut current, &mut collisions, leaf_width);
        if current.is_empty() {
            break;
        }
        batches.push(std::mem::take(&mut current));
    }
    batches
}

/// Move queued collisions into `current`, in order, while they fit and
/// do not collide.
fn refill(current: &mut Vec<Target>, collisions: &mut VecDeque<Target>, leaf_width: usize) {
    let mut kept = VecDeque::with_capacity(collisions.len());
    while let Some(target) = collisions.pop_front() {
        if current.len() < leaf_width && !current.contains(&target) {
            current.push(target);
        } else {
            kept.push_back(target);
        }
    }
    *collisions = kept;
}

fn has_duplicate_pair(batch: &[Target]) -> bool {
    batch
        .iter()
        .enumerate()
        .any(|(i, t)| batch[i + 1..].contains(t))
}

// ── Tree ────────────────────────────────────────────────────────────

/// An interior node: a batch committed to by its puzzle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagNode {
    /// `(q . ((60 "$") (51 ph amount (ph)) ...))`
    pub puzzle: Program,
    pub puzzle_hash: Bytes32,
    pub amount: u64,
    /// The batch, in the order the puzzle creates it.
    pub members: Vec<Target>,
}

impl BagNode {
    pub fn from_batch(batch: &[Target]) -> Result<Self> {
        let mut ctx = SpendContext::new();
        let mut conditions =
            Conditions::new().create_coin_announcement(SELF_ANNOUNCEMENT.to_vec().into());
        for member in batch {
            conditions = member.add_create_coin(&mut ctx, conditions)?;
        }

        let puzzle = conditions_puzzle(&mut ctx, conditions)?;
        Ok(Self {
            puzzle_hash: tree_hash(&puzzle)?,
            amount: total_amount(batch)?,
            puzzle,
            members: batch.to_vec(),
        })
    }

    /// The node seen as a member of the level above.
    pub fn as_target(&self) -> Target {
        Target::new(self.puzzle_hash, self.amount)
    }
}

/// Lookup record: spending the coin of `node` creates `target`'s coin.
#[derive(Debug, Clone)]
pub struct TargetCoin {
    pub target: Target,
    pub node: Arc<BagNode>,
    /// Puzzle hash of the node's coin; CAT-wrapped for a bag of CATs.
    pub puzzle_hash: Bytes32,
}

impl TargetCoin {
    pub fn inner_puzzle(&self) -> &Program {
        &self.node.puzzle
    }

    pub fn inner_puzzle_hash(&self) -> Bytes32 {
        self.node.puzzle_hash
    }

    pub fn amount(&self) -> u64 {
        self.node.amount
    }
}

/// Maps a coin puzzle hash to the node that creates it.
///
/// Built by [`secure_the_bag`] and read-only afterwards. A later record
/// with the same key replaces an earlier one, so targets that repeat a
/// `(puzzle_hash, amount)` pair share one resolution path.
#[derive(Debug, Clone, Default)]
pub struct ParentLookup {
    entries: HashMap<Bytes32, TargetCoin>,
}

impl ParentLookup {
    pub fn get(&self, puzzle_hash: &Bytes32) -> Option<&TargetCoin> {
        self.entries.get(puzzle_hash)
    }

    pub fn contains(&self, puzzle_hash: &Bytes32) -> bool {
        self.entries.contains_key(puzzle_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes32, &TargetCoin)> {
        self.entries.iter()
    }
}

/// Result of [`secure_the_bag`].
#[derive(Debug, Clone)]
pub struct SecuredBag {
    root: Target,
    asset_id: Option<Bytes32>,
    policy: BatchingPolicy,
    leaf_width: usize,
    lookup: ParentLookup,
    leaf_batches: Vec<Vec<Target>>,
    levels: Vec<Vec<Arc<BagNode>>>,
}

impl SecuredBag {
    /// Inner (unwrapped) root puzzle hash.
    pub fn root_puzzle_hash(&self) -> Bytes32 {
        self.root.puzzle_hash
    }

    /// Puzzle hash the funding transaction must pay.
    pub fn outer_root_puzzle_hash(&self) -> Bytes32 {
        self.key_for(self.root.puzzle_hash)
    }

    pub fn root_amount(&self) -> u64 {
        self.root.amount
    }

    pub fn asset_id(&self) -> Option<Bytes32> {
        self.asset_id
    }

    pub fn policy(&self) -> BatchingPolicy {
        self.policy
    }

    pub fn leaf_width(&self) -> usize {
        self.leaf_width
    }

    pub fn lookup(&self) -> &ParentLookup {
        &self.lookup
    }

    pub fn leaf_batches(&self) -> &[Vec<Target>] {
        &self.leaf_batches
    }

    /// Node levels, leaves first. The last level holds the root alone.
    pub fn levels(&self) -> &[Vec<Arc<BagNode>>] {
        &self.levels
    }

    /// Number of node levels between the funding coin and the targets.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Lookup key for an inner puzzle hash.
    pub fn key_for(&self, inner_puzzle_hash: Bytes32) -> Bytes32 {
        match self.asset_id {
            Some(asset_id) => cat_puzzle_hash(asset_id, inner_puzzle_hash),
            None => inner_puzzle_hash,
        }
    }
}

/// Build the tree over `targets` and a fresh [`ParentLookup`] for it.
///
/// With `asset_id` every coin in the tree is a CAT of that asset and
/// lookup keys are the wrapped puzzle hashes.
pub fn secure_the_bag(
    targets: &[Target],
    leaf_width: usize,
    asset_id: Option<Bytes32>,
    policy: BatchingPolicy,
) -> Result<SecuredBag> {
    if leaf_width < 2 {
        return Err(Error::InvalidLeafWidth(leaf_width));
    }
    let Some(first) = targets.first() else {
        return Err(Error::EmptyTargets);
    };
    total_amount(targets)?;

    let wrap = |ph: Bytes32| match asset_id {
        Some(asset_id) => cat_puzzle_hash(asset_id, ph),
        None => ph,
    };

    let mut entries = HashMap::new();
    let mut levels = Vec::new();
    let mut leaf_batches = Vec::new();
    let mut current: Vec<Target> = targets.to_vec();

    while current.len() > 1 {
        let batches = batch_the_bag(&current, leaf_width, policy)?;
        let batch_count = batches.len();
        log::info!(
            "level {}: batched {} targets into {} batches",
            levels.len(),
            current.len(),
            batch_count
        );

        let mut nodes = Vec::with_capacity(batch_count);
        for (processed, batch) in batches.iter().enumerate() {
            log::debug!(
                "{:.2}% of the way through batches, creating coin with {} targets",
                processed as f64 * 100.0 / batch_count as f64,
                batch.len()
            );
            if policy == BatchingPolicy::Simple && has_duplicate_pair(batch) {
                log::warn!(
                    "batch {processed} repeats a (puzzle_hash, amount) pair; its coins will collide"
                );
            }

            let node = Arc::new(BagNode::from_batch(batch)?);
            let node_coin_ph = wrap(node.puzzle_hash);
            for member in batch {
                entries.insert(
                    wrap(member.puzzle_hash),
                    TargetCoin {
                        target: *member,
                        node: Arc::clone(&node),
                        puzzle_hash: node_coin_ph,
                    },
                );
            }
            nodes.push(node);
        }

        if levels.is_empty() {
            leaf_batches = batches;
        }
        current = nodes.iter().map(|n| n.as_target()).collect();
        levels.push(nodes);
    }

    let root = current.first().copied().unwrap_or(*first);
    log::info!(
        "secured {} targets under root {} ({} levels)",
        targets.len(),
        hex::encode(root.puzzle_hash),
        levels.len()
    );

    Ok(SecuredBag {
        root,
        asset_id,
        policy,
        leaf_width,
        lookup: ParentLookup { entries },
        leaf_batches,
        levels,
    })
}
