//! Unwind a secured bag: spend tree nodes on the ledger until the target
//! coins exist.
//!
//! Every step re-reads ledger state, so an interrupted unwind can simply
//! be started again.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chia_protocol::Bytes32;
use clvmr::allocator::Allocator;
use futures::future::try_join_all;
use tokio::sync::OnceCell;

use crate::bag::SecuredBag;
use crate::cat::{LineageProof, SpendableCat, lineage_from_parent_spend, spend_cats};
use crate::chain::{CoinAnnouncement, FullNodeService, TransactionRequest, WalletService};
use crate::conditions::{SELF_ANNOUNCEMENT, created_amount};
use crate::error::{Error, Result};
use crate::program::{MAX_BLOCK_COST_CLVM, Program};
use crate::resolve::{BagSpend, ancestor_spends, node_spends};
use crate::spend::{CoinSpend, SpendBundle, spend_conditions, unsigned_bundle};
use crate::target::Target;

/// Knobs for an unwind run.
#[derive(Debug, Clone)]
pub struct UnwindConfig {
    /// Fee in mojos attached to every pushed transaction. 0 disables fees.
    pub fee: u64,
    /// Wallet that pays fees.
    pub wallet_id: u32,
    pub poll_interval: Duration,
    /// Polls before a wait gives up with [`Error::Timeout`].
    pub max_polls: u32,
    /// Node spends combined into one transaction during a whole-bag unwind.
    pub spend_batch_size: usize,
    /// CLVM cost ceiling for one transaction.
    pub max_cost: u64,
}

impl Default for UnwindConfig {
    fn default() -> Self {
        Self {
            fee: 0,
            wallet_id: 1,
            poll_interval: Duration::from_secs(5),
            max_polls: 120,
            spend_batch_size: 10,
            max_cost: MAX_BLOCK_COST_CLVM,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnwindReport {
    pub spends: usize,
    pub transactions: usize,
}

pub struct Unwinder<'a> {
    bag: &'a SecuredBag,
    genesis_coin_id: Bytes32,
    full_node: &'a dyn FullNodeService,
    wallet: &'a dyn WalletService,
    config: UnwindConfig,
    root_lineage: OnceCell<LineageProof>,
}

impl<'a> Unwinder<'a> {
    pub fn new(
        bag: &'a SecuredBag,
        genesis_coin_id: Bytes32,
        full_node: &'a dyn FullNodeService,
        wallet: &'a dyn WalletService,
        config: UnwindConfig,
    ) -> Self {
        Self {
            bag,
            genesis_coin_id,
            full_node,
            wallet,
            config,
            root_lineage: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &UnwindConfig {
        &self.config
    }

    // ── Walk phase ──────────────────────────────────────────────────

    /// Spends needed to create the coin keyed by `puzzle_hash`, leaf side
    /// first, ending at the lowest ancestor that already exists unspent.
    pub async fn get_unwind(&self, puzzle_hash: Bytes32) -> Result<Vec<BagSpend>> {
        let chain = ancestor_spends(self.genesis_coin_id, puzzle_hash, self.bag.lookup())?;
        let mut required = Vec::new();
        for spend in chain {
            let coin_id = spend.coin_id();
            match self.full_node.coin_record(coin_id).await? {
                None => required.push(spend),
                Some(record) if !record.is_spent() => {
                    required.push(spend);
                    break;
                }
                Some(_) => {
                    log::warn!(
                        "lowest coin {} is spent; somebody else might have unwound the bag",
                        hex::encode(coin_id)
                    );
                    break;
                }
            }
        }
        log::info!(
            "{} spends required to unwind {}",
            required.len(),
            hex::encode(puzzle_hash)
        );
        Ok(required)
    }

    // ── Ledger waits ────────────────────────────────────────────────

    /// Poll until the coin exists unspent. A spent coin is a race with
    /// another actor and fails immediately.
    pub async fn wait_for_coin_unspent(&self, coin_id: Bytes32) -> Result<()> {
        for poll in 0..self.config.max_polls {
            match self.full_node.coin_record(coin_id).await {
                Ok(Some(record)) if record.is_spent() => {
                    return Err(Error::CoinAlreadySpent(hex::encode(coin_id)));
                }
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    log::debug!("coin {} not created yet (poll {poll})", hex::encode(coin_id));
                }
                Err(Error::FullNode(e)) => {
                    log::warn!("full node unavailable while polling: {e}");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(Error::Timeout {
            coin_id: hex::encode(coin_id),
            state: "created",
        })
    }

    /// Poll until the coin is spent.
    pub async fn wait_for_coin_spent(&self, coin_id: Bytes32) -> Result<()> {
        for poll in 0..self.config.max_polls {
            match self.full_node.coin_record(coin_id).await {
                Ok(Some(record)) if record.is_spent() => return Ok(()),
                Ok(_) => {
                    log::debug!("coin {} not spent yet (poll {poll})", hex::encode(coin_id));
                }
                Err(Error::FullNode(e)) => {
                    log::warn!("full node unavailable while polling: {e}");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
        Err(Error::Timeout {
            coin_id: hex::encode(coin_id),
            state: "spent",
        })
    }

    // ── Spend construction ──────────────────────────────────────────

    /// Lineage of the root node coin, read from the genesis coin's spend.
    async fn root_lineage(&self, asset_id: Bytes32) -> Result<LineageProof> {
        let proof = self
            .root_lineage
            .get_or_try_init(|| async {
                let record = self
                    .full_node
                    .coin_record(self.genesis_coin_id)
                    .await?
                    .ok_or_else(|| {
                        Error::FullNode(format!(
                            "genesis coin {} not found",
                            hex::encode(self.genesis_coin_id)
                        ))
                    })?;
                if !record.is_spent() {
                    return Err(Error::FullNode(format!(
                        "genesis coin {} is not spent",
                        hex::encode(self.genesis_coin_id)
                    )));
                }
                let parent_spend = self
                    .full_node
                    .puzzle_and_solution(self.genesis_coin_id, record.spent_block_index)
                    .await?;
                lineage_from_parent_spend(&parent_spend, asset_id)
            })
            .await?;
        Ok(*proof)
    }

    /// Concrete, dry-run-checked spends for tree nodes, and their total cost.
    pub async fn tree_spends(&self, spends: &[BagSpend]) -> Result<(Vec<CoinSpend>, u64)> {
        let coin_spends = match self.bag.asset_id() {
            Some(asset_id) => {
                let mut cats = Vec::with_capacity(spends.len());
                for spend in spends {
                    let lineage = match spend.lineage {
                        Some(lineage) => lineage,
                        None => self.root_lineage(asset_id).await?,
                    };
                    cats.push(SpendableCat {
                        coin: spend.coin,
                        inner_puzzle: spend.inner_puzzle().clone(),
                        inner_solution: Program::default(),
                        lineage_proof: Some(lineage),
                    });
                }
                spend_cats(asset_id, &cats)?
            }
            None => spends
                .iter()
                .map(|s| s.to_coin_spend(None))
                .collect::<Result<Vec<_>>>()?,
        };

        let mut total_cost = 0u64;
        for coin_spend in &coin_spends {
            let mut a = Allocator::new();
            let (cost, conditions) = spend_conditions(&mut a, coin_spend, self.config.max_cost)?;
            let created = created_amount(&conditions)?;
            if created != coin_spend.coin.amount {
                return Err(Error::ScriptExecution(format!(
                    "spend of {} creates {created} mojos from {}",
                    hex::encode(coin_spend.coin.coin_id()),
                    coin_spend.coin.amount
                )));
            }
            total_cost = total_cost.saturating_add(cost);
        }
        Ok((coin_spends, total_cost))
    }

    /// Signed wallet transaction paying the fee, bound to `anchor`'s
    /// `"$"` announcement.
    async fn fee_bundle(&self, anchor: Bytes32) -> Result<SpendBundle> {
        let fee = self.config.fee;
        let wallet_id = self.config.wallet_id;
        let coins = self.wallet.select_coins(fee, wallet_id).await?;
        let selected = coins
            .iter()
            .try_fold(0u64, |acc, c| acc.checked_add(c.amount))
            .ok_or(Error::AmountOverflow)?;
        if selected < fee {
            return Err(Error::Wallet(format!(
                "selected {selected} mojos, fee needs {fee}"
            )));
        }
        let mut additions = Vec::new();
        if selected > fee {
            let change_puzzle_hash = self.wallet.next_change_puzzle_hash(wallet_id).await?;
            additions.push(Target::new(change_puzzle_hash, selected - fee));
        }
        let request = TransactionRequest {
            wallet_id,
            additions,
            fee,
            coins,
            coin_announcements: vec![CoinAnnouncement {
                coin_id: anchor,
                message: SELF_ANNOUNCEMENT.to_vec(),
            }],
        };
        self.wallet.create_signed_transaction(&request).await
    }

    /// The transaction for `coin_spends`, with the fee attached if configured.
    async fn transaction(&self, coin_spends: Vec<CoinSpend>) -> Result<SpendBundle> {
        let anchor = coin_spends.first().map(|cs| cs.coin.coin_id());
        let bundle = unsigned_bundle(coin_spends);
        match anchor {
            Some(anchor) if self.config.fee > 0 => {
                let fee_bundle = self.fee_bundle(anchor).await?;
                Ok(SpendBundle::aggregate(&[bundle, fee_bundle]))
            }
            _ => Ok(bundle),
        }
    }

    // ── Execution ───────────────────────────────────────────────────

    /// Unwind the path to a single target, one spend per transaction.
    pub async fn unwind_target(&self, inner_puzzle_hash: Bytes32) -> Result<UnwindReport> {
        let key = self.bag.key_for(inner_puzzle_hash);
        if key == self.bag.outer_root_puzzle_hash() {
            // The funding transaction already created it.
            return Ok(UnwindReport::default());
        }
        if !self.bag.lookup().contains(&key) {
            return Err(Error::Config(format!(
                "puzzle hash {} is not a member of the bag",
                hex::encode(inner_puzzle_hash)
            )));
        }

        let mut spends = self.get_unwind(key).await?;
        spends.reverse();

        let mut report = UnwindReport::default();
        let count = spends.len();
        for (i, spend) in spends.iter().enumerate() {
            let coin_id = spend.coin_id();
            self.wait_for_coin_unspent(coin_id).await?;

            let (coin_spends, cost) = self.tree_spends(std::slice::from_ref(spend)).await?;
            if cost > self.config.max_cost {
                return Err(Error::ScriptExecution(format!(
                    "spend of {} costs {cost}",
                    hex::encode(coin_id)
                )));
            }
            let bundle = self.transaction(coin_spends).await?;
            self.full_node.push_tx(&bundle).await?;
            report.spends += 1;
            report.transactions += 1;
            log::info!("pushed spend {}/{count} of coin {}", i + 1, hex::encode(coin_id));

            if i + 1 < count {
                self.wait_for_coin_spent(coin_id).await?;
            }
        }
        Ok(report)
    }

    /// Unwind every target, level by level from the root down.
    pub async fn unwind_bag(&self) -> Result<UnwindReport> {
        let mut groups: BTreeMap<usize, Vec<BagSpend>> = BTreeMap::new();
        let mut already_spent = 0usize;
        for spend in node_spends(self.genesis_coin_id, self.bag)? {
            match self.full_node.coin_record(spend.coin_id()).await? {
                Some(record) if record.is_spent() => already_spent += 1,
                _ => groups.entry(spend.depth).or_default().push(spend),
            }
        }
        if already_spent > 0 {
            log::warn!("{already_spent} node coins are already spent; somebody else might be unwinding the bag");
        }

        let mut report = UnwindReport::default();
        let batch_size = self.config.spend_batch_size.max(1);
        for (depth, group) in groups {
            log::info!("depth {depth}: {} spends", group.len());

            let mut chunks: VecDeque<Vec<BagSpend>> =
                group.chunks(batch_size).map(<[BagSpend]>::to_vec).collect();
            let mut pushed = Vec::with_capacity(group.len());
            while let Some(chunk) = chunks.pop_front() {
                try_join_all(chunk.iter().map(|s| self.wait_for_coin_unspent(s.coin_id()))).await?;

                let (coin_spends, cost) = self.tree_spends(&chunk).await?;
                if cost > self.config.max_cost {
                    if chunk.len() == 1 {
                        return Err(Error::ScriptExecution(format!(
                            "spend of {} costs {cost}",
                            hex::encode(chunk[0].coin_id())
                        )));
                    }
                    let mut first = chunk;
                    let second = first.split_off(first.len() / 2);
                    chunks.push_front(second);
                    chunks.push_front(first);
                    continue;
                }

                let bundle = self.transaction(coin_spends).await?;
                self.full_node.push_tx(&bundle).await?;
                report.spends += chunk.len();
                report.transactions += 1;
                pushed.extend(chunk.iter().map(BagSpend::coin_id));
            }

            try_join_all(pushed.iter().map(|id| self.wait_for_coin_spent(*id))).await?;
            log::info!("depth {depth} confirmed");
        }
        Ok(report)
    }
}
