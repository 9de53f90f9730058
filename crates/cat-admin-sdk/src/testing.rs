//! In-memory ledger and wallet for exercising unwind and issuance flows
//! without a node.
//!
//! [`MockFullNode::push_tx`] confirms a bundle immediately: it runs every
//! puzzle, checks coin announcements, spends the removals and creates the
//! additions in a new block.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chia_protocol::{Bytes32, Coin};
use chia_puzzle_types::Memos;
use chia_wallet_sdk::driver::SpendContext;
use clvmr::allocator::Allocator;

use crate::chain::{CoinRecord, FullNodeService, TransactionRequest, WalletService};
use crate::conditions::{Condition, Conditions, coin_announcement_id};
use crate::error::{Error, Result};
use crate::program::{MAX_BLOCK_COST_CLVM, Program, tree_hash};
use crate::spend::{CoinSpend, SpendBundle, spend_conditions, unsigned_bundle};

#[derive(Default)]
struct Ledger {
    height: u32,
    coins: HashMap<Bytes32, CoinRecord>,
    spends: HashMap<Bytes32, CoinSpend>,
    pushed: Vec<SpendBundle>,
}

#[derive(Default)]
pub struct MockFullNode {
    ledger: Mutex<Ledger>,
}

impl MockFullNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| Error::FullNode("mock ledger poisoned".into()))
    }

    /// Create an unspent coin in a new block.
    pub fn add_coin(&self, coin: Coin) {
        if let Ok(mut ledger) = self.ledger() {
            ledger.height += 1;
            let height = ledger.height;
            ledger.coins.insert(
                coin.coin_id(),
                CoinRecord {
                    coin,
                    confirmed_block_index: height,
                    spent_block_index: 0,
                },
            );
        }
    }

    /// Record a coin that was created and spent before the test started.
    pub fn add_spent_coin(&self, spend: CoinSpend) {
        if let Ok(mut ledger) = self.ledger() {
            ledger.height += 1;
            let height = ledger.height;
            let coin_id = spend.coin.coin_id();
            ledger.coins.insert(
                coin_id,
                CoinRecord {
                    coin: spend.coin,
                    confirmed_block_index: height,
                    spent_block_index: height,
                },
            );
            ledger.spends.insert(coin_id, spend);
        }
    }

    pub fn pushed(&self) -> Vec<SpendBundle> {
        self.ledger().map(|l| l.pushed.clone()).unwrap_or_default()
    }

    pub fn unspent_coins(&self, puzzle_hash: Bytes32) -> Vec<Coin> {
        let Ok(ledger) = self.ledger() else {
            return Vec::new();
        };
        let mut coins: Vec<Coin> = ledger
            .coins
            .values()
            .filter(|r| !r.is_spent() && r.coin.puzzle_hash == puzzle_hash)
            .map(|r| r.coin)
            .collect();
        coins.sort_by_key(|c| c.amount);
        coins
    }

    pub fn is_unspent(&self, coin_id: Bytes32) -> bool {
        self.ledger()
            .map(|l| l.coins.get(&coin_id).is_some_and(|r| !r.is_spent()))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl FullNodeService for MockFullNode {
    async fn coin_record(&self, coin_id: Bytes32) -> Result<Option<CoinRecord>> {
        Ok(self.ledger()?.coins.get(&coin_id).cloned())
    }

    async fn puzzle_and_solution(&self, coin_id: Bytes32, _height: u32) -> Result<CoinSpend> {
        self.ledger()?
            .spends
            .get(&coin_id)
            .cloned()
            .ok_or_else(|| Error::FullNode(format!("no spend for {}", hex::encode(coin_id))))
    }

    async fn push_tx(&self, bundle: &SpendBundle) -> Result<()> {
        let mut ledger = self.ledger()?;

        let mut announcements = HashSet::new();
        let mut asserted = Vec::new();
        let mut additions = Vec::new();
        let mut input = 0u128;
        let mut output = 0u128;
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.coin_id();
            input += spend.coin.amount as u128;

            let mut a = Allocator::new();
            let (_, conditions) = spend_conditions(&mut a, spend, MAX_BLOCK_COST_CLVM)?;
            for condition in conditions {
                match condition {
                    Condition::CreateCoin(create_coin) => {
                        output += create_coin.amount as u128;
                        additions.push(Coin::new(
                            coin_id,
                            create_coin.puzzle_hash,
                            create_coin.amount,
                        ));
                    }
                    Condition::CreateCoinAnnouncement(announcement) => {
                        announcements
                            .insert(coin_announcement_id(coin_id, announcement.message.as_slice()));
                    }
                    Condition::AssertCoinAnnouncement(assertion) => {
                        asserted.push(assertion.announcement_id);
                    }
                    _ => {}
                }
            }
        }

        // Coins created and spent in the same bundle are ephemeral.
        let created: HashSet<Bytes32> = additions.iter().map(Coin::coin_id).collect();
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.coin_id();
            match ledger.coins.get(&coin_id) {
                Some(record) if record.is_spent() => {
                    return Err(Error::FullNode(format!(
                        "double spend of {}",
                        hex::encode(coin_id)
                    )));
                }
                Some(_) => {}
                None if created.contains(&coin_id) => {}
                None => {
                    return Err(Error::FullNode(format!(
                        "unknown coin {}",
                        hex::encode(coin_id)
                    )));
                }
            }
        }
        if output > input {
            return Err(Error::FullNode("outputs exceed inputs".into()));
        }
        if let Some(missing) = asserted.iter().find(|id| !announcements.contains(*id)) {
            return Err(Error::FullNode(format!(
                "assert coin announcement failed: {}",
                hex::encode(missing)
            )));
        }

        ledger.height += 1;
        let height = ledger.height;
        for coin in additions {
            ledger.coins.insert(
                coin.coin_id(),
                CoinRecord {
                    coin,
                    confirmed_block_index: height,
                    spent_block_index: 0,
                },
            );
        }
        for spend in &bundle.coin_spends {
            let coin_id = spend.coin.coin_id();
            if let Some(record) = ledger.coins.get_mut(&coin_id) {
                record.spent_block_index = height;
            }
            ledger.spends.insert(coin_id, spend.clone());
        }
        ledger.pushed.push(bundle.clone());
        Ok(())
    }
}

/// Wallet whose coins are locked by the puzzle `1`: the solution is the
/// condition list, so no signature is needed.
pub struct MockWallet {
    node: Arc<MockFullNode>,
    funded: Mutex<u64>,
}

impl MockWallet {
    pub fn new(node: Arc<MockFullNode>) -> Self {
        Self {
            node,
            funded: Mutex::new(0),
        }
    }

    pub fn puzzle() -> Program {
        Program::from(vec![1])
    }

    pub fn puzzle_hash() -> Bytes32 {
        tree_hash(&Self::puzzle()).expect("valid program")
    }

    /// Give the wallet a fresh coin on the ledger.
    pub fn fund(&self, amount: u64) -> Coin {
        let nonce = match self.funded.lock() {
            Ok(mut n) => {
                *n += 1;
                *n
            }
            Err(_) => 0,
        };
        let mut parent = [0xfa; 32];
        parent[24..].copy_from_slice(&nonce.to_be_bytes());
        let coin = Coin::new(Bytes32::new(parent), Self::puzzle_hash(), amount);
        self.node.add_coin(coin);
        coin
    }

    pub fn balance(&self) -> u64 {
        self.node
            .unspent_coins(Self::puzzle_hash())
            .iter()
            .map(|c| c.amount)
            .sum()
    }

    fn select(&self, amount: u64) -> Result<Vec<Coin>> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        for coin in self.node.unspent_coins(Self::puzzle_hash()) {
            if total >= amount && !selected.is_empty() {
                break;
            }
            total += coin.amount;
            selected.push(coin);
        }
        if total < amount || selected.is_empty() {
            return Err(Error::Wallet(format!("insufficient funds for {amount}")));
        }
        Ok(selected)
    }
}

#[async_trait::async_trait]
impl WalletService for MockWallet {
    async fn select_coins(&self, amount: u64, _wallet_id: u32) -> Result<Vec<Coin>> {
        self.select(amount)
    }

    async fn next_change_puzzle_hash(&self, _wallet_id: u32) -> Result<Bytes32> {
        Ok(Self::puzzle_hash())
    }

    async fn create_signed_transaction(&self, request: &TransactionRequest) -> Result<SpendBundle> {
        let spent: u64 = request.additions.iter().map(|t| t.amount).sum::<u64>() + request.fee;
        let coins = if request.coins.is_empty() {
            self.select(spent)?
        } else {
            request.coins.clone()
        };
        let selected: u64 = coins.iter().map(|c| c.amount).sum();
        if selected < spent {
            return Err(Error::Wallet(format!("coins cover {selected}, need {spent}")));
        }

        let mut conditions = Conditions::new();
        for target in &request.additions {
            conditions = conditions.create_coin(target.puzzle_hash, target.amount, Memos::None);
        }
        if request.coins.is_empty() && selected > spent {
            conditions = conditions.create_coin(Self::puzzle_hash(), selected - spent, Memos::None);
        }
        for announcement in &request.coin_announcements {
            conditions = conditions.assert_coin_announcement(coin_announcement_id(
                announcement.coin_id,
                &announcement.message,
            ));
        }

        let mut ctx = SpendContext::new();
        let solution = ctx.serialize(&conditions)?;
        let spends = coins
            .into_iter()
            .enumerate()
            .map(|(i, coin)| {
                let solution = if i == 0 { solution.clone() } else { Program::default() };
                CoinSpend::new(coin, Self::puzzle(), solution)
            })
            .collect();
        Ok(unsigned_bundle(spends))
    }
}
