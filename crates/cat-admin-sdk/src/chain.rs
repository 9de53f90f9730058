use chia_protocol::{Bytes32, Coin};

use crate::error::Result;
use crate::spend::{CoinSpend, SpendBundle};
use crate::target::Target;

/// Ledger view of a coin.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinRecord {
    pub coin: Coin,
    pub confirmed_block_index: u32,
    /// 0 while unspent.
    pub spent_block_index: u32,
}

impl CoinRecord {
    pub fn is_spent(&self) -> bool {
        self.spent_block_index != 0
    }
}

/// A coin announcement the wallet's transaction must assert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinAnnouncement {
    pub coin_id: Bytes32,
    pub message: Vec<u8>,
}

/// Input to [`WalletService::create_signed_transaction`].
#[derive(Debug, Clone, Default)]
pub struct TransactionRequest {
    pub wallet_id: u32,
    pub additions: Vec<Target>,
    pub fee: u64,
    /// Spend exactly these coins when non-empty; otherwise the wallet selects.
    pub coins: Vec<Coin>,
    pub coin_announcements: Vec<CoinAnnouncement>,
}

/// Backend for querying and extending the ledger.
#[async_trait::async_trait]
pub trait FullNodeService: Send + Sync {
    /// `None` when the ledger has never seen the coin.
    async fn coin_record(&self, coin_id: Bytes32) -> Result<Option<CoinRecord>>;

    /// The historical spend of a coin spent at `height`.
    async fn puzzle_and_solution(&self, coin_id: Bytes32, height: u32) -> Result<CoinSpend>;

    /// Submit a spend bundle to the mempool.
    async fn push_tx(&self, bundle: &SpendBundle) -> Result<()>;
}

/// Backend for a wallet that funds and signs transactions.
#[async_trait::async_trait]
pub trait WalletService: Send + Sync {
    async fn select_coins(&self, amount: u64, wallet_id: u32) -> Result<Vec<Coin>>;

    async fn next_change_puzzle_hash(&self, wallet_id: u32) -> Result<Bytes32>;

    async fn create_signed_transaction(&self, request: &TransactionRequest) -> Result<SpendBundle>;
}
