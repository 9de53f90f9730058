use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("target list is empty")]
    EmptyTargets,

    #[error("leaf width must be at least 2 (got {0})")]
    InvalidLeafWidth(usize),

    #[error("targets file: {0}")]
    TargetsFile(String),

    #[error("amount mismatch: expected {expected}, targets sum to {actual}")]
    AmountMismatch { expected: u64, actual: u64 },

    #[error("amount overflow while summing targets")]
    AmountOverflow,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("address error: {0}")]
    Address(String),

    #[error("CLVM program error: {0}")]
    Program(String),

    #[error("script execution failed: {0}")]
    ScriptExecution(String),

    #[error("puzzle is not a CAT: {0}")]
    NotCat(String),

    #[error("lookup chain does not terminate at {0}")]
    LookupCycle(String),

    #[error("coin {0} is already spent")]
    CoinAlreadySpent(String),

    #[error("timed out waiting for coin {coin_id} to be {state}")]
    Timeout { coin_id: String, state: &'static str },

    #[error("full node error: {0}")]
    FullNode(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("spend bundle error: {0}")]
    SpendBundle(String),

    #[error("CLVM encoding failed: {0}")]
    ToClvm(#[from] clvm_traits::ToClvmError),

    #[error("CLVM decoding failed: {0}")]
    FromClvm(#[from] clvm_traits::FromClvmError),
}

impl From<chia_wallet_sdk::driver::DriverError> for Error {
    fn from(e: chia_wallet_sdk::driver::DriverError) -> Self {
        Error::Program(e.to_string())
    }
}

impl Error {
    /// Ledger races must never be retried; everything else is up to the caller.
    pub fn is_ledger_race(&self) -> bool {
        matches!(self, Error::CoinAlreadySpent(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
