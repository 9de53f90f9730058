pub mod bag;
pub mod cat;
pub mod chain;
pub mod conditions;
pub mod error;
pub mod issuance;
pub mod network;
pub mod program;
pub mod resolve;
pub mod spend;
pub mod target;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod unwind;

// Core types
pub use error::{Error, Result};
pub use network::{Network, decode_puzzle_hash, encode_puzzle_hash};
pub use program::{MAX_BLOCK_COST_CLVM, Program, parse_program};
pub use target::{Target, parse_bytes32, parse_targets, read_targets, total_amount};

// Ledger primitives
pub use chia_bls::Signature;
pub use chia_protocol::{Bytes32, Coin};
pub use spend::{
    CoinSpend, SpendBundle, bundle_from_json, bundle_to_json, bytes32_hex, coin_from_json,
    coin_to_json, parse_signature, unsigned_bundle,
};

// Secure the bag
pub use bag::{
    BagNode, BatchingPolicy, ParentLookup, SecuredBag, TargetCoin, batch_the_bag, secure_the_bag,
};
pub use resolve::{BagSpend, ancestor_spends, node_spends, parent_of_puzzle_hash};

// CAT wrapping and issuance
pub use cat::{
    LineageProof, SpendableCat, cat_puzzle_hash, construct_cat_puzzle, match_cat_puzzle,
    spend_cats,
};
pub use issuance::{IssuanceRequest, IssuedCat, eve_inner_puzzle, issue_cat};

// Ledger services and unwinding
pub use chain::{CoinAnnouncement, CoinRecord, FullNodeService, TransactionRequest, WalletService};
pub use unwind::{UnwindConfig, UnwindReport, Unwinder};
