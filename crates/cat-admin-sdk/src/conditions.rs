//! Conditions emitted by running a puzzle with its solution.

use chia_protocol::Bytes32;
use chia_wallet_sdk::driver::SpendContext;
use clvm_traits::{FromClvm, clvm_quote};
use clvmr::allocator::Allocator;
use clvmr::chia_dialect::ChiaDialect;
use clvmr::reduction::Reduction;
use clvmr::run_program::run_program;
use clvmr::serde::node_from_bytes;

pub use chia_wallet_sdk::types::{Condition, Conditions};

use crate::error::{Error, Result};
use crate::program::Program;

/// Announcement every tree node makes so fee spends can bind to it.
pub const SELF_ANNOUNCEMENT: &[u8] = b"$";

/// `(q . conditions)`, a puzzle that ignores its solution.
pub fn conditions_puzzle(ctx: &mut SpendContext, conditions: Conditions) -> Result<Program> {
    Ok(ctx.serialize(&clvm_quote!(conditions))?)
}

/// Run `puzzle` against `solution` and decode the condition list. The
/// conditions borrow nodes from `a`.
pub fn run_puzzle(
    a: &mut Allocator,
    puzzle: &Program,
    solution: &Program,
    max_cost: u64,
) -> Result<(u64, Vec<Condition>)> {
    let program = node_from_bytes(a, puzzle.as_ref())
        .map_err(|e| Error::Program(format!("puzzle: {e}")))?;
    let env = node_from_bytes(a, solution.as_ref())
        .map_err(|e| Error::Program(format!("solution: {e}")))?;
    let Reduction(cost, output) = run_program(a, &ChiaDialect::new(0), program, env, max_cost)
        .map_err(|e| Error::ScriptExecution(format!("{e:?}")))?;
    let conditions = Vec::<Condition>::from_clvm(a, output)?;
    Ok((cost, conditions))
}

/// Id asserted by `ASSERT_COIN_ANNOUNCEMENT`: `sha256(coin_id || message)`.
pub fn coin_announcement_id(coin_id: Bytes32, message: &[u8]) -> Bytes32 {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(coin_id.as_ref());
    hasher.update(message);
    Bytes32::new(hasher.finalize().into())
}

/// Sum of all `CREATE_COIN` outputs, with overflow detection.
pub fn created_amount(conditions: &[Condition]) -> Result<u64> {
    conditions.iter().try_fold(0u64, |acc, c| match c {
        Condition::CreateCoin(create_coin) => acc
            .checked_add(create_coin.amount)
            .ok_or(Error::AmountOverflow),
        _ => Ok(acc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{MAX_BLOCK_COST_CLVM, program_from_hex};
    use crate::target::Target;
    use clvmr::allocator::SExp;

    #[test]
    fn puzzle_emits_its_conditions() {
        let mut ctx = SpendContext::new();
        let ph = Bytes32::new([7u8; 32]);
        let conditions = Conditions::new().create_coin_announcement(SELF_ANNOUNCEMENT.to_vec().into());
        let conditions = Target::new(ph, 1000).add_create_coin(&mut ctx, conditions).unwrap();
        let puzzle = conditions_puzzle(&mut ctx, conditions).unwrap();

        let mut a = Allocator::new();
        let (_, output) = run_puzzle(&mut a, &puzzle, &Program::default(), MAX_BLOCK_COST_CLVM).unwrap();
        assert_eq!(output.len(), 2);
        assert!(matches!(
            &output[0],
            Condition::CreateCoinAnnouncement(announcement) if announcement.message.as_slice() == b"$"
        ));
        assert!(matches!(
            &output[1],
            Condition::CreateCoin(create_coin) if create_coin.puzzle_hash == ph && create_coin.amount == 1000
        ));
        assert_eq!(created_amount(&output).unwrap(), 1000);
    }

    #[test]
    fn wide_opcodes_keep_their_bytes() {
        // (q . ((0x0133 5)))
        let puzzle = program_from_hex("ff01ffff820133ff058080").unwrap();
        let mut a = Allocator::new();
        let (_, output) = run_puzzle(&mut a, &puzzle, &Program::default(), MAX_BLOCK_COST_CLVM).unwrap();
        let [Condition::Other(node)] = output.as_slice() else {
            panic!("expected one opaque condition, got {output:?}");
        };
        let SExp::Pair(opcode, _) = a.sexp(*node) else {
            panic!("condition is not a list");
        };
        assert_eq!(AsRef::<[u8]>::as_ref(&a.atom(opcode)), [0x01, 0x33]);
        assert_eq!(created_amount(&output).unwrap(), 0);
    }

    #[test]
    fn raising_puzzles_fail() {
        // (x)
        let puzzle = program_from_hex("ff0880").unwrap();
        let mut a = Allocator::new();
        assert!(matches!(
            run_puzzle(&mut a, &puzzle, &Program::default(), MAX_BLOCK_COST_CLVM),
            Err(Error::ScriptExecution(_))
        ));
    }

    #[test]
    fn overflow_is_reported() {
        let mut ctx = SpendContext::new();
        let big = Target::new(Bytes32::new([1u8; 32]), u64::MAX);
        let conditions = big.add_create_coin(&mut ctx, Conditions::new()).unwrap();
        let conditions = big.add_create_coin(&mut ctx, conditions).unwrap();
        let puzzle = conditions_puzzle(&mut ctx, conditions).unwrap();

        let mut a = Allocator::new();
        let (_, output) = run_puzzle(&mut a, &puzzle, &Program::default(), MAX_BLOCK_COST_CLVM).unwrap();
        assert!(matches!(created_amount(&output), Err(Error::AmountOverflow)));
    }
}
