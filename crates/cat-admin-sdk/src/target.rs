use std::path::Path;

use chia_protocol::Bytes32;
use chia_puzzle_types::Memos;
use chia_wallet_sdk::driver::SpendContext;

use crate::conditions::Conditions;
use crate::error::{Error, Result};

/// A payout leaf: `amount` mojos to `puzzle_hash`.
///
/// Interior tree nodes are targets too, one level up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub puzzle_hash: Bytes32,
    pub amount: u64,
}

impl Target {
    pub fn new(puzzle_hash: Bytes32, amount: u64) -> Self {
        Self {
            puzzle_hash,
            amount,
        }
    }

    /// Append a `CREATE_COIN` paying this target, memoed with its own
    /// puzzle hash so wallets pick the coin up.
    pub fn add_create_coin(&self, ctx: &mut SpendContext, conditions: Conditions) -> Result<Conditions> {
        let memos = ctx.alloc(&[self.puzzle_hash])?;
        Ok(conditions.create_coin(self.puzzle_hash, self.amount, Memos::Some(memos)))
    }
}

pub fn parse_bytes32(s: &str) -> Result<Bytes32> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(trimmed).map_err(|e| Error::Config(format!("invalid hex {s:?}: {e}")))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Config(format!("expected 32 bytes: {s:?}")))?;
    Ok(Bytes32::new(arr))
}

/// Parse `puzzle_hash_hex,amount` rows. Blank lines are skipped.
pub fn parse_targets(contents: &str) -> Result<Vec<Target>> {
    let mut targets = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let row = idx + 1;
        let (ph, amount) = line
            .split_once(',')
            .ok_or_else(|| Error::TargetsFile(format!("row {row}: expected `puzzle_hash,amount`")))?;
        let puzzle_hash = parse_bytes32(ph)
            .map_err(|e| Error::TargetsFile(format!("row {row}: {e}")))?;
        let amount = amount
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::TargetsFile(format!("row {row}: invalid amount: {e}")))?;
        targets.push(Target::new(puzzle_hash, amount));
    }
    Ok(targets)
}

pub fn total_amount(targets: &[Target]) -> Result<u64> {
    targets
        .iter()
        .try_fold(0u64, |acc, t| acc.checked_add(t.amount))
        .ok_or(Error::AmountOverflow)
}

/// Read a targets file, failing when `expected` is given and the amounts
/// do not sum to it.
pub fn read_targets(path: &Path, expected: Option<u64>) -> Result<Vec<Target>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::TargetsFile(format!("{}: {e}", path.display())))?;
    let targets = parse_targets(&contents)?;

    if let Some(expected) = expected {
        let actual = total_amount(&targets)?;
        if actual != expected {
            return Err(Error::AmountMismatch { expected, actual });
        }
    }
    log::info!("read {} targets from {}", targets.len(), path.display());
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ROWS: &str = "\
4bc6435b409bcbabe53870dae0f03755f6aabb4594c5915ec983acf12a5d1fba,10000000000000000
0xf3d5162330c4d6c8b9a0aba5eed999178dd2bf466a7a0289739acc8209122e2c,32100000000

7ffdeca4f997bde55d249b4a3adb8077782bc4134109698e95b10ea306a138b4,10000000000000000
";

    fn write_rows(rows: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_rows_with_optional_prefix() {
        let targets = parse_targets(ROWS).unwrap();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[1].amount, 32_100_000_000);
        assert_eq!(
            hex::encode(targets[1].puzzle_hash),
            "f3d5162330c4d6c8b9a0aba5eed999178dd2bf466a7a0289739acc8209122e2c"
        );
    }

    #[test]
    fn read_targets_checks_the_net_amount() {
        let file = write_rows(ROWS);
        let sum = 20_000_032_100_000_000;
        assert_eq!(read_targets(file.path(), Some(sum)).unwrap().len(), 3);
        assert_eq!(read_targets(file.path(), None).unwrap().len(), 3);

        match read_targets(file.path(), Some(sum + 1)) {
            Err(Error::AmountMismatch { expected, actual }) => {
                assert_eq!(expected, sum + 1);
                assert_eq!(actual, sum);
            }
            other => panic!("expected AmountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(matches!(parse_targets("abcd,1"), Err(Error::TargetsFile(_))));
        assert!(matches!(
            parse_targets("4bc6435b409bcbabe53870dae0f03755f6aabb4594c5915ec983acf12a5d1fba"),
            Err(Error::TargetsFile(_))
        ));
        assert!(matches!(
            parse_targets("4bc6435b409bcbabe53870dae0f03755f6aabb4594c5915ec983acf12a5d1fba,-5"),
            Err(Error::TargetsFile(_))
        ));
    }

    #[test]
    fn memo_is_the_puzzle_hash() {
        let mut ctx = SpendContext::new();
        let t = Target::new(Bytes32::new([3u8; 32]), 9);
        let conditions = t.add_create_coin(&mut ctx, Conditions::new()).unwrap();
        let encoded = ctx.serialize(&conditions).unwrap();
        // ((51 ph 9 (ph)))
        let expected = format!("ffff33ffa0{ph}ff09ffffa0{ph}808080", ph = "03".repeat(32));
        assert_eq!(hex::encode(encoded.as_ref()), expected);
    }
}
