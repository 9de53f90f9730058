//! Serialized CLVM programs.
//!
//! Programs travel as [`chia_protocol::Program`]. Anything that needs
//! structure (currying, running, hashing) goes through a short-lived
//! [`Allocator`].

use std::path::Path;

use chia_protocol::Bytes32;
use clvm_traits::{FromClvm, Raw, ToClvm, clvm_quote};
use clvm_utils::{CurriedProgram, tree_hash_from_bytes};
use clvmr::allocator::{Allocator, NodePtr};
use clvmr::serde::serialized_length_from_bytes;

pub use chia_protocol::Program;

use crate::error::{Error, Result};

/// Default cost ceiling for a single spend (the per-block limit).
pub const MAX_BLOCK_COST_CLVM: u64 = 11_000_000_000;

/// Wrap `bytes` after checking they hold exactly one serialized value.
pub fn program_from_bytes(bytes: Vec<u8>) -> Result<Program> {
    let len = serialized_length_from_bytes(&bytes)
        .map_err(|e| Error::Program(format!("invalid serialization: {e}")))?;
    if len != bytes.len() as u64 {
        return Err(Error::Program(format!(
            "{} trailing bytes after the program",
            bytes.len() as u64 - len
        )));
    }
    Ok(Program::from(bytes))
}

pub fn program_from_hex(s: &str) -> Result<Program> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(trimmed).map_err(|e| Error::Program(format!("invalid hex: {e}")))?;
    program_from_bytes(bytes)
}

/// sha256 tree hash of a serialized program.
pub fn tree_hash(program: &Program) -> Result<Bytes32> {
    tree_hash_from_bytes(program.as_ref())
        .map(Bytes32::from)
        .map_err(|e| Error::Program(format!("invalid serialization: {e}")))
}

pub fn node_to_program(a: &Allocator, node: NodePtr) -> Result<Program> {
    Ok(Program::from_clvm(a, node)?)
}

/// `(a (q . module) (c (q . arg0) (c (q . arg1) ... 1)))`
pub fn curry_program(module: &Program, args: &[Program]) -> Result<Program> {
    let mut a = Allocator::new();
    let mut env = 1u8.to_clvm(&mut a)?;
    for arg in args.iter().rev() {
        env = (4, (clvm_quote!(arg), (Raw(env), ()))).to_clvm(&mut a)?;
    }
    let curried = CurriedProgram {
        program: module,
        args: Raw(env),
    }
    .to_clvm(&mut a)?;
    node_to_program(&a, curried)
}

/// Accepts serialized CLVM as hex, either inline or in a file.
///
/// Chialisp source and CLVM assembly text must be compiled with the
/// language toolchain first.
pub fn parse_program(input: &str) -> Result<Program> {
    let path = Path::new(input);
    let text = if path.is_file() {
        std::fs::read_to_string(path)
            .map_err(|e| Error::Program(format!("{}: {e}", path.display())))?
    } else {
        input.to_string()
    };
    program_from_hex(&text).map_err(|e| {
        Error::Program(format!(
            "expected serialized CLVM hex (compile chialisp first): {e}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clvm_utils::{TreeHash, curry_tree_hash};

    #[test]
    fn nil_hash() {
        assert_eq!(
            hex::encode(tree_hash(&Program::default()).unwrap()),
            "4bf5122f344554c53bde2ebb8cd2b7e3d1600ad631c385a5d7cce23c7785459a"
        );
    }

    #[test]
    fn curried_hash_matches_the_hash_only_form() {
        // (q . 1)
        let module = program_from_hex("ff0101").unwrap();
        let args = vec![program_from_hex("8568656c6c6f").unwrap(), Program::default()];
        let curried = curry_program(&module, &args).unwrap();

        let arg_hashes: Vec<TreeHash> = args
            .iter()
            .map(|p| tree_hash(p).unwrap().into())
            .collect();
        let expected = curry_tree_hash(tree_hash(&module).unwrap().into(), &arg_hashes);
        assert_eq!(tree_hash(&curried).unwrap(), Bytes32::from(expected));
        assert_eq!(curry_program(&module, &[]).unwrap(), program_from_hex("ff02ffff01ff0101ff0180").unwrap());
    }

    #[test]
    fn parse_program_accepts_hex_and_files() {
        assert_eq!(parse_program("0xff0105").unwrap(), program_from_hex("ff0105").unwrap());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.hex");
        std::fs::write(&path, "ff0105\n").unwrap();
        assert_eq!(
            parse_program(path.to_str().unwrap()).unwrap(),
            program_from_hex("ff0105").unwrap()
        );

        assert!(parse_program("(q . 5)").is_err());
        // truncated pair
        assert!(program_from_hex("ff01").is_err());
        // two values back to back
        assert!(program_from_hex("8080").is_err());
    }
}
