use bech32::{Bech32m, Hrp};
use chia_protocol::Bytes32;

use crate::error::{Error, Result};

/// Chia network variants, as far as addresses are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn address_prefix(self) -> &'static str {
        match self {
            Network::Mainnet => "xch",
            Network::Testnet => "txch",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "xch" => Ok(Network::Mainnet),
            "testnet" | "testnet11" | "txch" => Ok(Network::Testnet),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}

/// Bech32m address for a puzzle hash.
pub fn encode_puzzle_hash(puzzle_hash: Bytes32, prefix: &str) -> Result<String> {
    let hrp = Hrp::parse(prefix).map_err(|e| Error::Address(format!("prefix {prefix:?}: {e}")))?;
    bech32::encode::<Bech32m>(hrp, puzzle_hash.as_ref()).map_err(|e| Error::Address(e.to_string()))
}

/// Puzzle hash of a bech32m address. Any prefix is accepted.
pub fn decode_puzzle_hash(address: &str) -> Result<Bytes32> {
    let (_, data) = bech32::decode(address.trim())
        .map_err(|e| Error::Address(format!("{address}: {e}")))?;
    let arr: [u8; 32] = data
        .try_into()
        .map_err(|_| Error::Address(format!("{address}: payload is not 32 bytes")))?;
    Ok(Bytes32::new(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let ph = Bytes32::new([0x42; 32]);
        let address = encode_puzzle_hash(ph, Network::Mainnet.address_prefix()).unwrap();
        assert!(address.starts_with("xch1"));
        assert_eq!(decode_puzzle_hash(&address).unwrap(), ph);

        let testnet = encode_puzzle_hash(ph, "txch").unwrap();
        assert!(testnet.starts_with("txch1"));
        assert_ne!(address, testnet);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_puzzle_hash("xch1notanaddress").is_err());
        assert!("moon".parse::<Network>().is_err());
        assert_eq!("TXCH".parse::<Network>().unwrap(), Network::Testnet);
    }
}
