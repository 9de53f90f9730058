use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_ROOT: &str = ".chia/mainnet";
const CHIA_CONFIG_FILE: &str = "config/config.yaml";
const PRIVATE_CA_FILE: &str = "config/ssl/ca/private_ca.crt";

pub const DEFAULT_HOSTNAME: &str = "localhost";
pub const DEFAULT_FULL_NODE_PORT: u16 = 8555;
pub const DEFAULT_WALLET_PORT: u16 = 9256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot locate the Chia root: set CHIA_ROOT or pass --root-path")]
    NoRoot,

    #[error("invalid {path}: {reason}")]
    ChiaConfig { path: PathBuf, reason: String },
}

/// Which service a client certificate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    FullNode,
    Wallet,
}

impl Service {
    fn dir(self) -> &'static str {
        match self {
            Service::FullNode => "full_node",
            Service::Wallet => "wallet",
        }
    }
}

// ============================================================================
// The parts of the Chia `config.yaml` the RPC clients need
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ChiaConfig {
    #[serde(default)]
    self_hostname: Option<String>,
    #[serde(default)]
    full_node: ServiceSection,
    #[serde(default)]
    wallet: ServiceSection,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSection {
    #[serde(default)]
    rpc_port: Option<u16>,
}

// ============================================================================
// RPC endpoints and client certificates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    pub root_path: PathBuf,
    pub hostname: String,
    pub full_node_port: u16,
    pub wallet_port: u16,
}

impl RpcConfig {
    /// Defaults, then `config/config.yaml` under `root_path` if present.
    pub fn load(root_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let root_path = match root_path {
            Some(path) => path,
            None => Self::default_root()?,
        };
        let mut config = Self {
            root_path,
            hostname: DEFAULT_HOSTNAME.to_string(),
            full_node_port: DEFAULT_FULL_NODE_PORT,
            wallet_port: DEFAULT_WALLET_PORT,
        };
        if let Some(chia) = Self::load_chia_config(&config.root_path)? {
            log::debug!("read {CHIA_CONFIG_FILE}");
            if let Some(hostname) = chia.self_hostname {
                config.hostname = hostname;
            }
            if let Some(port) = chia.full_node.rpc_port {
                config.full_node_port = port;
            }
            if let Some(port) = chia.wallet.rpc_port {
                config.wallet_port = port;
            }
        } else {
            log::warn!("no {CHIA_CONFIG_FILE} under {}, using defaults", config.root_path.display());
        }
        Ok(config)
    }

    /// `CHIA_ROOT`, falling back to `~/.chia/mainnet`.
    fn default_root() -> Result<PathBuf, ConfigError> {
        if let Some(root) = std::env::var_os("CHIA_ROOT") {
            return Ok(PathBuf::from(root));
        }
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(DEFAULT_ROOT))
            .ok_or(ConfigError::NoRoot)
    }

    fn load_chia_config(root: &Path) -> Result<Option<ChiaConfig>, ConfigError> {
        let path = root.join(CHIA_CONFIG_FILE);
        let Ok(contents) = fs::read_to_string(&path) else {
            return Ok(None);
        };
        serde_yaml::from_str(&contents)
            .map(Some)
            .map_err(|e| ConfigError::ChiaConfig {
                path,
                reason: e.to_string(),
            })
    }

    /// Flags given on the command line win over everything else.
    pub fn with_ports(mut self, full_node_port: Option<u16>, wallet_port: Option<u16>) -> Self {
        if let Some(port) = full_node_port {
            self.full_node_port = port;
        }
        if let Some(port) = wallet_port {
            self.wallet_port = port;
        }
        self
    }

    pub fn url(&self, service: Service) -> String {
        let port = match service {
            Service::FullNode => self.full_node_port,
            Service::Wallet => self.wallet_port,
        };
        format!("https://{}:{}", self.hostname, port)
    }

    /// CA that signs every service certificate of this Chia install.
    pub fn private_ca(&self) -> PathBuf {
        self.root_path.join(PRIVATE_CA_FILE)
    }

    /// `(certificate, key)` the service accepts from its RPC clients.
    pub fn client_cert(&self, service: Service) -> (PathBuf, PathBuf) {
        let dir = self.root_path.join("config/ssl").join(service.dir());
        let name = format!("private_{}", service.dir());
        (
            dir.join(format!("{name}.crt")),
            dir.join(format!("{name}.key")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_chia_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = RpcConfig::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.url(Service::FullNode), "https://localhost:8555");
        assert_eq!(config.url(Service::Wallet), "https://localhost:9256");

        let (crt, key) = config.client_cert(Service::Wallet);
        assert!(crt.ends_with("config/ssl/wallet/private_wallet.crt"));
        assert!(key.ends_with("config/ssl/wallet/private_wallet.key"));
        assert!(config.private_ca().ends_with("config/ssl/ca/private_ca.crt"));
    }

    #[test]
    fn chia_config_then_flags() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(
            dir.path().join(CHIA_CONFIG_FILE),
            "\
min_mainnet_k_size: 32
self_hostname: 10.0.0.2
full_node:
  port: 8444
  rpc_port: 18555
wallet:
  rpc_port: 19256
  initial_num_public_keys: 425
",
        )
        .unwrap();

        let config = RpcConfig::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.hostname, "10.0.0.2");
        assert_eq!(config.full_node_port, 18555);
        assert_eq!(config.wallet_port, 19256);

        let config = config.with_ports(Some(1), None);
        assert_eq!(config.url(Service::FullNode), "https://10.0.0.2:1");
        assert_eq!(config.wallet_port, 19256);
    }

    #[test]
    fn missing_sections_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join(CHIA_CONFIG_FILE), "wallet:\n  rpc_port: 9999\n").unwrap();

        let config = RpcConfig::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(config.hostname, DEFAULT_HOSTNAME);
        assert_eq!(config.full_node_port, DEFAULT_FULL_NODE_PORT);
        assert_eq!(config.wallet_port, 9999);
    }

    #[test]
    fn malformed_chia_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join(CHIA_CONFIG_FILE), "full_node:\n  rpc_port: lots\n").unwrap();
        assert!(matches!(
            RpcConfig::load(Some(dir.path().to_path_buf())),
            Err(ConfigError::ChiaConfig { .. })
        ));
    }
}
