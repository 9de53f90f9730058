use std::fs;
use std::path::Path;
use std::time::Duration;

use cat_admin_sdk::chain::{CoinAnnouncement, CoinRecord, FullNodeService, TransactionRequest, WalletService};
use cat_admin_sdk::spend::{
    bundle_from_json, bundle_to_json, bytes32_hex, coin_from_json, coin_spend_from_json, coin_to_json,
};
use cat_admin_sdk::{Bytes32, Coin, CoinSpend, SpendBundle, decode_puzzle_hash};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::{RpcConfig, Service};

#[derive(Debug, Error)]
pub enum ChainAdapterError {
    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("{endpoint} failed: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl ChainAdapterError {
    fn is_not_found(&self) -> bool {
        matches!(self, ChainAdapterError::Rpc { message, .. } if message.to_lowercase().contains("not found"))
    }
}

/// JSON-RPC client for a Chia service, authenticated with the service's
/// private client certificate. The service is trusted when its certificate
/// chains to the install's private CA.
#[derive(Clone)]
pub struct ChiaRpcClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChiaRpcClient {
    pub fn new(
        base_url: impl Into<String>,
        ca_path: &Path,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, ChainAdapterError> {
        let ca = load_private_ca(ca_path)?;
        let mut pem = fs::read(cert_path)
            .map_err(|e| ChainAdapterError::Certificate(format!("{}: {e}", cert_path.display())))?;
        pem.push(b'\n');
        pem.extend(
            fs::read(key_path)
                .map_err(|e| ChainAdapterError::Certificate(format!("{}: {e}", key_path.display())))?,
        );
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ChainAdapterError::Certificate(e.to_string()))?;

        // Service certificates are issued for a fixed name, not the host.
        let http = reqwest::Client::builder()
            .identity(identity)
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .danger_accept_invalid_hostnames(true)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChainAdapterError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn for_service(config: &RpcConfig, service: Service) -> Result<Self, ChainAdapterError> {
        let (cert, key) = config.client_cert(service);
        Self::new(config.url(service), &config.private_ca(), &cert, &key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `endpoint`, failing when the service reports
    /// `success: false`.
    async fn rpc_call(&self, endpoint: &str, body: Value) -> Result<Value, ChainAdapterError> {
        log::debug!("rpc {endpoint}");
        let response = self
            .http
            .post(format!("{}/{endpoint}", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainAdapterError::Http(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ChainAdapterError::Http(format!(
                "{endpoint} returned HTTP {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ChainAdapterError::Parse(format!("invalid JSON response: {e}")))?;
        check_success(endpoint, json)
    }
}

fn load_private_ca(path: &Path) -> Result<reqwest::Certificate, ChainAdapterError> {
    let pem = fs::read(path)
        .map_err(|e| ChainAdapterError::Certificate(format!("{}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| ChainAdapterError::Certificate(format!("{}: {e}", path.display())))
}

fn check_success(endpoint: &str, json: Value) -> Result<Value, ChainAdapterError> {
    if json["success"].as_bool() == Some(true) {
        return Ok(json);
    }
    let message = json["error"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| json.to_string());
    Err(ChainAdapterError::Rpc {
        endpoint: endpoint.to_string(),
        message,
    })
}

// ============================================================================
// Response parsing
// ============================================================================

fn parse_err(e: cat_admin_sdk::Error) -> ChainAdapterError {
    ChainAdapterError::Parse(e.to_string())
}

fn u32_field(value: &Value, key: &str) -> Result<u32, ChainAdapterError> {
    value[key]
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| ChainAdapterError::Parse(format!("missing or invalid `{key}`")))
}

fn coin_record_from_json(value: &Value) -> Result<CoinRecord, ChainAdapterError> {
    Ok(CoinRecord {
        coin: coin_from_json(&value["coin"]).map_err(parse_err)?,
        confirmed_block_index: u32_field(value, "confirmed_block_index")?,
        spent_block_index: u32_field(value, "spent_block_index")?,
    })
}

fn coins_from_json(value: &Value) -> Result<Vec<Coin>, ChainAdapterError> {
    value
        .as_array()
        .ok_or_else(|| ChainAdapterError::Parse("expected an array of coins".into()))?
        .iter()
        .map(|c| coin_from_json(c).map_err(parse_err))
        .collect()
}

fn transaction_request_json(request: &TransactionRequest) -> Result<Value, ChainAdapterError> {
    let additions: Vec<Value> = request
        .additions
        .iter()
        .map(|t| json!({ "puzzle_hash": bytes32_hex(&t.puzzle_hash), "amount": t.amount }))
        .collect();
    let announcements: Vec<Value> = request
        .coin_announcements
        .iter()
        .map(|CoinAnnouncement { coin_id, message }| {
            json!({
                "coin_id": bytes32_hex(coin_id),
                "message": hex::encode(message),
                "morph_bytes": "",
            })
        })
        .collect();

    let mut body = json!({
        "wallet_id": request.wallet_id,
        "additions": additions,
        "fee": request.fee,
    });
    if !request.coins.is_empty() {
        body["coins"] = Value::Array(
            request
                .coins
                .iter()
                .map(coin_to_json)
                .collect::<cat_admin_sdk::Result<_>>()
                .map_err(parse_err)?,
        );
    }
    if !announcements.is_empty() {
        body["coin_announcements"] = Value::Array(announcements);
    }
    Ok(body)
}

/// Newer wallets answer with `signed_txs`, older ones with `signed_tx`.
fn signed_bundle_from_json(response: &Value) -> Result<SpendBundle, ChainAdapterError> {
    let tx = if response["signed_tx"].is_object() {
        &response["signed_tx"]
    } else {
        &response["signed_txs"][0]
    };
    if !tx["spend_bundle"].is_object() {
        return Err(ChainAdapterError::Parse("response carries no spend bundle".into()));
    }
    bundle_from_json(&tx["spend_bundle"]).map_err(parse_err)
}

// ============================================================================
// Full node
// ============================================================================

/// Full node RPC (`get_coin_record_by_name`, `get_puzzle_and_solution`,
/// `push_tx`).
pub struct FullNodeRpc(pub ChiaRpcClient);

impl FullNodeRpc {
    async fn call(&self, endpoint: &str, body: Value) -> cat_admin_sdk::Result<Value> {
        self.0
            .rpc_call(endpoint, body)
            .await
            .map_err(|e| cat_admin_sdk::Error::FullNode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl FullNodeService for FullNodeRpc {
    async fn coin_record(&self, coin_id: Bytes32) -> cat_admin_sdk::Result<Option<CoinRecord>> {
        let body = json!({ "name": bytes32_hex(&coin_id) });
        match self.0.rpc_call("get_coin_record_by_name", body).await {
            Ok(response) => coin_record_from_json(&response["coin_record"])
                .map(Some)
                .map_err(|e| cat_admin_sdk::Error::FullNode(e.to_string())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(cat_admin_sdk::Error::FullNode(e.to_string())),
        }
    }

    async fn puzzle_and_solution(&self, coin_id: Bytes32, height: u32) -> cat_admin_sdk::Result<CoinSpend> {
        let body = json!({ "coin_id": bytes32_hex(&coin_id), "height": height });
        let response = self.call("get_puzzle_and_solution", body).await?;
        coin_spend_from_json(&response["coin_solution"])
    }

    async fn push_tx(&self, bundle: &SpendBundle) -> cat_admin_sdk::Result<()> {
        let response = self
            .call("push_tx", json!({ "spend_bundle": bundle_to_json(bundle)? }))
            .await?;
        log::info!("push_tx status: {}", response["status"].as_str().unwrap_or("unknown"));
        Ok(())
    }
}

// ============================================================================
// Wallet
// ============================================================================

/// Wallet RPC used to fund, sign and pay fees.
pub struct WalletRpc(pub ChiaRpcClient);

impl WalletRpc {
    async fn call(&self, endpoint: &str, body: Value) -> cat_admin_sdk::Result<Value> {
        self.0
            .rpc_call(endpoint, body)
            .await
            .map_err(|e| cat_admin_sdk::Error::Wallet(e.to_string()))
    }

    /// Select the key the wallet service signs with.
    pub async fn log_in(&self, fingerprint: u32) -> cat_admin_sdk::Result<()> {
        self.call("log_in", json!({ "fingerprint": fingerprint })).await?;
        log::info!("wallet logged in as {fingerprint}");
        Ok(())
    }

    /// Submit through the wallet service, which relays to its node.
    pub async fn push_tx(&self, bundle: &SpendBundle) -> cat_admin_sdk::Result<()> {
        self.call("push_tx", json!({ "spend_bundle": bundle_to_json(bundle)? }))
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WalletService for WalletRpc {
    async fn select_coins(&self, amount: u64, wallet_id: u32) -> cat_admin_sdk::Result<Vec<Coin>> {
        let response = self
            .call("select_coins", json!({ "amount": amount, "wallet_id": wallet_id }))
            .await?;
        coins_from_json(&response["coins"]).map_err(|e| cat_admin_sdk::Error::Wallet(e.to_string()))
    }

    async fn next_change_puzzle_hash(&self, wallet_id: u32) -> cat_admin_sdk::Result<Bytes32> {
        let response = self
            .call("get_next_address", json!({ "wallet_id": wallet_id, "new_address": false }))
            .await?;
        let address = response["address"]
            .as_str()
            .ok_or_else(|| cat_admin_sdk::Error::Wallet("get_next_address returned no address".into()))?;
        decode_puzzle_hash(address)
    }

    async fn create_signed_transaction(&self, request: &TransactionRequest) -> cat_admin_sdk::Result<SpendBundle> {
        let body = transaction_request_json(request)
            .map_err(|e| cat_admin_sdk::Error::Wallet(e.to_string()))?;
        let response = self.call("create_signed_transaction", body).await?;
        signed_bundle_from_json(&response).map_err(|e| cat_admin_sdk::Error::Wallet(e.to_string()))
    }
}
