//! Client for the external wallet-custody service. Private keys never touch
//! this process; the service provisions wallets and signs on our behalf.

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::Signature;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait WalletCustody: Send + Sync {
    /// Create the custody wallet for an agent, or return the existing one.
    async fn provision_wallet(&self, agent_id: &str) -> Result<String, String>;

    /// Sign a typed transaction with the wallet holding `address`.
    async fn sign_transaction(
        &self,
        address: &str,
        tx: &TypedTransaction,
    ) -> Result<Signature, String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionRequest<'a> {
    agent_id: &'a str,
}

#[derive(Deserialize)]
struct ProvisionResponse {
    address: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct SignRequest {
    transaction: serde_json::Value,
}

#[derive(Deserialize)]
struct SignResponse {
    signature: Option<String>,
    error: Option<String>,
}

pub struct CustodyClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl CustodyClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, url: &str, body: &impl Serialize) -> reqwest::RequestBuilder {
        let mut req = self.http_client.post(url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }
}

#[async_trait]
impl WalletCustody for CustodyClient {
    async fn provision_wallet(&self, agent_id: &str) -> Result<String, String> {
        let url = format!("{}/wallets", self.base_url);
        let response = self
            .request(&url, &ProvisionRequest { agent_id })
            .send()
            .await
            .map_err(|e| format!("Custody request failed: {}", e))?;

        let status = response.status();
        let body: ProvisionResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid custody response: {}", e))?;

        if !status.is_success() {
            return Err(format!(
                "Custody service error ({}): {}",
                status,
                body.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }

        body.address
            .ok_or_else(|| "Custody response missing wallet address".to_string())
    }

    async fn sign_transaction(
        &self,
        address: &str,
        tx: &TypedTransaction,
    ) -> Result<Signature, String> {
        let url = format!("{}/wallets/{}/sign", self.base_url, address);
        let transaction = serde_json::to_value(tx)
            .map_err(|e| format!("Failed to serialize transaction: {}", e))?;

        let response = self
            .request(&url, &SignRequest { transaction })
            .send()
            .await
            .map_err(|e| format!("Custody request failed: {}", e))?;

        let status = response.status();
        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid custody response: {}", e))?;

        if !status.is_success() {
            return Err(format!(
                "Custody service error ({}): {}",
                status,
                body.error.unwrap_or_else(|| "unknown".to_string())
            ));
        }

        let sig_hex = body
            .signature
            .ok_or_else(|| "Custody response missing signature".to_string())?;

        sig_hex
            .trim_start_matches("0x")
            .parse::<Signature>()
            .map_err(|e| format!("Invalid signature from custody service: {}", e))
    }
}

/// Stand-in used when no custody service is configured. Every call fails,
/// which keeps read-only endpoints usable in local setups.
pub struct NoCustody;

#[async_trait]
impl WalletCustody for NoCustody {
    async fn provision_wallet(&self, _agent_id: &str) -> Result<String, String> {
        Err("Custody service not configured".to_string())
    }

    async fn sign_transaction(
        &self,
        _address: &str,
        _tx: &TypedTransaction,
    ) -> Result<Signature, String> {
        Err("Custody service not configured".to_string())
    }
}
