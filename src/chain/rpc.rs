//! JSON-RPC EVM client over plain HTTP.

use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    result: Option<Value>,
    error: Option<JsonRpcError>,
    #[allow(dead_code)]
    id: u64,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Transaction receipt from eth_getTransactionReceipt
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    pub block_hash: Option<H256>,
    pub block_number: Option<U64>,
    pub status: Option<U64>,
    pub gas_used: Option<U256>,
    pub effective_gas_price: Option<U256>,
}

pub struct EvmRpc {
    http: reqwest::Client,
    url: String,
    chain_id: u64,
}

impl EvmRpc {
    pub fn new(url: &str, chain_id: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
            chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, String> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id: 1,
        };

        log::debug!("[EvmRpc] {} to {} with params: {:?}", method, self.url, request.params);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("RPC request failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        if !status.is_success() {
            return Err(format!(
                "RPC error ({}) from {}: {}",
                status,
                self.url,
                if body.is_empty() { "empty response" } else { &body }
            ));
        }

        let rpc_response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| format!("Failed to parse RPC response: {} - body: {}", e, body))?;

        if let Some(error) = rpc_response.error {
            return Err(format!("RPC error {}: {}", error.code, error.message));
        }

        rpc_response
            .result
            .ok_or_else(|| "RPC returned null result".to_string())
    }

    /// Make an eth_call (read-only contract call)
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Bytes, String> {
        let params = json!([
            {
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data))
            },
            "latest"
        ]);

        let result = self.rpc_call("eth_call", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| "Invalid eth_call response".to_string())?;

        let bytes = hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| format!("Failed to decode eth_call result: {}", e))?;

        Ok(Bytes::from(bytes))
    }

    /// Estimate gas for a transaction
    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
        value: U256,
    ) -> Result<U256, String> {
        let params = json!([
            {
                "from": format!("{:?}", from),
                "to": format!("{:?}", to),
                "data": format!("0x{}", hex::encode(data)),
                "value": format!("0x{:x}", value)
            }
        ]);

        let result = self.rpc_call("eth_estimateGas", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| "Invalid estimateGas response".to_string())?;

        U256::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .map_err(|e| format!("Failed to parse gas estimate: {}", e))
    }

    /// Estimate EIP-1559 fees (max_fee_per_gas, max_priority_fee_per_gas)
    pub async fn estimate_eip1559_fees(&self) -> Result<(U256, U256), String> {
        let gas_price_result = self.rpc_call("eth_gasPrice", json!([])).await?;
        let gas_price_hex = gas_price_result
            .as_str()
            .ok_or_else(|| "Invalid gasPrice response".to_string())?;
        let gas_price = U256::from_str_radix(gas_price_hex.trim_start_matches("0x"), 16)
            .map_err(|e| format!("Failed to parse gas price: {}", e))?;

        let priority_result = self.rpc_call("eth_maxPriorityFeePerGas", json!([])).await?;
        let priority_hex = priority_result
            .as_str()
            .ok_or_else(|| "Invalid maxPriorityFeePerGas response".to_string())?;
        let priority_fee = U256::from_str_radix(priority_hex.trim_start_matches("0x"), 16)
            .map_err(|e| format!("Failed to parse priority fee: {}", e))?;

        // On L2s eth_gasPrice is usually the appropriate maxFeePerGas, and some
        // providers return unexpectedly high priority fees. Cap priority_fee at
        // gas_price to avoid insane estimates.
        let capped_priority_fee = std::cmp::min(priority_fee, gas_price);

        // Add a small buffer (10%) to gas_price for max_fee
        let max_fee = gas_price + gas_price / 10;

        log::debug!(
            "[EvmRpc] Gas estimate: gas_price={}, priority_fee={} (capped from {}), max_fee={}",
            gas_price, capped_priority_fee, priority_fee, max_fee
        );

        Ok((max_fee, capped_priority_fee))
    }

    /// Send a raw signed transaction
    pub async fn send_raw_transaction(&self, signed_tx: &[u8]) -> Result<H256, String> {
        let params = json!([format!("0x{}", hex::encode(signed_tx))]);

        let result = self.rpc_call("eth_sendRawTransaction", params).await?;

        let hash_hex = result
            .as_str()
            .ok_or_else(|| "Invalid sendRawTransaction response".to_string())?;

        hash_hex
            .parse()
            .map_err(|e| format!("Failed to parse tx hash: {}", e))
    }

    /// Get transaction receipt
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, String> {
        let params = json!([format!("{:?}", tx_hash)]);

        let result = self.rpc_call("eth_getTransactionReceipt", params).await?;

        if result.is_null() {
            return Ok(None);
        }

        let receipt: TransactionReceipt = serde_json::from_value(result)
            .map_err(|e| format!("Failed to parse receipt: {}", e))?;

        Ok(Some(receipt))
    }

    /// Get transaction count (nonce) for an address, including pending txs
    pub async fn get_transaction_count(&self, address: Address) -> Result<U256, String> {
        let params = json!([format!("{:?}", address), "pending"]);

        let result = self.rpc_call("eth_getTransactionCount", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| "Invalid getTransactionCount response".to_string())?;

        U256::from_str_radix(hex_str.trim_start_matches("0x"), 16)
            .map_err(|e| format!("Failed to parse nonce: {}", e))
    }

    /// Poll for a transaction receipt. Ok(None) means the deadline passed
    /// without the transaction being mined; transient RPC errors are retried.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        timeout: Duration,
    ) -> Result<Option<TransactionReceipt>, String> {
        let start = std::time::Instant::now();
        let poll_interval = Duration::from_secs(2);

        loop {
            if start.elapsed() > timeout {
                return Ok(None);
            }

            match self.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(Some(receipt)),
                Ok(None) => {
                    log::debug!("[EvmRpc] Waiting for receipt of {:?}...", tx_hash);
                    tokio::time::sleep(poll_interval).await;
                }
                Err(e) => {
                    log::warn!("[EvmRpc] Error fetching receipt: {}, retrying...", e);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}
