//! The engine's only door to the chain. `ChainGateway` is a trait so the
//! settlement engine can be exercised against a recording mock in tests.

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Eip1559TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::abi;
use crate::chain::rpc::EvmRpc;
use crate::wallet::WalletCustody;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// No receipt before the deadline; the transaction may still land later
    Timeout(String),
    /// Mined with status 0
    Reverted(String),
    /// Transport, signing or encoding failure
    Rpc(String),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ChainError::Reverted(msg) => write!(f, "Reverted: {}", msg),
            ChainError::Rpc(msg) => write!(f, "{}", msg),
        }
    }
}

/// What a confirmed transaction cost.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub hash: H256,
    pub gas_used: U256,
    pub effective_gas_price: U256,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;
    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;

    /// Build, custody-sign and broadcast a transaction from an agent wallet.
    async fn submit_from_wallet(
        &self,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<H256, ChainError>;

    /// Build, sign with the platform relayer key and broadcast.
    async fn submit_as_relayer(&self, to: Address, calldata: Vec<u8>) -> Result<H256, ChainError>;

    async fn wait_for_receipt(&self, hash: H256) -> Result<TxOutcome, ChainError>;
}

pub struct HttpChainGateway {
    rpc: EvmRpc,
    custody: Arc<dyn WalletCustody>,
    relayer: Option<LocalWallet>,
    receipt_timeout: Duration,
}

impl HttpChainGateway {
    pub fn new(
        rpc: EvmRpc,
        custody: Arc<dyn WalletCustody>,
        relayer_private_key: Option<&str>,
        receipt_timeout: Duration,
    ) -> Result<Self, String> {
        let chain_id = rpc.chain_id();
        let relayer = match relayer_private_key {
            Some(key) => {
                let wallet: LocalWallet = key
                    .trim_start_matches("0x")
                    .parse()
                    .map_err(|e| format!("Invalid relayer private key: {}", e))?;
                Some(wallet.with_chain_id(chain_id))
            }
            None => None,
        };
        Ok(Self {
            rpc,
            custody,
            relayer,
            receipt_timeout,
        })
    }

    async fn read_word(&self, to: Address, calldata: Vec<u8>) -> Result<U256, ChainError> {
        let bytes = self
            .rpc
            .eth_call(to, &calldata)
            .await
            .map_err(ChainError::Rpc)?;
        abi::decode_uint(&bytes).map_err(ChainError::Rpc)
    }

    /// Pending nonce, estimated gas with a 20% buffer, fee estimation.
    async fn build_tx(
        &self,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<TypedTransaction, String> {
        let nonce = self.rpc.get_transaction_count(from).await?;

        let gas = self
            .rpc
            .estimate_gas(from, to, &calldata, U256::zero())
            .await?;
        let gas = gas * U256::from(120) / U256::from(100); // 20% buffer

        let (max_fee, priority_fee) = self.rpc.estimate_eip1559_fees().await?;

        log::info!(
            "[ChainGateway] Built tx: from={:?}, to={:?}, data_len={} bytes, gas={}, nonce={}",
            from,
            to,
            calldata.len(),
            gas,
            nonce
        );

        let tx = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .value(U256::zero())
            .data(calldata)
            .nonce(nonce)
            .gas(gas)
            .max_fee_per_gas(max_fee)
            .max_priority_fee_per_gas(priority_fee)
            .chain_id(self.rpc.chain_id());

        Ok(tx.into())
    }
}

#[async_trait]
impl ChainGateway for HttpChainGateway {
    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        let bytes = self
            .rpc
            .eth_call(token, &abi::erc20_decimals())
            .await
            .map_err(ChainError::Rpc)?;
        abi::decode_u8(&bytes).map_err(ChainError::Rpc)
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.read_word(token, abi::erc20_balance_of(owner)).await
    }

    async fn erc20_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        self.read_word(token, abi::erc20_allowance(owner, spender))
            .await
    }

    async fn submit_from_wallet(
        &self,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<H256, ChainError> {
        let typed_tx = self
            .build_tx(from, to, calldata)
            .await
            .map_err(ChainError::Rpc)?;

        let signature = self
            .custody
            .sign_transaction(&format!("{:?}", from), &typed_tx)
            .await
            .map_err(ChainError::Rpc)?;

        let raw = typed_tx.rlp_signed(&signature);
        self.rpc
            .send_raw_transaction(&raw)
            .await
            .map_err(ChainError::Rpc)
    }

    async fn submit_as_relayer(&self, to: Address, calldata: Vec<u8>) -> Result<H256, ChainError> {
        let wallet = self
            .relayer
            .as_ref()
            .ok_or_else(|| ChainError::Rpc("Relayer key not configured".to_string()))?;

        let typed_tx = self
            .build_tx(wallet.address(), to, calldata)
            .await
            .map_err(ChainError::Rpc)?;

        let signature = wallet
            .sign_transaction(&typed_tx)
            .await
            .map_err(|e| ChainError::Rpc(format!("Failed to sign transaction: {}", e)))?;

        let raw = typed_tx.rlp_signed(&signature);
        self.rpc
            .send_raw_transaction(&raw)
            .await
            .map_err(ChainError::Rpc)
    }

    async fn wait_for_receipt(&self, hash: H256) -> Result<TxOutcome, ChainError> {
        let receipt = self
            .rpc
            .wait_for_receipt(hash, self.receipt_timeout)
            .await
            .map_err(ChainError::Rpc)?
            .ok_or_else(|| {
                ChainError::Timeout(format!("No receipt for {:?} within the deadline", hash))
            })?;

        if receipt.status.map(|s| s.as_u64()) == Some(0) {
            return Err(ChainError::Reverted(format!("Transaction {:?} reverted", hash)));
        }

        Ok(TxOutcome {
            hash,
            gas_used: receipt.gas_used.unwrap_or_default(),
            effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
        })
    }
}
