//! The orchestration core. Every operation is one or more ordered chain
//! calls, each awaited to its receipt before the next is submitted, with
//! bookkeeping written only after on-chain confirmation.

use chrono::Utc;
use ethers::types::{Address, H256, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::chain::abi::{self, ForwardCall};
use crate::chain::{ChainError, ChainGateway, TxOutcome};
use crate::db::Database;
use crate::error::ApiError;
use crate::models::{Payment, PaymentStatus};
use crate::settlement::intent::{IntentResolver, PaymentRequest};
use crate::settlement::paymaster::{Paymaster, SponsorshipSummary};
use crate::wallet::WalletDirectory;

/// Convert a human amount into integer base units, truncating excess
/// fractional digits. Truncation, never rounding: the chain must not be
/// asked for more value than the caller specified.
pub fn to_base_units(amount: f64, decimals: u8) -> Result<U256, String> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(format!("Invalid amount: {}", amount));
    }

    let text = format!("{}", amount);
    if text.contains(['e', 'E']) {
        return Err(format!("Amount not representable in decimal notation: {}", amount));
    }

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text.as_str(), ""),
    };

    let frac_truncated: &str = &frac_part[..frac_part.len().min(decimals as usize)];
    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_truncated);
    for _ in frac_truncated.len()..decimals as usize {
        digits.push('0');
    }

    U256::from_dec_str(&digits).map_err(|e| format!("Failed to parse amount: {}", e))
}

/// Base units back to a human amount, for display only.
pub fn from_base_units(value: U256, decimals: u8) -> f64 {
    let raw = value.to_string().parse::<f64>().unwrap_or(0.0);
    raw / 10f64.powi(decimals as i32)
}

fn settlement_error(operation: &str, err: ChainError) -> ApiError {
    match err {
        ChainError::Timeout(msg) => {
            ApiError::SettlementTimeout(format!("{}: {}", operation, msg))
        }
        ChainError::Reverted(msg) | ChainError::Rpc(msg) => {
            // Contract revert reasons like "Insufficient allowance" are
            // surfaced verbatim
            if msg.to_lowercase().contains("insufficient") {
                ApiError::InsufficientFunds(msg)
            } else {
                ApiError::SettlementFailed(format!("{}: {}", operation, msg))
            }
        }
    }
}

fn hash_hex(hash: H256) -> String {
    format!("{:?}", hash)
}

/// Normalized result of a confirmed transaction.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub hash: String,
    pub gas_used: U256,
    pub effective_gas_price: U256,
}

impl From<TxOutcome> for SettlementOutcome {
    fn from(outcome: TxOutcome) -> Self {
        Self {
            hash: hash_hex(outcome.hash),
            gas_used: outcome.gas_used,
            effective_gas_price: outcome.effective_gas_price,
        }
    }
}

/// A recorded payment together with its sponsorship accounting.
#[derive(Debug, Clone)]
pub struct SettledPayment {
    pub payment: Payment,
    pub sponsorship: SponsorshipSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub amount: f64,
    pub currency: String,
    pub wallet_address: String,
}

pub struct SettlementEngine {
    db: Arc<Database>,
    chain: Arc<dyn ChainGateway>,
    directory: Arc<WalletDirectory>,
    resolver: IntentResolver,
    paymaster: Paymaster,
    usdc: Address,
    escrow: Address,
    forwarder: Address,
    explorer_base_url: String,
    allowance_timeout: Duration,
}

impl SettlementEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        chain: Arc<dyn ChainGateway>,
        directory: Arc<WalletDirectory>,
        usdc: Address,
        escrow: Address,
        forwarder: Address,
        explorer_base_url: String,
        allowance_timeout: Duration,
    ) -> Self {
        let resolver = IntentResolver::new(db.clone(), directory.clone());
        let paymaster = Paymaster::new(db.clone());
        Self {
            db,
            chain,
            directory,
            resolver,
            paymaster,
            usdc,
            escrow,
            forwarder,
            explorer_base_url,
            allowance_timeout,
        }
    }

    pub fn paymaster(&self) -> &Paymaster {
        &self.paymaster
    }

    /// Pure formatting, no I/O.
    pub fn explorer_url(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_base_url, hash)
    }

    async fn token_decimals(&self) -> Result<u8, ApiError> {
        // Read per call, never cached, so every call sees current state
        self.chain
            .token_decimals(self.usdc)
            .await
            .map_err(|e| settlement_error("read decimals", e))
    }

    async fn submit_and_wait(
        &self,
        operation: &str,
        from: Address,
        to: Address,
        calldata: Vec<u8>,
    ) -> Result<TxOutcome, ApiError> {
        let hash = self
            .chain
            .submit_from_wallet(from, to, calldata)
            .await
            .map_err(|e| settlement_error(operation, e))?;
        self.chain
            .wait_for_receipt(hash)
            .await
            .map_err(|e| settlement_error(operation, e))
    }

    /// Entry point for `POST /payments`: resolve the intent, settle it
    /// (direct transfer or gateway purchase), then record the bookkeeping.
    pub async fn execute_payment(
        &self,
        agent_id: &str,
        request: PaymentRequest,
    ) -> Result<SettledPayment, ApiError> {
        // Product ids must be decimal unsigned integers. Rejected before any
        // chain call is made.
        let product_id = match request.product_id.as_deref() {
            Some(raw) => Some(U256::from_dec_str(raw.trim()).map_err(|_| {
                ApiError::InvalidProductId(format!("Product id is not a valid integer: {}", raw))
            })?),
            None => None,
        };

        let intent = self.resolver.resolve(agent_id, &request).await?;
        let wallet = self.directory.wallet_for(agent_id).await?;
        let decimals = self.token_decimals().await?;
        let base_amount =
            to_base_units(intent.amount, decimals).map_err(ApiError::Validation)?;

        let memo = request.memo.clone().or_else(|| intent.description.clone());

        let outcome = match product_id {
            Some(pid) => {
                self.purchase(wallet, intent.recipient, pid, base_amount, memo.as_deref().unwrap_or(""))
                    .await?
            }
            None => {
                log::info!(
                    "[Settlement] Transferring {} {} from {:?} to {:?}",
                    intent.amount,
                    intent.currency,
                    wallet,
                    intent.recipient
                );
                self.submit_and_wait(
                    "transfer",
                    wallet,
                    self.usdc,
                    abi::erc20_transfer(intent.recipient, base_amount),
                )
                .await?
            }
        };

        let settled = self
            .record_payment(
                agent_id,
                intent.amount,
                &intent.currency,
                &format!("{:?}", intent.recipient),
                memo,
                request.product_id.clone(),
                outcome,
            )
            .await?;

        if let Some(ref invoice_id) = intent.invoice_id {
            let claimed = self.db.mark_invoice_paid(
                invoice_id,
                settled.payment.hash.as_deref().unwrap_or_default(),
            )?;
            if !claimed {
                // A concurrent settlement won the pending -> paid transition
                return Err(ApiError::AlreadySettled(format!(
                    "Invoice {} was settled concurrently",
                    invoice_id
                )));
            }
        }

        Ok(settled)
    }

    /// approve the gateway, wait for that receipt, then buy. The buy call is
    /// never submitted when the approval fails.
    async fn purchase(
        &self,
        wallet: Address,
        gateway: Address,
        product_id: U256,
        base_amount: U256,
        memo: &str,
    ) -> Result<TxOutcome, ApiError> {
        log::info!(
            "[Settlement] Approving gateway {:?} for {} base units...",
            gateway,
            base_amount
        );
        self.submit_and_wait(
            "approve",
            wallet,
            self.usdc,
            abi::erc20_approve(gateway, base_amount),
        )
        .await?;

        log::info!(
            "[Settlement] Buying product {} via gateway {:?}",
            product_id,
            gateway
        );
        self.submit_and_wait("buy", wallet, gateway, abi::gateway_buy(product_id, memo))
            .await
    }

    /// Fund the caller's escrow balance: approve, poll the allowance until
    /// the approval is observable, then deposit.
    pub async fn deposit(&self, agent_id: &str, amount: f64) -> Result<SettlementOutcome, ApiError> {
        let wallet = self.directory.wallet_for(agent_id).await?;
        let decimals = self.token_decimals().await?;
        let base_amount = to_base_units(amount, decimals).map_err(ApiError::Validation)?;

        self.submit_and_wait(
            "approve",
            wallet,
            self.usdc,
            abi::erc20_approve(self.escrow, base_amount),
        )
        .await?;

        self.wait_for_allowance(wallet, base_amount).await?;

        let outcome = self
            .submit_and_wait("deposit", wallet, self.escrow, abi::escrow_deposit(base_amount))
            .await?;
        Ok(outcome.into())
    }

    /// Bounded poll until the on-chain allowance reflects the approval.
    async fn wait_for_allowance(&self, owner: Address, expected: U256) -> Result<(), ApiError> {
        let start = Instant::now();
        let poll_interval = Duration::from_secs(2);

        loop {
            let allowance = self
                .chain
                .erc20_allowance(self.usdc, owner, self.escrow)
                .await
                .map_err(|e| settlement_error("read allowance", e))?;
            if allowance >= expected {
                return Ok(());
            }

            if start.elapsed() > self.allowance_timeout {
                return Err(ApiError::SettlementTimeout(format!(
                    "Approval for {:?} not observable after {:?}",
                    owner, self.allowance_timeout
                )));
            }

            log::debug!("[Settlement] Allowance {} < {}, polling...", allowance, expected);
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Grant a spending budget. Always submitted from the caller's own
    /// wallet, since the caller is the grantor. Policy only, no gas
    /// accounting.
    pub async fn pre_authorize(
        &self,
        agent_id: &str,
        spender: &str,
        max_amount: f64,
    ) -> Result<String, ApiError> {
        let spender_address = self.directory.resolve_recipient(spender)?;
        let wallet = self.directory.wallet_for(agent_id).await?;
        let decimals = self.token_decimals().await?;
        let base_amount = to_base_units(max_amount, decimals).map_err(ApiError::Validation)?;

        log::info!(
            "[Settlement] {} pre-authorizing {:?} for {} base units",
            agent_id,
            spender_address,
            base_amount
        );

        let outcome = self
            .submit_and_wait(
                "preAuthorize",
                wallet,
                self.escrow,
                abi::escrow_pre_authorize(spender_address, base_amount),
            )
            .await?;

        Ok(hash_hex(outcome.hash))
    }

    /// Consume a previously granted budget. The caller is the spender, and
    /// the call must come from the spender's wallet so the contract's
    /// msg.sender check passes. Never submitted from the payer's wallet.
    pub async fn charge(
        &self,
        agent_id: &str,
        from: &str,
        amount: f64,
        memo: Option<String>,
    ) -> Result<SettledPayment, ApiError> {
        let payer = self.directory.resolve_recipient(from)?;
        let spender_wallet = self.directory.wallet_for(agent_id).await?;
        let decimals = self.token_decimals().await?;
        let base_amount = to_base_units(amount, decimals).map_err(ApiError::Validation)?;

        log::info!(
            "[Settlement] {} charging {:?} for {} base units",
            agent_id,
            payer,
            base_amount
        );

        let outcome = self
            .submit_and_wait(
                "charge",
                spender_wallet,
                self.escrow,
                abi::escrow_charge(payer, base_amount, memo.as_deref().unwrap_or("")),
            )
            .await?;

        self.record_payment(
            agent_id,
            amount,
            crate::settlement::intent::DEFAULT_CURRENCY,
            &format!("{:?}", spender_wallet),
            memo,
            None,
            outcome,
        )
        .await
    }

    /// Submit a validated forward request through the forwarder contract,
    /// signed with the platform's own relayer key.
    pub async fn relay(&self, call: ForwardCall) -> Result<SettlementOutcome, ApiError> {
        log::info!(
            "[Settlement] Relaying forward request from {:?} to {:?}",
            call.from,
            call.to
        );

        let hash = self
            .chain
            .submit_as_relayer(self.forwarder, abi::forwarder_execute(&call))
            .await
            .map_err(|e| settlement_error("relay", e))?;
        let outcome = self
            .chain
            .wait_for_receipt(hash)
            .await
            .map_err(|e| settlement_error("relay", e))?;

        Ok(outcome.into())
    }

    pub async fn wallet_balance(&self, agent_id: &str) -> Result<WalletBalance, ApiError> {
        let wallet = self.directory.wallet_for(agent_id).await?;
        let decimals = self.token_decimals().await?;
        let balance = self
            .chain
            .erc20_balance(self.usdc, wallet)
            .await
            .map_err(|e| settlement_error("read balance", e))?;

        Ok(WalletBalance {
            amount: from_base_units(balance, decimals),
            currency: crate::settlement::intent::DEFAULT_CURRENCY.to_string(),
            wallet_address: format!("{:?}", wallet),
        })
    }

    /// Persist a confirmed payment and its gas sponsorship. Only called
    /// after the receipt is observed, so a stored row always corresponds to
    /// a successful transaction.
    #[allow(clippy::too_many_arguments)]
    async fn record_payment(
        &self,
        agent_id: &str,
        amount: f64,
        currency: &str,
        recipient: &str,
        memo: Option<String>,
        product_id: Option<String>,
        outcome: TxOutcome,
    ) -> Result<SettledPayment, ApiError> {
        let outcome: SettlementOutcome = outcome.into();
        let payment = Payment {
            id: format!("pay_{}", Uuid::new_v4()),
            agent_id: agent_id.to_string(),
            amount,
            currency: currency.to_string(),
            recipient: recipient.to_string(),
            status: PaymentStatus::Confirmed,
            hash: Some(outcome.hash.clone()),
            memo,
            gas_used: Some(outcome.gas_used.to_string()),
            gas_price: Some(outcome.effective_gas_price.to_string()),
            product_id,
            created_at: Utc::now(),
        };

        // The gas columns start empty; the paymaster's conditional update is
        // what fills them, keeping recording at-most-once.
        let mut row = payment.clone();
        row.gas_used = None;
        row.gas_price = None;
        self.db.insert_payment(&row)?;

        self.paymaster
            .record(&payment.id, outcome.gas_used, outcome.effective_gas_price)?;
        let sponsorship =
            self.paymaster
                .summary_for(agent_id, outcome.gas_used, outcome.effective_gas_price)?;

        Ok(SettledPayment {
            payment,
            sponsorship,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Invoice, InvoiceStatus};
    use crate::wallet::WalletCustody;
    use async_trait::async_trait;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::Signature;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    enum ChainCall {
        Decimals,
        Submit {
            from: Address,
            to: Address,
            selector: [u8; 4],
        },
        RelaySubmit {
            to: Address,
            selector: [u8; 4],
        },
        Wait,
    }

    struct MockGateway {
        calls: Mutex<Vec<ChainCall>>,
        next_hash: AtomicU64,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                next_hash: AtomicU64::new(1),
            }
        }

        fn record(&self, call: ChainCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<ChainCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn selector_of(data: &[u8]) -> [u8; 4] {
        [data[0], data[1], data[2], data[3]]
    }

    #[async_trait]
    impl ChainGateway for MockGateway {
        async fn token_decimals(&self, _token: Address) -> Result<u8, ChainError> {
            self.record(ChainCall::Decimals);
            Ok(6)
        }

        async fn erc20_balance(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
            Ok(U256::from(1_500_000u64))
        }

        async fn erc20_allowance(
            &self,
            _token: Address,
            _owner: Address,
            _spender: Address,
        ) -> Result<U256, ChainError> {
            Ok(U256::MAX)
        }

        async fn submit_from_wallet(
            &self,
            from: Address,
            to: Address,
            calldata: Vec<u8>,
        ) -> Result<H256, ChainError> {
            self.record(ChainCall::Submit {
                from,
                to,
                selector: selector_of(&calldata),
            });
            Ok(H256::from_low_u64_be(
                self.next_hash.fetch_add(1, Ordering::SeqCst),
            ))
        }

        async fn submit_as_relayer(
            &self,
            to: Address,
            calldata: Vec<u8>,
        ) -> Result<H256, ChainError> {
            self.record(ChainCall::RelaySubmit {
                to,
                selector: selector_of(&calldata),
            });
            Ok(H256::from_low_u64_be(
                self.next_hash.fetch_add(1, Ordering::SeqCst),
            ))
        }

        async fn wait_for_receipt(&self, hash: H256) -> Result<TxOutcome, ChainError> {
            self.record(ChainCall::Wait);
            Ok(TxOutcome {
                hash,
                gas_used: U256::from(21000u64),
                effective_gas_price: U256::from(2u64),
            })
        }
    }

    /// Submits fine, but every receipt comes back as the configured error.
    struct RevertingGateway {
        receipt_error: ChainError,
    }

    #[async_trait]
    impl ChainGateway for RevertingGateway {
        async fn token_decimals(&self, _token: Address) -> Result<u8, ChainError> {
            Ok(6)
        }

        async fn erc20_balance(&self, _token: Address, _owner: Address) -> Result<U256, ChainError> {
            Ok(U256::zero())
        }

        async fn erc20_allowance(
            &self,
            _token: Address,
            _owner: Address,
            _spender: Address,
        ) -> Result<U256, ChainError> {
            Ok(U256::MAX)
        }

        async fn submit_from_wallet(
            &self,
            _from: Address,
            _to: Address,
            _calldata: Vec<u8>,
        ) -> Result<H256, ChainError> {
            Ok(H256::from_low_u64_be(1))
        }

        async fn submit_as_relayer(
            &self,
            _to: Address,
            _calldata: Vec<u8>,
        ) -> Result<H256, ChainError> {
            Ok(H256::from_low_u64_be(1))
        }

        async fn wait_for_receipt(&self, _hash: H256) -> Result<TxOutcome, ChainError> {
            Err(self.receipt_error.clone())
        }
    }

    struct SeqCustody {
        assigned: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl WalletCustody for SeqCustody {
        async fn provision_wallet(&self, agent_id: &str) -> Result<String, String> {
            let mut assigned = self.assigned.lock().unwrap();
            let next = assigned.len() as u64 + 0xa1;
            Ok(assigned
                .entry(agent_id.to_string())
                .or_insert_with(|| format!("0x{:040x}", next))
                .clone())
        }

        async fn sign_transaction(
            &self,
            _address: &str,
            _tx: &TypedTransaction,
        ) -> Result<Signature, String> {
            Err("not needed".to_string())
        }
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    struct Harness {
        engine: SettlementEngine,
        directory: Arc<WalletDirectory>,
        db: Arc<Database>,
        chain: Arc<MockGateway>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap());
        let custody = Arc::new(SeqCustody {
            assigned: Mutex::new(HashMap::new()),
        });
        let directory = Arc::new(WalletDirectory::new(db.clone(), custody));
        let chain = Arc::new(MockGateway::new());
        let engine = SettlementEngine::new(
            db.clone(),
            chain.clone(),
            directory.clone(),
            addr(0x100), // token
            addr(0x200), // escrow
            addr(0x300), // forwarder
            "https://sepolia.basescan.org".to_string(),
            Duration::from_secs(10),
        );
        Harness {
            engine,
            directory,
            db,
            chain,
            _dir: dir,
        }
    }

    fn failing_engine(
        receipt_error: ChainError,
    ) -> (SettlementEngine, Arc<WalletDirectory>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap());
        let custody = Arc::new(SeqCustody {
            assigned: Mutex::new(HashMap::new()),
        });
        let directory = Arc::new(WalletDirectory::new(db.clone(), custody));
        let engine = SettlementEngine::new(
            db,
            Arc::new(RevertingGateway { receipt_error }),
            directory.clone(),
            addr(0x100),
            addr(0x200),
            addr(0x300),
            "https://sepolia.basescan.org".to_string(),
            Duration::from_secs(10),
        );
        (engine, directory, dir)
    }

    const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];
    const APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

    #[tokio::test]
    async fn direct_payment_records_row_and_sponsorship() {
        let h = harness();
        let request = PaymentRequest {
            to: Some("0x1111111111111111111111111111111111111111".to_string()),
            amount: Some(0.5),
            ..Default::default()
        };

        let settled = h.engine.execute_payment("agent_a", request).await.unwrap();

        assert_eq!(settled.payment.status, PaymentStatus::Confirmed);
        assert_eq!(settled.sponsorship.gas_used, "21000");
        assert_eq!(settled.sponsorship.cost_sponsored, "42000");

        let stored = h.db.get_payment(&settled.payment.id).unwrap().unwrap();
        assert_eq!(stored.gas_used.as_deref(), Some("21000"));

        let wallet = h.directory.wallet_for("agent_a").await.unwrap();
        let transfer = h.chain.calls().into_iter().find(|c| {
            matches!(c, ChainCall::Submit { selector, .. } if *selector == TRANSFER)
        });
        assert_eq!(
            transfer,
            Some(ChainCall::Submit {
                from: wallet,
                to: addr(0x100),
                selector: TRANSFER
            })
        );
    }

    #[tokio::test]
    async fn purchase_approves_before_buying() {
        let h = harness();
        let gateway = "0x4444444444444444444444444444444444444444";
        let request = PaymentRequest {
            to: Some(gateway.to_string()),
            amount: Some(2.0),
            product_id: Some("7".to_string()),
            memo: Some("widget".to_string()),
            ..Default::default()
        };

        h.engine.execute_payment("agent_a", request).await.unwrap();

        let wallet = h.directory.wallet_for("agent_a").await.unwrap();
        let calls = h.chain.calls();
        let buy_selector = selector_of(&abi::gateway_buy(U256::from(7u64), "widget"));

        let approve_pos = calls
            .iter()
            .position(|c| matches!(c, ChainCall::Submit { selector, .. } if *selector == APPROVE))
            .expect("approve submitted");
        let buy_pos = calls
            .iter()
            .position(|c| matches!(c, ChainCall::Submit { selector, .. } if *selector == buy_selector))
            .expect("buy submitted");

        assert!(approve_pos < buy_pos);
        // approval is awaited before buy is submitted
        assert!(matches!(calls[approve_pos + 1], ChainCall::Wait));

        // both calls go out from the buyer's wallet, buy targets the gateway
        match &calls[buy_pos] {
            ChainCall::Submit { from, to, .. } => {
                assert_eq!(*from, wallet);
                assert_eq!(format!("{:?}", to), gateway);
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_product_id_makes_no_chain_call() {
        let h = harness();
        let request = PaymentRequest {
            to: Some("0x4444444444444444444444444444444444444444".to_string()),
            amount: Some(2.0),
            product_id: Some("abc".to_string()),
            ..Default::default()
        };

        let err = h.engine.execute_payment("agent_a", request).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidProductId(_)));
        assert!(h.chain.calls().is_empty());
    }

    #[tokio::test]
    async fn charge_is_submitted_from_the_spender_wallet() {
        let h = harness();
        let payer_wallet = h.directory.wallet_for("agent_payer").await.unwrap();
        let spender_wallet = h.directory.wallet_for("agent_spender").await.unwrap();
        assert_ne!(payer_wallet, spender_wallet);

        let settled = h
            .engine
            .charge("agent_spender", "agent_payer", 5.0, Some("api use".to_string()))
            .await
            .unwrap();
        assert_eq!(settled.payment.agent_id, "agent_spender");

        let charge_selector =
            selector_of(&abi::escrow_charge(payer_wallet, U256::from(5_000_000u64), "api use"));
        let submit = h
            .chain
            .calls()
            .into_iter()
            .find(|c| matches!(c, ChainCall::Submit { selector, .. } if *selector == charge_selector))
            .expect("charge submitted");

        match submit {
            ChainCall::Submit { from, to, .. } => {
                assert_eq!(from, spender_wallet);
                assert_eq!(to, addr(0x200));
            }
            other => panic!("unexpected call: {:?}", other),
        }
    }

    #[tokio::test]
    async fn insufficient_allowance_revert_is_surfaced_verbatim() {
        let (engine, directory, _dir) = failing_engine(ChainError::Reverted(
            "Insufficient allowance".to_string(),
        ));
        directory.ensure_agent("agent_payer").await.unwrap();

        let err = engine
            .charge("agent_spender", "agent_payer", 5.0, None)
            .await
            .unwrap_err();
        match err {
            ApiError::InsufficientFunds(msg) => assert_eq!(msg, "Insufficient allowance"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unrelated_revert_is_a_settlement_failure() {
        let (engine, directory, _dir) = failing_engine(ChainError::Reverted(
            "budget exhausted".to_string(),
        ));
        directory.ensure_agent("agent_payer").await.unwrap();

        let err = engine
            .charge("agent_spender", "agent_payer", 5.0, None)
            .await
            .unwrap_err();
        match err {
            ApiError::SettlementFailed(msg) => {
                assert!(msg.contains("charge"));
                assert!(msg.contains("budget exhausted"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn receipt_timeout_is_distinct_from_failure() {
        let (engine, directory, _dir) = failing_engine(ChainError::Timeout(
            "no receipt within the deadline".to_string(),
        ));
        directory.ensure_agent("agent_payer").await.unwrap();

        let err = engine
            .charge("agent_spender", "agent_payer", 5.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::SettlementTimeout(_)));
    }

    #[tokio::test]
    async fn invoice_payment_marks_it_paid_once() {
        let h = harness();
        h.directory.ensure_agent("agent_seller").await.unwrap();
        h.db
            .insert_invoice(&Invoice {
                id: "inv_1".to_string(),
                agent_id: "agent_seller".to_string(),
                amount: 1.0,
                currency: "USDC".to_string(),
                description: Some("X".to_string()),
                status: InvoiceStatus::Pending,
                payer_id: None,
                payment_hash: None,
                created_at: Utc::now(),
            })
            .unwrap();

        let request = PaymentRequest {
            invoice_id: Some("inv_1".to_string()),
            ..Default::default()
        };
        let settled = h
            .engine
            .execute_payment("agent_buyer", request.clone())
            .await
            .unwrap();

        let invoice = h.db.get_invoice("inv_1").unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.payment_hash, settled.payment.hash);

        let err = h
            .engine
            .execute_payment("agent_buyer", request)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AlreadySettled(_)));
    }

    #[test]
    fn base_unit_conversion_truncates() {
        assert_eq!(to_base_units(0.5, 6).unwrap(), U256::from(500_000u64));
        assert_eq!(to_base_units(1.2345678, 6).unwrap(), U256::from(1_234_567u64));
        assert_eq!(to_base_units(10.0, 0).unwrap(), U256::from(10u64));
        assert_eq!(to_base_units(0.0, 6).unwrap(), U256::zero());
        assert!(to_base_units(-1.0, 6).is_err());
        assert!(to_base_units(f64::NAN, 6).is_err());

        // truncation never yields more than the caller specified
        for amount in [0.1, 0.29, 1.9999999, 123.456789012, 0.333333] {
            let base = to_base_units(amount, 6).unwrap();
            assert!(from_base_units(base, 6) <= amount);
        }
    }
}
