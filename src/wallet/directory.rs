//! Agent-id to wallet-address mapping. Wallets are provisioned lazily on
//! first need and are immutable afterwards.

use ethers::types::Address;
use std::sync::Arc;

use crate::db::Database;
use crate::error::ApiError;
use crate::models::Agent;
use crate::wallet::WalletCustody;

pub struct WalletDirectory {
    db: Arc<Database>,
    custody: Arc<dyn WalletCustody>,
}

impl WalletDirectory {
    pub fn new(db: Arc<Database>, custody: Arc<dyn WalletCustody>) -> Self {
        Self { db, custody }
    }

    /// Return the agent, provisioning a custody wallet on first reference.
    pub async fn ensure_agent(&self, agent_id: &str) -> Result<Agent, ApiError> {
        if let Some(agent) = self.db.get_agent(agent_id)? {
            return Ok(agent);
        }

        let address = self
            .custody
            .provision_wallet(agent_id)
            .await
            .map_err(ApiError::Internal)?;

        log::info!("[WalletDirectory] Provisioned wallet {} for {}", address, agent_id);

        // INSERT OR IGNORE: a concurrent provision for the same agent keeps
        // whichever row landed first
        self.db.insert_agent(agent_id, &address)?;
        self.db
            .get_agent(agent_id)?
            .ok_or_else(|| ApiError::Internal(format!("Agent {} vanished after insert", agent_id)))
    }

    /// The agent's wallet address as a typed `Address`.
    pub async fn wallet_for(&self, agent_id: &str) -> Result<Address, ApiError> {
        let agent = self.ensure_agent(agent_id).await?;
        agent.wallet_address.parse().map_err(|_| {
            ApiError::Internal(format!(
                "Stored wallet address for {} is not valid: {}",
                agent_id, agent.wallet_address
            ))
        })
    }

    /// Resolve a recipient that is either a literal 0x address or an agent id.
    /// A malformed address is rejected; an unknown agent id is a 404.
    pub fn resolve_recipient(&self, to: &str) -> Result<Address, ApiError> {
        if to.starts_with("0x") {
            return to
                .parse()
                .map_err(|_| ApiError::InvalidRecipient(format!("Invalid address: {}", to)));
        }

        let agent = self
            .db
            .get_agent(to)?
            .ok_or_else(|| ApiError::UnknownRecipient(format!("Unknown agent: {}", to)))?;

        agent.wallet_address.parse().map_err(|_| {
            ApiError::Internal(format!(
                "Stored wallet address for {} is not valid: {}",
                to, agent.wallet_address
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::Signature;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeCustody {
        provisions: AtomicUsize,
    }

    #[async_trait]
    impl WalletCustody for FakeCustody {
        async fn provision_wallet(&self, _agent_id: &str) -> Result<String, String> {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            Ok("0x00000000000000000000000000000000000000aa".to_string())
        }

        async fn sign_transaction(
            &self,
            _address: &str,
            _tx: &TypedTransaction,
        ) -> Result<Signature, String> {
            Err("not needed".to_string())
        }
    }

    fn setup() -> (WalletDirectory, Arc<FakeCustody>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap());
        let custody = Arc::new(FakeCustody {
            provisions: AtomicUsize::new(0),
        });
        (WalletDirectory::new(db, custody.clone()), custody, dir)
    }

    #[tokio::test]
    async fn wallet_is_provisioned_once() {
        let (directory, custody, _dir) = setup();

        let first = directory.ensure_agent("agent_alpha").await.unwrap();
        let second = directory.ensure_agent("agent_alpha").await.unwrap();

        assert_eq!(first.wallet_address, second.wallet_address);
        assert_eq!(custody.provisions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recipient_resolution_prefers_literal_addresses() {
        let (directory, _custody, _dir) = setup();
        directory.ensure_agent("agent_beta").await.unwrap();

        let addr = directory
            .resolve_recipient("0x1111111111111111111111111111111111111111")
            .unwrap();
        assert_eq!(format!("{:?}", addr), "0x1111111111111111111111111111111111111111");

        assert!(directory.resolve_recipient("agent_beta").is_ok());
        assert!(matches!(
            directory.resolve_recipient("0xnotanaddress"),
            Err(ApiError::InvalidRecipient(_))
        ));
        assert!(matches!(
            directory.resolve_recipient("agent_missing"),
            Err(ApiError::UnknownRecipient(_))
        ));
    }
}
