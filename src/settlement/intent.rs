//! Turns a raw payment request into a concrete recipient, amount and
//! description. Invoice data always wins over conflicting raw fields.

use ethers::types::Address;
use std::sync::Arc;

use crate::db::Database;
use crate::error::ApiError;
use crate::models::InvoiceStatus;
use crate::wallet::WalletDirectory;

pub const DEFAULT_CURRENCY: &str = "USDC";

/// The raw body of a payment request, before resolution.
#[derive(Debug, Clone, Default)]
pub struct PaymentRequest {
    pub to: Option<String>,
    pub invoice_id: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub product_id: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedIntent {
    pub recipient: Address,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    /// Set when the payment settles an invoice
    pub invoice_id: Option<String>,
}

pub struct IntentResolver {
    db: Arc<Database>,
    directory: Arc<WalletDirectory>,
}

impl IntentResolver {
    pub fn new(db: Arc<Database>, directory: Arc<WalletDirectory>) -> Self {
        Self { db, directory }
    }

    /// Resolution order: invoice reference first, then raw `to`/`amount`,
    /// then agent-id-or-address resolution of the recipient.
    pub async fn resolve(
        &self,
        caller_agent_id: &str,
        request: &PaymentRequest,
    ) -> Result<ResolvedIntent, ApiError> {
        if let Some(ref invoice_id) = request.invoice_id {
            let invoice = self
                .db
                .get_invoice(invoice_id)?
                .ok_or_else(|| ApiError::NotFound(format!("Invoice not found: {}", invoice_id)))?;

            match invoice.status {
                InvoiceStatus::Paid => {
                    return Err(ApiError::AlreadySettled(format!(
                        "Invoice {} is already paid",
                        invoice_id
                    )));
                }
                InvoiceStatus::Cancelled => {
                    return Err(ApiError::Validation(format!(
                        "Invoice {} is cancelled",
                        invoice_id
                    )));
                }
                InvoiceStatus::Pending => {}
            }

            if let Some(ref payer_id) = invoice.payer_id {
                if payer_id != caller_agent_id {
                    return Err(ApiError::Forbidden(format!(
                        "Invoice {} can only be paid by {}",
                        invoice_id, payer_id
                    )));
                }
            }

            // The issuer's wallet receives the funds
            let recipient = self.directory.wallet_for(&invoice.agent_id).await?;

            return Ok(ResolvedIntent {
                recipient,
                amount: invoice.amount,
                currency: invoice.currency.clone(),
                description: invoice.description.clone(),
                invoice_id: Some(invoice.id),
            });
        }

        let to = request
            .to
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Missing recipient ('to')".to_string()))?;
        let amount = request
            .amount
            .ok_or_else(|| ApiError::Validation("Missing amount".to_string()))?;
        if !(amount.is_finite() && amount > 0.0) {
            return Err(ApiError::Validation(format!("Invalid amount: {}", amount)));
        }

        let recipient = self.directory.resolve_recipient(to)?;

        Ok(ResolvedIntent {
            recipient,
            amount,
            currency: request
                .currency
                .clone()
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            description: request.memo.clone(),
            invoice_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Invoice;
    use crate::wallet::WalletCustody;
    use async_trait::async_trait;
    use chrono::Utc;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::Signature;
    use tempfile::tempdir;

    struct FakeCustody;

    #[async_trait]
    impl WalletCustody for FakeCustody {
        async fn provision_wallet(&self, _agent_id: &str) -> Result<String, String> {
            Ok("0x00000000000000000000000000000000000000bb".to_string())
        }

        async fn sign_transaction(
            &self,
            _address: &str,
            _tx: &TypedTransaction,
        ) -> Result<Signature, String> {
            Err("not needed".to_string())
        }
    }

    fn setup() -> (IntentResolver, Arc<Database>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("test.db").to_str().unwrap()).unwrap());
        let directory = Arc::new(WalletDirectory::new(db.clone(), Arc::new(FakeCustody)));
        (IntentResolver::new(db.clone(), directory), db, dir)
    }

    fn pending_invoice(id: &str, payer_id: Option<&str>) -> Invoice {
        Invoice {
            id: id.to_string(),
            agent_id: "agent_seller".to_string(),
            amount: 1.0,
            currency: "USDC".to_string(),
            description: Some("X".to_string()),
            status: InvoiceStatus::Pending,
            payer_id: payer_id.map(|s| s.to_string()),
            payment_hash: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn invoice_fields_override_raw_fields() {
        let (resolver, db, _dir) = setup();
        db.insert_invoice(&pending_invoice("inv_1", None)).unwrap();

        let request = PaymentRequest {
            invoice_id: Some("inv_1".to_string()),
            to: Some("0x9999999999999999999999999999999999999999".to_string()),
            amount: Some(99.0),
            ..Default::default()
        };
        let intent = resolver.resolve("agent_buyer", &request).await.unwrap();

        assert_eq!(intent.amount, 1.0);
        assert_eq!(intent.description.as_deref(), Some("X"));
        assert_eq!(intent.invoice_id.as_deref(), Some("inv_1"));
        // recipient is the issuer's wallet, not the raw `to`
        assert_eq!(
            format!("{:?}", intent.recipient),
            "0x00000000000000000000000000000000000000bb"
        );
    }

    #[tokio::test]
    async fn paid_invoice_is_already_settled() {
        let (resolver, db, _dir) = setup();
        db.insert_invoice(&pending_invoice("inv_1", None)).unwrap();
        db.mark_invoice_paid("inv_1", "0xabc").unwrap();

        let request = PaymentRequest {
            invoice_id: Some("inv_1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve("agent_buyer", &request).await,
            Err(ApiError::AlreadySettled(_))
        ));
    }

    #[tokio::test]
    async fn payer_restriction_is_enforced() {
        let (resolver, db, _dir) = setup();
        db.insert_invoice(&pending_invoice("inv_1", Some("agent_x")))
            .unwrap();

        let request = PaymentRequest {
            invoice_id: Some("inv_1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve("agent_y", &request).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(resolver.resolve("agent_x", &request).await.is_ok());
    }

    #[tokio::test]
    async fn raw_request_requires_to_and_amount() {
        let (resolver, _db, _dir) = setup();

        let missing_to = PaymentRequest {
            amount: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve("agent_a", &missing_to).await,
            Err(ApiError::Validation(_))
        ));

        let negative = PaymentRequest {
            to: Some("0x1111111111111111111111111111111111111111".to_string()),
            amount: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve("agent_a", &negative).await,
            Err(ApiError::Validation(_))
        ));

        let unknown = PaymentRequest {
            to: Some("agent_ghost".to_string()),
            amount: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            resolver.resolve("agent_a", &unknown).await,
            Err(ApiError::UnknownRecipient(_))
        ));
    }
}
