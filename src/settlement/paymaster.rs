//! Gas-sponsorship ledger. The platform pays for gas; every confirmed
//! payment records what it cost, and per-agent totals are derived reads.

use ethers::types::U256;
use serde::Serialize;
use std::sync::Arc;

use crate::db::Database;
use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipStats {
    pub transaction_count: u64,
    /// Sum of gas_used * gas_price over all recorded payments, in wei
    pub total_sponsorship_wei: String,
}

/// The sponsorship block attached to a payment response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipSummary {
    pub gas_used: String,
    /// gas_used * effective_gas_price for this payment, in wei
    pub cost_sponsored: String,
    pub cumulative_agent_sponsorship: String,
}

pub struct Paymaster {
    db: Arc<Database>,
}

impl Paymaster {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record the gas cost of a confirmed payment. At most once per payment;
    /// a second call is ignored so aggregates never double-count.
    pub fn record(
        &self,
        payment_id: &str,
        gas_used: U256,
        gas_price: U256,
    ) -> Result<(), ApiError> {
        let cost = gas_used * gas_price;
        log::info!(
            "[Paymaster] Sponsoring payment {}. Cost: {} wei",
            payment_id,
            cost
        );

        let recorded =
            self.db
                .record_payment_gas(payment_id, &gas_used.to_string(), &gas_price.to_string())?;
        if !recorded {
            log::warn!(
                "[Paymaster] Gas for payment {} was already recorded, skipping",
                payment_id
            );
        }
        Ok(())
    }

    /// Aggregate sponsorship for an agent, always computed from the payments
    /// table. Summed with 256-bit math to avoid precision loss.
    pub fn stats_for(&self, agent_id: &str) -> Result<SponsorshipStats, ApiError> {
        let rows = self.db.sponsored_gas_for_agent(agent_id)?;

        let mut total = U256::zero();
        for (gas_used, gas_price) in &rows {
            let used = U256::from_dec_str(gas_used)
                .map_err(|e| ApiError::Internal(format!("Bad gas_used in store: {}", e)))?;
            let price = U256::from_dec_str(gas_price)
                .map_err(|e| ApiError::Internal(format!("Bad gas_price in store: {}", e)))?;
            total += used * price;
        }

        Ok(SponsorshipStats {
            transaction_count: rows.len() as u64,
            total_sponsorship_wei: total.to_string(),
        })
    }

    /// Build the response block for a payment that just settled.
    pub fn summary_for(
        &self,
        agent_id: &str,
        gas_used: U256,
        gas_price: U256,
    ) -> Result<SponsorshipSummary, ApiError> {
        let stats = self.stats_for(agent_id)?;
        Ok(SponsorshipSummary {
            gas_used: gas_used.to_string(),
            cost_sponsored: (gas_used * gas_price).to_string(),
            cumulative_agent_sponsorship: stats.total_sponsorship_wei,
        })
    }
}
