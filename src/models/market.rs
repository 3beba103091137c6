use chrono::{DateTime, Utc};
use serde::Serialize;

/// A market listing: a service offered by a provider agent at a fixed price.
/// Immutable after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentService {
    pub id: String,
    pub provider_agent_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub currency: String,
    pub endpoint_url: String,
    pub collateral_amount: f64,
    pub created_at: DateTime<Utc>,
}
