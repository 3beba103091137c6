use chrono::{DateTime, Utc};
use serde::Serialize;

/// An agent identity. The wallet address is assigned once by the custody
/// service and never changes afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}
