pub mod agent_services; // agent_services (market listings)
pub mod agents;         // agents (identity -> custody wallet address)
pub mod api_keys;       // api_keys (sha256 digests of sk_live_ keys)
pub mod invoices;       // invoices (settle-once payment requests)
pub mod payments;       // payments (confirmed settlements + gas sponsorship)
