use std::env;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const RPC_URL: &str = "BASE_SEPOLIA_RPC_URL";
    pub const USDC_ADDRESS: &str = "USDC_CONTRACT_ADDRESS";
    pub const ESCROW_ADDRESS: &str = "WEPPO_CONTRACT_ADDRESS";
    pub const FORWARDER_ADDRESS: &str = "FORWARDER_CONTRACT_ADDRESS";
    pub const RELAYER_PRIVATE_KEY: &str = "RELAYER_PRIVATE_KEY";
    pub const CUSTODY_URL: &str = "CUSTODY_SERVICE_URL";
    pub const CUSTODY_API_KEY: &str = "CUSTODY_API_KEY";
    pub const EXPLORER_BASE_URL: &str = "EXPLORER_BASE_URL";
    pub const RECEIPT_TIMEOUT_SECS: &str = "RECEIPT_TIMEOUT_SECS";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 3111;
    pub const DATABASE_URL: &str = "./weppo.db";
    pub const RPC_URL: &str = "https://sepolia.base.org";
    pub const USDC_ADDRESS: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
    pub const EXPLORER_BASE_URL: &str = "https://sepolia.basescan.org";
    pub const RECEIPT_TIMEOUT_SECS: u64 = 120;
    pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
}

/// Process configuration, loaded once at startup and injected into components.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub rpc_url: String,
    /// Stablecoin (USDC) contract address
    pub usdc_address: String,
    /// Weppo escrow contract address (deposit / preAuthorize / charge)
    pub escrow_address: String,
    /// ERC-2771 trusted forwarder contract address
    pub forwarder_address: String,
    /// Platform relayer key for meta-transaction execution
    pub relayer_private_key: Option<String>,
    /// Wallet custody service (provisions and signs for agent wallets)
    pub custody_url: Option<String>,
    pub custody_api_key: Option<String>,
    pub explorer_base_url: String,
    pub receipt_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let config = Self {
            port: env::var(env_vars::PORT)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::PORT),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            rpc_url: env::var(env_vars::RPC_URL)
                .unwrap_or_else(|_| defaults::RPC_URL.to_string()),
            usdc_address: env::var(env_vars::USDC_ADDRESS)
                .unwrap_or_else(|_| defaults::USDC_ADDRESS.to_string()),
            escrow_address: env::var(env_vars::ESCROW_ADDRESS)
                .unwrap_or_else(|_| defaults::ZERO_ADDRESS.to_string()),
            forwarder_address: env::var(env_vars::FORWARDER_ADDRESS)
                .unwrap_or_else(|_| defaults::ZERO_ADDRESS.to_string()),
            relayer_private_key: env::var(env_vars::RELAYER_PRIVATE_KEY).ok(),
            custody_url: env::var(env_vars::CUSTODY_URL).ok(),
            custody_api_key: env::var(env_vars::CUSTODY_API_KEY).ok(),
            explorer_base_url: env::var(env_vars::EXPLORER_BASE_URL)
                .unwrap_or_else(|_| defaults::EXPLORER_BASE_URL.to_string()),
            receipt_timeout_secs: env::var(env_vars::RECEIPT_TIMEOUT_SECS)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::RECEIPT_TIMEOUT_SECS),
        };

        if config.relayer_private_key.is_none() {
            log::warn!("{} not set - meta-transaction relaying will fail", env_vars::RELAYER_PRIVATE_KEY);
        }
        if config.custody_url.is_none() {
            log::warn!("{} not set - custodial settlement will fail", env_vars::CUSTODY_URL);
        }

        config
    }
}
