pub mod auth_keys;
pub mod health;
pub mod invoices;
pub mod market;
pub mod payments;
pub mod wallets;
pub mod x402;
