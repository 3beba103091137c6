//! Wallet concerns: the external custody service and the agent wallet
//! directory.

mod custody;
mod directory;

pub use custody::{CustodyClient, NoCustody, WalletCustody};
pub use directory::WalletDirectory;
