//! Chain access: JSON-RPC client, calldata encoding, and the gateway trait
//! the settlement engine talks to.

pub mod abi;
pub mod gateway;
pub mod rpc;

pub use gateway::{ChainError, ChainGateway, HttpChainGateway, TxOutcome};
pub use rpc::{EvmRpc, TransactionReceipt};
