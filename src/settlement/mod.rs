//! The settlement core: intent resolution, on-chain orchestration, the
//! meta-transaction boundary, and gas-sponsorship bookkeeping.

pub mod engine;
pub mod intent;
pub mod paymaster;
pub mod relay;

pub use engine::{SettledPayment, SettlementEngine, SettlementOutcome};
pub use intent::{IntentResolver, PaymentRequest, ResolvedIntent};
pub use paymaster::{Paymaster, SponsorshipStats, SponsorshipSummary};
pub use relay::parse_forward_request;
