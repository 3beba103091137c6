//! Domain models shared across the API, settlement engine and storage layer.

mod agent;
mod invoice;
mod market;
mod payment;

pub use agent::Agent;
pub use invoice::{Invoice, InvoiceStatus};
pub use market::AgentService;
pub use payment::{Payment, PaymentStatus};
