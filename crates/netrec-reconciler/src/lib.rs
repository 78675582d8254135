//! netrec-reconciler: Resource reconciliation for network lifecycle events
//!
//! Provides:
//! - `on_network_created`: auto-provisioned IPv6 subnet per tenant network
//! - `on_subnet_created`: subnet attachment to the tenant router
//! - `on_subnet_updated`: gateway port synchronization
//! - `on_port_created`: stateless IPv6 addresses and allowed address pairs
//!
//! Store conflicts are treated as "already done"; every other failure is
//! returned to the caller unchanged.

mod network;
mod port;
pub mod reconciler;
pub mod report;
mod router;

pub use reconciler::Reconciler;
pub use report::{ChangeOperation, ReconcileAction, ReconcileReport};
