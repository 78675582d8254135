//! Core types for netrec
//!
//! # Modules
//!
//! - `config`: Environment loading and reconciler configuration
//! - `error`: Error taxonomy and Result alias
//! - `store`: Collaborator contracts (resource store, alias store, quota)
//! - `types`: Networks, subnets, routers, ports and port aliases

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-exports
pub use config::ReconcilerConfig;
pub use error::{Error, Result};
pub use store::{AliasStore, QuotaDriver, Reservation, ResourceStore, PORTALIAS_RESOURCE};
pub use types::*;
