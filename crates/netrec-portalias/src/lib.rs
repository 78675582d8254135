//! netrec-portalias: Named (protocol, port) pairs for firewall rules
//!
//! Tenants manage their own aliases under the `portalias` quota. Aliases with
//! port `0` are system wildcards owned by the platform tenant and cannot be
//! created, modified or deleted through the registry.

pub mod registry;

pub use registry::{PortAliasRegistry, SYSTEM_ALIASES};
