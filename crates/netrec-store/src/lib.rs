//! netrec-store: in-memory collaborators
//!
//! A [`MemoryStore`] implements `ResourceStore`, `AliasStore` and
//! `QuotaDriver` for development, the replay service and tests. Production
//! deployments provide their own backend adapters.

pub mod memory;

pub use memory::MemoryStore;
