//! Reconciler construction and shared helpers

use std::sync::Arc;

use netrec_addressing::{AddressPolicy, Eui64Policy, Ipv6SubnetGenerator};
use netrec_core::{ReconcilerConfig, ResourceStore, Result};
use tracing::debug;

/// Computes and applies the auxiliary resources implied by lifecycle events.
///
/// Every operation re-reads current state from the store before acting, so
/// calls are safe to repeat after a partial failure. No state is cached
/// between calls.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ResourceStore>,
    pub(crate) policy: Arc<dyn AddressPolicy>,
    pub(crate) generator: Ipv6SubnetGenerator,
    pub(crate) config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler with an explicit address policy
    pub fn new(
        store: Arc<dyn ResourceStore>,
        policy: Arc<dyn AddressPolicy>,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let generator =
            Ipv6SubnetGenerator::new(config.ipv6_tenant_range, config.ipv6_prefix_length)?;
        Ok(Self {
            store,
            policy,
            generator,
            config,
        })
    }

    /// Create a reconciler using EUI-64 derivation over the configured tenant range
    pub fn with_default_policy(
        store: Arc<dyn ResourceStore>,
        config: ReconcilerConfig,
    ) -> Result<Self> {
        let policy = Arc::new(Eui64Policy::new(config.ipv6_tenant_range));
        Self::new(store, policy, config)
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<dyn AddressPolicy> {
        &self.policy
    }
}

/// A conflict means the resource already exists: `Ok(None)`.
pub(crate) fn tolerate_conflict<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_conflict() => {
            debug!("Treating conflict as success: {}", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
