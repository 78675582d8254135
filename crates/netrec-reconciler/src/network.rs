//! IPv6 subnet provisioning for new networks

use ipnetwork::IpNetwork;
use netrec_addressing::default_gateway;
use netrec_core::*;
use tracing::{debug, info};

use crate::reconciler::{tolerate_conflict, Reconciler};
use crate::report::ReconcileReport;

impl Reconciler {
    /// Whether `network` should carry an auto-provisioned IPv6 subnet
    pub fn requires_ipv6(&self, network: &Network) -> bool {
        self.config.auto_ipv6 && !network.external
    }

    /// Give the network an IPv6 subnet unless it already has one.
    ///
    /// Candidate CIDRs are drawn from the tenant range and checked against
    /// existing subnets; after `ipv6_assignment_attempts` collisions the call
    /// fails with [`Error::PoolExhausted`].
    pub async fn on_network_created(
        &self,
        ctx: &RequestContext,
        network: &Network,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new("network_created", ResourceKind::Network, network.id);
        let network = self.store.get_network(network.id).await?;

        if !self.requires_ipv6(&network) {
            debug!("Network {} does not require IPv6", network.id);
            report.noop(ResourceKind::Subnet, None, "network does not require IPv6");
            return Ok(report);
        }

        if let Some(existing) = self.existing_ipv6_subnet(network.id).await? {
            report.noop(
                ResourceKind::Subnet,
                Some(existing.id),
                format!("network already has IPv6 subnet {}", existing.cidr),
            );
            return Ok(report);
        }

        for attempt in 1..=self.config.ipv6_assignment_attempts {
            let cidr = IpNetwork::V6(self.generator.candidate(&mut rand::thread_rng()));

            if !self.store.list_subnets(&SubnetFilter::cidr(cidr)).await?.is_empty() {
                debug!("Candidate {} already allocated (attempt {})", cidr, attempt);
                continue;
            }

            let request = CreateSubnet {
                network_id: network.id,
                tenant_id: network.tenant_id.clone(),
                name: String::new(),
                cidr,
                gateway_ip: default_gateway(&cidr),
                enable_dhcp: true,
                ipv6_address_mode: Some(Ipv6AddressMode::Slaac),
            };

            match tolerate_conflict(self.store.create_subnet(request).await)? {
                Some(subnet) => {
                    info!(
                        "Added IPv6 subnet {} to network {} for tenant {} (requested by {})",
                        subnet.cidr, network.id, network.tenant_id, ctx.tenant_id
                    );
                    report.created(
                        ResourceKind::Subnet,
                        subnet.id,
                        format!("IPv6 subnet {}", subnet.cidr),
                    );
                    return Ok(report);
                }
                None => {
                    // Lost a race: either the network got its IPv6 subnet
                    // elsewhere or the candidate was taken meanwhile.
                    if let Some(existing) = self.existing_ipv6_subnet(network.id).await? {
                        report.noop(
                            ResourceKind::Subnet,
                            Some(existing.id),
                            format!("IPv6 subnet {} created concurrently", existing.cidr),
                        );
                        return Ok(report);
                    }
                }
            }
        }

        Err(Error::PoolExhausted(format!(
            "no unique /{} found in {} after {} attempts",
            self.generator.prefix_len(),
            self.generator.range(),
            self.config.ipv6_assignment_attempts
        )))
    }

    async fn existing_ipv6_subnet(&self, network_id: uuid::Uuid) -> Result<Option<Subnet>> {
        Ok(self
            .store
            .list_subnets(&SubnetFilter::network(network_id))
            .await?
            .into_iter()
            .find(Subnet::is_ipv6))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::report::ChangeOperation;
    use netrec_store::MemoryStore;

    async fn setup(config: ReconcilerConfig) -> (Arc<MemoryStore>, Reconciler, Network) {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::with_default_policy(store.clone(), config).unwrap();
        let network = store
            .create_network(CreateNetwork {
                tenant_id: "t1".into(),
                name: "web".into(),
                external: false,
            })
            .await
            .unwrap();
        (store, reconciler, network)
    }

    async fn ipv6_subnets(store: &MemoryStore, network: &Network) -> Vec<Subnet> {
        store
            .list_subnets(&SubnetFilter::network(network.id))
            .await
            .unwrap()
            .into_iter()
            .filter(Subnet::is_ipv6)
            .collect()
    }

    #[tokio::test]
    async fn test_creates_exactly_one_ipv6_subnet() {
        let (store, reconciler, network) = setup(ReconcilerConfig::default()).await;
        let ctx = RequestContext::tenant("t1");

        let report = reconciler.on_network_created(&ctx, &network).await.unwrap();
        assert_eq!(report.count(ChangeOperation::Create, ResourceKind::Subnet), 1);

        let subnets = ipv6_subnets(&store, &network).await;
        assert_eq!(subnets.len(), 1);
        let subnet = &subnets[0];
        assert_eq!(subnet.cidr.prefix(), 64);
        assert_eq!(subnet.ipv6_address_mode, Some(Ipv6AddressMode::Slaac));
        assert!(subnet.enable_dhcp);
        assert_eq!(subnet.tenant_id, "t1");
        assert!(ReconcilerConfig::default()
            .ipv6_tenant_range
            .contains(match subnet.cidr {
                IpNetwork::V6(net) => net.network(),
                IpNetwork::V4(_) => panic!("expected IPv6"),
            }));

        let again = reconciler.on_network_created(&ctx, &network).await.unwrap();
        assert!(again.is_noop());
        assert_eq!(ipv6_subnets(&store, &network).await.len(), 1);
    }

    #[tokio::test]
    async fn test_external_network_skipped() {
        let (store, reconciler, _) = setup(ReconcilerConfig::default()).await;
        let external = store
            .create_network(CreateNetwork {
                tenant_id: "admin".into(),
                name: "public".into(),
                external: true,
            })
            .await
            .unwrap();

        let report = reconciler
            .on_network_created(&RequestContext::admin("admin"), &external)
            .await
            .unwrap();
        assert!(report.is_noop());
        assert!(ipv6_subnets(&store, &external).await.is_empty());
    }

    #[tokio::test]
    async fn test_auto_ipv6_disabled() {
        let config = ReconcilerConfig {
            auto_ipv6: false,
            ..Default::default()
        };
        let (store, reconciler, network) = setup(config).await;
        let report = reconciler
            .on_network_created(&RequestContext::tenant("t1"), &network)
            .await
            .unwrap();
        assert!(report.is_noop());
        assert!(ipv6_subnets(&store, &network).await.is_empty());
    }

    #[tokio::test]
    async fn test_pool_exhaustion() {
        // A /64 range with /64 subnets has exactly one candidate.
        let config = ReconcilerConfig {
            ipv6_tenant_range: "fdd6:a1fa:cfa8:1::/64".parse().unwrap(),
            ipv6_prefix_length: 64,
            ipv6_assignment_attempts: 3,
            ..Default::default()
        };
        let (store, reconciler, network) = setup(config).await;
        let ctx = RequestContext::tenant("t1");
        reconciler.on_network_created(&ctx, &network).await.unwrap();

        let second = store
            .create_network(CreateNetwork {
                tenant_id: "t1".into(),
                name: "db".into(),
                external: false,
            })
            .await
            .unwrap();
        let err = reconciler.on_network_created(&ctx, &second).await.unwrap_err();
        assert!(matches!(err, Error::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let (store, reconciler, network) = setup(ReconcilerConfig::default()).await;
        store.fail_next("create_subnet");
        let err = reconciler
            .on_network_created(&RequestContext::tenant("t1"), &network)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamFailure(_)));

        // a retry converges
        reconciler
            .on_network_created(&RequestContext::tenant("t1"), &network)
            .await
            .unwrap();
        assert_eq!(ipv6_subnets(&store, &network).await.len(), 1);
    }
}
