//! IPv6 address augmentation for new ports

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use netrec_addressing::host_ip_network;
use netrec_core::*;
use tracing::{debug, info};

use crate::reconciler::Reconciler;
use crate::report::ReconcileReport;

impl Reconciler {
    /// Give a new port its stateless IPv6 addresses and, with port security
    /// on, allow it to source link-local and temporary IPv6 traffic.
    ///
    /// Router-owned ports keep the addresses the router plumbing gave them.
    pub async fn on_port_created(
        &self,
        ctx: &RequestContext,
        port: &Port,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new("port_created", ResourceKind::Port, port.id);
        let port = self.store.get_port(port.id).await?;

        let Some(mac) = port.mac_address.clone() else {
            debug!("Port {} has no MAC address, skipping", port.id);
            report.noop(ResourceKind::Port, Some(port.id), "port has no MAC address");
            return Ok(report);
        };

        let mut patch = PortUpdate::default();

        let mut fixed_ips = port.fixed_ips.clone();
        if !is_router_owned(port.device_owner) {
            let slaac = self
                .store
                .list_subnets(&SubnetFilter::network(port.network_id))
                .await?
                .into_iter()
                .filter(|s| s.ipv6_address_mode == Some(Ipv6AddressMode::Slaac));

            for subnet in slaac {
                let IpNetwork::V6(prefix) = subnet.cidr else {
                    continue;
                };
                if port.fixed_ip_on(subnet.id).is_some() {
                    continue;
                }
                let address = self.policy.interface_address(&prefix, &mac)?;
                fixed_ips.push(FixedIp::new(subnet.id, IpAddr::V6(address)));
            }
            if fixed_ips.len() != port.fixed_ips.len() {
                patch.fixed_ips = Some(fixed_ips.clone());
            }
        }

        if port.port_security_enabled {
            let existing: Vec<IpNetwork> = fixed_ips
                .iter()
                .map(|ip| host_ip_network(ip.ip_address))
                .chain(port.allowed_address_pairs.iter().map(|p| p.ip_address))
                .collect();
            let special = self.policy.special_addresses(&existing, &mac)?;
            if !special.is_empty() {
                let mut pairs = port.allowed_address_pairs.clone();
                pairs.extend(special.into_iter().map(|net| AddressPair {
                    mac_address: mac.clone(),
                    ip_address: IpNetwork::V6(net),
                }));
                patch.allowed_address_pairs = Some(pairs);
            }
        }

        if patch.fixed_ips.is_none() && patch.allowed_address_pairs.is_none() {
            report.noop(ResourceKind::Port, Some(port.id), "IPv6 addresses already in place");
            return Ok(report);
        }

        let description = describe(&patch);
        self.store.update_port(port.id, patch).await?;
        info!(
            "Augmented port {} for tenant {}: {}",
            port.id, ctx.tenant_id, description
        );
        report.updated(ResourceKind::Port, port.id, description);
        Ok(report)
    }
}

fn is_router_owned(owner: DeviceOwner) -> bool {
    matches!(
        owner,
        DeviceOwner::RouterInterface | DeviceOwner::RouterGateway | DeviceOwner::FloatingIp
    )
}

fn describe(patch: &PortUpdate) -> String {
    let mut parts = Vec::new();
    if let Some(fixed_ips) = &patch.fixed_ips {
        parts.push(format!("{} fixed IPs", fixed_ips.len()));
    }
    if let Some(pairs) = &patch.allowed_address_pairs {
        parts.push(format!("{} allowed address pairs", pairs.len()));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::report::ChangeOperation;
    use ipnetwork::Ipv6Network;
    use netrec_store::MemoryStore;

    const MAC: &str = "fa:16:3e:00:11:22";

    async fn setup() -> (Arc<MemoryStore>, Reconciler, Network, Subnet) {
        let store = Arc::new(MemoryStore::new());
        let reconciler =
            Reconciler::with_default_policy(store.clone(), ReconcilerConfig::default()).unwrap();
        let network = store
            .create_network(CreateNetwork {
                tenant_id: "t1".into(),
                name: "web".into(),
                external: false,
            })
            .await
            .unwrap();
        let v6 = store
            .create_subnet(CreateSubnet {
                network_id: network.id,
                tenant_id: "t1".into(),
                name: String::new(),
                cidr: "fdd6:a1fa:cfa8:42::/64".parse().unwrap(),
                gateway_ip: Some("fdd6:a1fa:cfa8:42::1".parse().unwrap()),
                enable_dhcp: true,
                ipv6_address_mode: Some(Ipv6AddressMode::Slaac),
            })
            .await
            .unwrap();
        (store, reconciler, network, v6)
    }

    fn create_port(network: &Network, port_security_enabled: bool) -> CreatePort {
        CreatePort {
            network_id: network.id,
            tenant_id: "t1".into(),
            name: "vm".into(),
            mac_address: Some(MAC.into()),
            device_owner: DeviceOwner::Compute,
            device_id: "instance-1".into(),
            fixed_ips: vec![],
            allowed_address_pairs: vec![],
            port_security_enabled,
        }
    }

    #[tokio::test]
    async fn test_slaac_address_and_special_pairs() {
        let (store, reconciler, network, v6) = setup().await;
        let port = store.create_port(create_port(&network, true)).await.unwrap();

        let report = reconciler
            .on_port_created(&RequestContext::tenant("t1"), &port)
            .await
            .unwrap();
        assert_eq!(report.count(ChangeOperation::Update, ResourceKind::Port), 1);

        let port = store.get_port(port.id).await.unwrap();
        assert_eq!(
            port.fixed_ips,
            vec![FixedIp::new(
                v6.id,
                "fdd6:a1fa:cfa8:42:f816:3eff:fe00:1122".parse().unwrap()
            )]
        );

        let pairs: Vec<IpNetwork> = port.allowed_address_pairs.iter().map(|p| p.ip_address).collect();
        assert!(pairs.contains(&"fe80::f816:3eff:fe00:1122/128".parse().unwrap()));
        assert!(pairs.contains(&"fdd6:a1fa:cfa8:42::/64".parse().unwrap()));
        assert!(port.allowed_address_pairs.iter().all(|p| p.mac_address == MAC));

        let again = reconciler
            .on_port_created(&RequestContext::tenant("t1"), &port)
            .await
            .unwrap();
        assert!(again.is_noop());
    }

    #[tokio::test]
    async fn test_port_security_disabled_keeps_pairs_empty() {
        let (store, reconciler, network, _) = setup().await;
        let port = store.create_port(create_port(&network, false)).await.unwrap();

        reconciler
            .on_port_created(&RequestContext::tenant("t1"), &port)
            .await
            .unwrap();
        let port = store.get_port(port.id).await.unwrap();
        assert_eq!(port.fixed_ips.len(), 1);
        assert!(port.allowed_address_pairs.is_empty());
    }

    #[tokio::test]
    async fn test_router_ports_keep_fixed_ips() {
        let (store, reconciler, network, _) = setup().await;
        let mut req = create_port(&network, false);
        req.device_owner = DeviceOwner::RouterInterface;
        let port = store.create_port(req).await.unwrap();

        let report = reconciler
            .on_port_created(&RequestContext::tenant("t1"), &port)
            .await
            .unwrap();
        assert!(report.is_noop());
        assert!(store.get_port(port.id).await.unwrap().fixed_ips.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mac_is_fatal() {
        let (store, reconciler, network, _) = setup().await;
        let mut req = create_port(&network, true);
        req.mac_address = Some("not-a-mac".into());
        let port = store.create_port(req).await.unwrap();

        let err = reconciler
            .on_port_created(&RequestContext::tenant("t1"), &port)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAddressInput(_)));
    }

    #[test]
    fn test_existing_special_pairs_recognized() {
        let policy = netrec_addressing::Eui64Policy::new(
            "fdd6:a1fa:cfa8::/48".parse::<Ipv6Network>().unwrap(),
        );
        let existing = vec![
            "fdd6:a1fa:cfa8:42:f816:3eff:fe00:1122/128".parse().unwrap(),
            "fe80::f816:3eff:fe00:1122/128".parse().unwrap(),
            "fdd6:a1fa:cfa8:42::/64".parse().unwrap(),
        ];
        use netrec_addressing::AddressPolicy;
        assert!(policy.special_addresses(&existing, MAC).unwrap().is_empty());
    }
}
