//! End-to-end lifecycle scenarios against the in-memory backend

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::{Arc, Mutex};

    use netrec_core::*;
    use netrec_hooks::{LifecycleEvent, LifecycleHooks};
    use netrec_reconciler::ChangeOperation;
    use netrec_store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        hooks: LifecycleHooks,
        events: Arc<Mutex<Vec<String>>>,
    }

    async fn harness_with(store: MemoryStore, config: ReconcilerConfig) -> Harness {
        let store = Arc::new(store);
        let hooks = LifecycleHooks::from_backend(store.clone(), config).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        hooks
            .register_hook(Arc::new(move |event: &LifecycleEvent| -> anyhow::Result<()> {
                sink.lock().unwrap().push(event.name().to_string());
                Ok(())
            }))
            .await;
        Harness {
            store,
            hooks,
            events,
        }
    }

    async fn harness() -> Harness {
        harness_with(MemoryStore::new(), ReconcilerConfig::default()).await
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn subnet_req(network: &Network, cidr: &str, gateway: Option<&str>) -> CreateSubnet {
        CreateSubnet {
            network_id: network.id,
            tenant_id: network.tenant_id.clone(),
            name: "s1".into(),
            cidr: cidr.parse().unwrap(),
            gateway_ip: gateway.map(ip),
            enable_dhcp: true,
            ipv6_address_mode: None,
        }
    }

    fn port_req(network: &Network, port_security_enabled: bool) -> CreatePort {
        CreatePort {
            network_id: network.id,
            tenant_id: network.tenant_id.clone(),
            name: "vm".into(),
            mac_address: Some("fa:16:3e:00:11:22".into()),
            device_owner: DeviceOwner::Compute,
            device_id: "instance-1".into(),
            fixed_ips: vec![],
            allowed_address_pairs: vec![],
            port_security_enabled,
        }
    }

    async fn create_network(h: &Harness, ctx: &RequestContext) -> Network {
        h.hooks
            .create_network(
                ctx,
                CreateNetwork {
                    tenant_id: ctx.tenant_id.clone(),
                    name: "web".into(),
                    external: false,
                },
            )
            .await
            .unwrap()
            .resource
    }

    async fn ipv6_subnets(h: &Harness, network: &Network) -> Vec<Subnet> {
        h.store
            .list_subnets(&SubnetFilter::network(network.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_ipv6())
            .collect()
    }

    #[tokio::test]
    async fn test_network_and_subnet_provisioning() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;

        let outcome = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap();
        let s1 = outcome.resource;
        assert_eq!(
            outcome.reports[0].count(ChangeOperation::Create, ResourceKind::Router),
            1
        );

        let routers = h.store.list_routers(&RouterFilter::tenant("t1")).await.unwrap();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].name, "ak-t1");

        let interfaces = h
            .store
            .list_ports(&PortFilter::router_interfaces(routers[0].id))
            .await
            .unwrap();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].fixed_ips, vec![FixedIp::new(s1.id, ip("10.0.0.1"))]);

        let v6 = ipv6_subnets(&h, &network).await;
        assert_eq!(v6.len(), 1);
        assert_eq!(v6[0].ipv6_address_mode, Some(Ipv6AddressMode::Slaac));
        let range: ipnetwork::Ipv6Network = "fdd6:a1fa:cfa8::/48".parse().unwrap();
        match v6[0].cidr {
            ipnetwork::IpNetwork::V6(net) => {
                assert_eq!(net.prefix(), 64);
                assert!(range.contains(net.network()));
            }
            other => panic!("unexpected cidr {other}"),
        }

        let again = h
            .hooks
            .reconciler()
            .on_network_created(&ctx, &network)
            .await
            .unwrap();
        assert!(again.is_noop());
        assert_eq!(ipv6_subnets(&h, &network).await.len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_change_moves_router_interface() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        let s1 = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap()
            .resource;

        let patch = SubnetUpdate::gateway(Some(ip("10.0.0.254")));
        let outcome = h.hooks.update_subnet(&ctx, s1.id, patch.clone()).await.unwrap();
        assert_eq!(
            outcome.reports[0].count(ChangeOperation::Update, ResourceKind::RouterInterface),
            1
        );

        let router = &h.store.list_routers(&RouterFilter::tenant("t1")).await.unwrap()[0];
        let interfaces = h
            .store
            .list_ports(&PortFilter::router_interfaces(router.id))
            .await
            .unwrap();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(
            interfaces[0].fixed_ip_on(s1.id).map(|f| f.ip_address),
            Some(ip("10.0.0.254"))
        );

        let second = h.hooks.update_subnet(&ctx, s1.id, patch).await.unwrap();
        assert!(second.reports[0].is_noop());
    }

    #[tokio::test]
    async fn test_port_alias_quota_lifecycle() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let registry = h.hooks.aliases();

        let alias = registry
            .create(
                &ctx,
                CreatePortAlias {
                    tenant_id: "t1".into(),
                    name: "http-alt".into(),
                    protocol: "tcp".into(),
                    port: 8080,
                },
            )
            .await
            .unwrap();
        assert_eq!(h.store.usage("t1", PORTALIAS_RESOURCE).await, 1);

        registry.delete(&ctx, alias.id).await.unwrap();
        assert_eq!(h.store.usage("t1", PORTALIAS_RESOURCE).await, 0);
    }

    #[tokio::test]
    async fn test_wildcard_alias_consumes_no_quota() {
        let h = harness().await;
        let err = h
            .hooks
            .aliases()
            .create(
                &RequestContext::tenant("t1"),
                CreatePortAlias {
                    tenant_id: "t1".into(),
                    name: String::new(),
                    protocol: "tcp".into(),
                    port: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PolicyViolation(ref m) if m == "creation of wildcard port aliases"));
        assert_eq!(h.store.usage("t1", PORTALIAS_RESOURCE).await, 0);
    }

    #[tokio::test]
    async fn test_tenant_network_seeds_system_aliases() {
        let h = harness().await;
        create_network(&h, &RequestContext::tenant("t1")).await;
        create_network(&h, &RequestContext::tenant("t2")).await;

        let visible = h
            .hooks
            .aliases()
            .list(&RequestContext::tenant("t1"), &PortAliasFilter::default())
            .await
            .unwrap();
        assert_eq!(visible.len(), 3);
        assert!(visible.iter().all(|a| a.is_system()));
    }

    #[tokio::test]
    async fn test_oversized_subnet_rejected_before_write() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        h.events.lock().unwrap().clear();

        let err = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/16", Some("10.0.0.1")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PolicyViolation(_)));
        assert!(h.events.lock().unwrap().is_empty());

        let v4 = h
            .store
            .list_subnets(&SubnetFilter::network(network.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_ipv4())
            .count();
        assert_eq!(v4, 0);

        // Admins are not held to the size policy
        h.hooks
            .create_subnet(
                &RequestContext::admin("t1"),
                subnet_req(&network, "10.0.0.0/16", Some("10.0.0.1")),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delegate_failure_skips_reconciliation() {
        let h = harness().await;
        h.store.fail_next("create_network");

        let err = h
            .hooks
            .create_network(
                &RequestContext::tenant("t1"),
                CreateNetwork {
                    tenant_id: "t1".into(),
                    name: "web".into(),
                    external: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamFailure(_)));
        assert!(h.events.lock().unwrap().is_empty());
        assert!(h
            .store
            .list_subnets(&SubnetFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_subnet_update_skips_reconciliation() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        let s1 = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap()
            .resource;
        h.events.lock().unwrap().clear();
        h.store.fail_next("update_subnet");

        let err = h
            .hooks
            .update_subnet(&ctx, s1.id, SubnetUpdate::gateway(Some(ip("10.0.0.254"))))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamFailure(_)));

        let events = h.events.lock().unwrap().clone();
        assert!(!events.contains(&"subnet_updated".to_string()));
        assert!(!events.contains(&"reconciled".to_string()));
        assert_eq!(
            h.store.get_subnet(s1.id).await.unwrap().gateway_ip,
            Some(ip("10.0.0.1"))
        );
    }

    #[tokio::test]
    async fn test_removed_gateway_leaves_interface() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        let s1 = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap()
            .resource;

        let outcome = h
            .hooks
            .update_subnet(&ctx, s1.id, SubnetUpdate::gateway(None))
            .await
            .unwrap();
        assert_eq!(outcome.resource.gateway_ip, None);
        assert!(outcome.reports[0].is_noop());

        let router = &h.store.list_routers(&RouterFilter::tenant("t1")).await.unwrap()[0];
        let interfaces = h
            .store
            .list_ports(&PortFilter::router_interfaces(router.id))
            .await
            .unwrap();
        assert_eq!(
            interfaces[0].fixed_ip_on(s1.id).map(|f| f.ip_address),
            Some(ip("10.0.0.1"))
        );
    }

    #[tokio::test]
    async fn test_port_reread_failure_is_reconciliation_error() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        h.store.fail_nth("get_port", 1);

        let err = h
            .hooks
            .create_port(&ctx, port_req(&network, true))
            .await
            .unwrap_err();
        let port_id = match err {
            Error::Reconciliation { kind, id, source } => {
                assert_eq!(kind, "port");
                assert!(matches!(*source, Error::UpstreamFailure(_)));
                id
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(h.events.lock().unwrap().contains(&"reconciled".to_string()));

        let port = h.hooks.get_port(&ctx, port_id.parse().unwrap()).await.unwrap();
        assert_eq!(port.fixed_ips.len(), 1);
        assert!(!port.allowed_address_pairs.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_failure_keeps_primary_resource() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        h.store.fail_next("create_router");

        let err = h
            .hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap_err();
        let subnet_id = match err {
            Error::Reconciliation { kind, id, source } => {
                assert_eq!(kind, "subnet");
                assert!(matches!(*source, Error::UpstreamFailure(_)));
                id
            }
            other => panic!("unexpected error: {other:?}"),
        };
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&"reconcile_failed".to_string()));

        let subnet = h.store.get_subnet(subnet_id.parse().unwrap()).await.unwrap();
        assert_eq!(subnet.cidr.to_string(), "10.0.0.0/24");

        // Re-running reconciliation for the id completes the work
        let report = h
            .hooks
            .reconciler()
            .on_subnet_created(&ctx, &subnet)
            .await
            .unwrap();
        assert_eq!(report.count(ChangeOperation::Create, ResourceKind::RouterInterface), 1);
    }

    #[tokio::test]
    async fn test_port_without_addresses_presented_with_link_local() {
        let config = ReconcilerConfig {
            auto_ipv6: false,
            ..Default::default()
        };
        let h = harness_with(MemoryStore::new(), config).await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;

        let port = h
            .hooks
            .create_port(&ctx, port_req(&network, false))
            .await
            .unwrap()
            .resource;
        let link_local = FixedIp::new(ZERO_SUBNET_ID, ip("fe80::f816:3eff:fe00:1122"));
        assert_eq!(port.fixed_ips, vec![link_local.clone()]);

        let fetched = h.hooks.get_port(&ctx, port.id).await.unwrap();
        assert_eq!(fetched.fixed_ips, vec![link_local.clone()]);
        let listed = h
            .hooks
            .list_ports(&ctx, &PortFilter::default().on_network(network.id))
            .await
            .unwrap();
        assert_eq!(listed[0].fixed_ips, vec![link_local]);

        assert!(h.store.get_port(port.id).await.unwrap().fixed_ips.is_empty());
    }

    #[tokio::test]
    async fn test_secured_port_gets_ipv6_addresses() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        let v6 = ipv6_subnets(&h, &network).await.remove(0);

        let port = h
            .hooks
            .create_port(&ctx, port_req(&network, true))
            .await
            .unwrap()
            .resource;
        assert_eq!(port.fixed_ips.len(), 1);
        assert_eq!(port.fixed_ips[0].subnet_id, v6.id);

        let pairs: Vec<_> = port.allowed_address_pairs.iter().map(|p| p.ip_address).collect();
        assert!(pairs.contains(&"fe80::f816:3eff:fe00:1122/128".parse().unwrap()));
        assert!(pairs.contains(&v6.cidr));
    }

    #[tokio::test]
    async fn test_delete_port() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        let port = h
            .hooks
            .create_port(&ctx, port_req(&network, false))
            .await
            .unwrap()
            .resource;

        h.hooks.delete_port(&ctx, port.id).await.unwrap();
        assert!(h.events.lock().unwrap().contains(&"port_deleted".to_string()));
        assert!(matches!(
            h.hooks.delete_port(&ctx, port.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_routers() {
        let h = harness().await;
        let ctx = RequestContext::tenant("t1");
        let network = create_network(&h, &ctx).await;
        h.hooks
            .create_subnet(&ctx, subnet_req(&network, "10.0.0.0/24", Some("10.0.0.1")))
            .await
            .unwrap();

        let data = h.hooks.sync_routers(&ctx, None).await.unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].interfaces.len(), 1);

        let other = h
            .hooks
            .sync_routers(&RequestContext::tenant("t2"), None)
            .await
            .unwrap();
        assert!(other.is_empty());

        let none = h
            .hooks
            .sync_routers(&ctx, Some(vec![uuid::Uuid::new_v4()]))
            .await
            .unwrap();
        assert!(none.is_empty());

        let json = serde_json::to_value(&data[0]).unwrap();
        assert_eq!(json["router"]["name"], "ak-t1");
    }

    #[tokio::test]
    async fn test_failing_hook_does_not_fail_request() {
        let h = harness().await;
        h.hooks
            .register_hook(Arc::new(|_event: &LifecycleEvent| -> anyhow::Result<()> {
                Err(anyhow::anyhow!("audit sink unavailable"))
            }))
            .await;

        let network = create_network(&h, &RequestContext::tenant("t1")).await;
        assert_eq!(network.tenant_id, "t1");
        assert!(h
            .events
            .lock()
            .unwrap()
            .contains(&"network_created".to_string()));
    }
}
