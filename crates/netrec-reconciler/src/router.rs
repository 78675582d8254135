//! Router attachment and gateway port synchronization

use std::net::IpAddr;

use netrec_core::*;
use tracing::{debug, info};

use crate::reconciler::{tolerate_conflict, Reconciler};
use crate::report::ReconcileReport;

impl Reconciler {
    /// Attach a new IPv4 subnet to its tenant's router.
    ///
    /// Admin callers attach interfaces themselves and subnets without a
    /// gateway have nothing to attach. When the router already has an
    /// interface on the subnet's network, that interface is given the
    /// subnet's gateway instead of a second attachment.
    pub async fn on_subnet_created(
        &self,
        ctx: &RequestContext,
        subnet: &Subnet,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new("subnet_created", ResourceKind::Subnet, subnet.id);

        if ctx.is_admin {
            report.noop(
                ResourceKind::RouterInterface,
                None,
                "admin callers attach router interfaces manually",
            );
            return Ok(report);
        }

        let subnet = self.store.get_subnet(subnet.id).await?;
        if !subnet.is_ipv4() {
            report.noop(ResourceKind::RouterInterface, None, "not an IPv4 subnet");
            return Ok(report);
        }
        let Some(gateway_ip) = subnet.gateway_ip else {
            debug!("No gateway set for subnet {}, skipping", subnet.id);
            report.noop(ResourceKind::RouterInterface, None, "subnet has no gateway");
            return Ok(report);
        };

        let router = self.tenant_router(&subnet.tenant_id, &mut report).await?;

        let existing = self
            .store
            .list_ports(&PortFilter::router_interfaces(router.id).on_network(subnet.network_id))
            .await?;

        if let Some(port) = existing.first() {
            self.ensure_interface_gateway(port, &subnet, gateway_ip, &mut report)
                .await?;
            return Ok(report);
        }

        match tolerate_conflict(self.store.add_router_interface(router.id, subnet.id).await)? {
            Some(port) => {
                info!(
                    "Attached subnet {} to router {} via port {}",
                    subnet.id, router.id, port.id
                );
                report.created(
                    ResourceKind::RouterInterface,
                    port.id,
                    format!("router {} interface at {}", router.id, gateway_ip),
                );
            }
            None => report.noop(
                ResourceKind::RouterInterface,
                None,
                format!("subnet already attached to router {}", router.id),
            ),
        }
        Ok(report)
    }

    /// Move router interfaces that still carry `previous_gateway_ip` for this
    /// subnet onto the subnet's current gateway.
    ///
    /// Finding no such interface is not an error: the subnet may not be
    /// attached to any router yet.
    pub async fn on_subnet_updated(
        &self,
        ctx: &RequestContext,
        subnet: &Subnet,
        previous_gateway_ip: Option<IpAddr>,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new("subnet_updated", ResourceKind::Subnet, subnet.id);
        let subnet = self.store.get_subnet(subnet.id).await?;

        let Some(gateway_ip) = subnet.gateway_ip else {
            report.noop(ResourceKind::RouterInterface, None, "subnet has no gateway");
            return Ok(report);
        };
        let Some(previous) = previous_gateway_ip else {
            report.noop(ResourceKind::RouterInterface, None, "no previous gateway to replace");
            return Ok(report);
        };
        if previous == gateway_ip {
            report.noop(ResourceKind::RouterInterface, None, "gateway unchanged");
            return Ok(report);
        }

        let filter = PortFilter {
            network_id: Some(subnet.network_id),
            device_owner: Some(DeviceOwner::RouterInterface),
            ..Default::default()
        };
        for port in self.store.list_ports(&filter).await? {
            let Some(current) = port.fixed_ip_on(subnet.id).map(|ip| ip.ip_address) else {
                continue;
            };
            if current == gateway_ip {
                report.noop(
                    ResourceKind::RouterInterface,
                    Some(port.id),
                    format!("already at {gateway_ip}"),
                );
            } else if current == previous {
                let fixed_ips = replace_fixed_ip(&port.fixed_ips, subnet.id, gateway_ip);
                self.store
                    .update_port(port.id, PortUpdate::fixed_ips(fixed_ips))
                    .await?;
                info!(
                    "Updated gateway port {} of router {} ({}): {} -> {}",
                    port.id, port.device_id, ctx.tenant_id, previous, gateway_ip
                );
                report.updated(
                    ResourceKind::RouterInterface,
                    port.id,
                    format!("{previous} -> {gateway_ip}"),
                );
            }
        }

        if report.actions.is_empty() {
            report.noop(
                ResourceKind::RouterInterface,
                None,
                format!("no router interface at {previous}"),
            );
        }
        Ok(report)
    }

    /// First router of `tenant_id`, created on demand
    async fn tenant_router(&self, tenant_id: &str, report: &mut ReconcileReport) -> Result<Router> {
        let filter = RouterFilter::tenant(tenant_id);
        if let Some(router) = self.store.list_routers(&filter).await?.into_iter().next() {
            return Ok(router);
        }

        let request = CreateRouter {
            tenant_id: tenant_id.to_string(),
            name: format!("{}{}", self.config.router_name_prefix, tenant_id),
            admin_state_up: true,
        };
        match tolerate_conflict(self.store.create_router(request).await)? {
            Some(router) => {
                info!("Created router {} for tenant {}", router.id, tenant_id);
                report.created(ResourceKind::Router, router.id, router.name.clone());
                Ok(router)
            }
            None => self
                .store
                .list_routers(&filter)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found(format!("router for tenant {tenant_id}"))),
        }
    }

    async fn ensure_interface_gateway(
        &self,
        port: &Port,
        subnet: &Subnet,
        gateway_ip: IpAddr,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if port.fixed_ip_on(subnet.id).map(|ip| ip.ip_address) == Some(gateway_ip) {
            report.noop(
                ResourceKind::RouterInterface,
                Some(port.id),
                format!("router interface already carries {gateway_ip}"),
            );
            return Ok(());
        }

        let fixed_ips = replace_fixed_ip(&port.fixed_ips, subnet.id, gateway_ip);
        self.store
            .update_port(port.id, PortUpdate::fixed_ips(fixed_ips))
            .await?;
        info!(
            "Set gateway {} for subnet {} on existing router port {}",
            gateway_ip, subnet.id, port.id
        );
        report.updated(
            ResourceKind::RouterInterface,
            port.id,
            format!("gateway {gateway_ip} for subnet {}", subnet.id),
        );
        Ok(())
    }
}

/// `fixed_ips` with the entry for `subnet_id` set to `address`, appended
/// when missing
fn replace_fixed_ip(fixed_ips: &[FixedIp], subnet_id: uuid::Uuid, address: IpAddr) -> Vec<FixedIp> {
    let mut updated = fixed_ips.to_vec();
    match updated.iter_mut().find(|ip| ip.subnet_id == subnet_id) {
        Some(ip) => ip.ip_address = address,
        None => updated.push(FixedIp::new(subnet_id, address)),
    }
    updated
}
