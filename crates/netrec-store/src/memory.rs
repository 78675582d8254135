//! In-memory resource, alias and quota store
//!
//! Implements the collaborator contracts over plain tables guarded by a
//! tokio `RwLock`. Tables keep insertion order so "first router of a tenant"
//! is stable. One-shot failures can be injected per operation name, on the
//! next call or a later one, to exercise error paths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use netrec_core::*;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// OUI used for generated MAC addresses
const MAC_PREFIX: &str = "fa:16:3e";

#[derive(Debug, Default)]
struct Tables {
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    routers: Vec<Router>,
    ports: Vec<Port>,
    aliases: Vec<PortAlias>,
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    limits: HashMap<String, u32>,
    usage: RwLock<HashMap<(TenantId, String), u32>>,
    /// Operation name -> calls to let through before failing
    failures: Mutex<HashMap<String, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit `resource` to `limit` units per tenant
    pub fn with_quota_limit(mut self, resource: impl Into<String>, limit: u32) -> Self {
        self.limits.insert(resource.into(), limit);
        self
    }

    /// Make the next call of `operation` (e.g. `"create_subnet"`) fail with
    /// an upstream failure
    pub fn fail_next(&self, operation: &str) {
        self.fail_nth(operation, 0);
    }

    /// Let `skip` calls of `operation` succeed, then fail the following one
    pub fn fail_nth(&self, operation: &str, skip: usize) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(operation.to_string(), skip);
    }

    /// Units of `resource` currently consumed by `tenant_id`
    pub async fn usage(&self, tenant_id: &str, resource: &str) -> u32 {
        self.usage
            .read()
            .await
            .get(&(tenant_id.to_string(), resource.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn check_failure(&self, operation: &str) -> Result<()> {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let injected = match failures.get(operation).copied() {
            Some(0) => {
                failures.remove(operation);
                true
            }
            Some(skip) => {
                failures.insert(operation.to_string(), skip - 1);
                false
            }
            None => false,
        };
        drop(failures);
        if injected {
            debug!("Injected failure for {}", operation);
            return Err(Error::upstream(format!("{operation} failed")));
        }
        Ok(())
    }
}

fn random_mac() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}:{:02x}:{:02x}:{:02x}",
        MAC_PREFIX,
        rng.gen::<u8>(),
        rng.gen::<u8>(),
        rng.gen::<u8>()
    )
}

fn missing(kind: ResourceKind, id: Uuid) -> Error {
    Error::not_found(format!("{kind} {id}"))
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_network(&self, req: CreateNetwork) -> Result<Network> {
        self.check_failure("create_network")?;
        let network = Network {
            id: Uuid::new_v4(),
            tenant_id: req.tenant_id,
            name: req.name,
            external: req.external,
            subnets: Vec::new(),
        };
        self.tables.write().await.networks.push(network.clone());
        Ok(network)
    }

    async fn get_network(&self, id: Uuid) -> Result<Network> {
        self.check_failure("get_network")?;
        self.tables
            .read()
            .await
            .networks
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Network, id))
    }

    async fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<Network>> {
        self.check_failure("list_networks")?;
        Ok(self
            .tables
            .read()
            .await
            .networks
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    async fn create_subnet(&self, req: CreateSubnet) -> Result<Subnet> {
        self.check_failure("create_subnet")?;
        let mut tables = self.tables.write().await;

        if tables
            .subnets
            .iter()
            .any(|s| s.network_id == req.network_id && s.cidr == req.cidr)
        {
            return Err(Error::conflict(format!(
                "subnet {} already exists on network {}",
                req.cidr, req.network_id
            )));
        }

        let subnet = Subnet {
            id: Uuid::new_v4(),
            network_id: req.network_id,
            tenant_id: req.tenant_id,
            name: req.name,
            cidr: req.cidr,
            gateway_ip: req.gateway_ip,
            enable_dhcp: req.enable_dhcp,
            ipv6_address_mode: req.ipv6_address_mode,
        };

        let network = tables
            .networks
            .iter_mut()
            .find(|n| n.id == req.network_id)
            .ok_or_else(|| missing(ResourceKind::Network, req.network_id))?;
        network.subnets.push(subnet.id);
        tables.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn get_subnet(&self, id: Uuid) -> Result<Subnet> {
        self.check_failure("get_subnet")?;
        self.tables
            .read()
            .await
            .subnets
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Subnet, id))
    }

    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>> {
        self.check_failure("list_subnets")?;
        Ok(self
            .tables
            .read()
            .await
            .subnets
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn update_subnet(&self, id: Uuid, patch: SubnetUpdate) -> Result<Subnet> {
        self.check_failure("update_subnet")?;
        let mut tables = self.tables.write().await;
        let subnet = tables
            .subnets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| missing(ResourceKind::Subnet, id))?;
        patch.apply_to(subnet);
        Ok(subnet.clone())
    }

    async fn create_router(&self, req: CreateRouter) -> Result<Router> {
        self.check_failure("create_router")?;
        let router = Router {
            id: Uuid::new_v4(),
            tenant_id: req.tenant_id,
            name: req.name,
            admin_state_up: req.admin_state_up,
        };
        self.tables.write().await.routers.push(router.clone());
        Ok(router)
    }

    async fn get_router(&self, id: Uuid) -> Result<Router> {
        self.check_failure("get_router")?;
        self.tables
            .read()
            .await
            .routers
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Router, id))
    }

    async fn list_routers(&self, filter: &RouterFilter) -> Result<Vec<Router>> {
        self.check_failure("list_routers")?;
        Ok(self
            .tables
            .read()
            .await
            .routers
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn add_router_interface(&self, router_id: Uuid, subnet_id: Uuid) -> Result<Port> {
        self.check_failure("add_router_interface")?;
        let mut tables = self.tables.write().await;

        let router = tables
            .routers
            .iter()
            .find(|r| r.id == router_id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Router, router_id))?;
        let subnet = tables
            .subnets
            .iter()
            .find(|s| s.id == subnet_id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Subnet, subnet_id))?;

        let device_id = router_id.to_string();
        if tables.ports.iter().any(|p| {
            p.device_owner == DeviceOwner::RouterInterface
                && p.device_id == device_id
                && p.fixed_ip_on(subnet_id).is_some()
        }) {
            return Err(Error::conflict(format!(
                "router {router_id} already has an interface on subnet {subnet_id}"
            )));
        }

        let gateway_ip = subnet.gateway_ip.ok_or_else(|| {
            Error::validation(format!("subnet {subnet_id} has no gateway IP"))
        })?;

        let port = Port {
            id: Uuid::new_v4(),
            network_id: subnet.network_id,
            tenant_id: router.tenant_id,
            name: String::new(),
            mac_address: Some(random_mac()),
            device_owner: DeviceOwner::RouterInterface,
            device_id,
            fixed_ips: vec![FixedIp::new(subnet_id, gateway_ip)],
            allowed_address_pairs: Vec::new(),
            port_security_enabled: false,
        };
        tables.ports.push(port.clone());
        Ok(port)
    }

    async fn create_port(&self, req: CreatePort) -> Result<Port> {
        self.check_failure("create_port")?;
        let mut tables = self.tables.write().await;
        if !tables.networks.iter().any(|n| n.id == req.network_id) {
            return Err(missing(ResourceKind::Network, req.network_id));
        }
        let port = Port {
            id: Uuid::new_v4(),
            network_id: req.network_id,
            tenant_id: req.tenant_id,
            name: req.name,
            mac_address: req.mac_address.or_else(|| Some(random_mac())),
            device_owner: req.device_owner,
            device_id: req.device_id,
            fixed_ips: req.fixed_ips,
            allowed_address_pairs: req.allowed_address_pairs,
            port_security_enabled: req.port_security_enabled,
        };
        tables.ports.push(port.clone());
        Ok(port)
    }

    async fn get_port(&self, id: Uuid) -> Result<Port> {
        self.check_failure("get_port")?;
        self.tables
            .read()
            .await
            .ports
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::Port, id))
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>> {
        self.check_failure("list_ports")?;
        Ok(self
            .tables
            .read()
            .await
            .ports
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn update_port(&self, id: Uuid, patch: PortUpdate) -> Result<Port> {
        self.check_failure("update_port")?;
        let mut tables = self.tables.write().await;
        let port = tables
            .ports
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| missing(ResourceKind::Port, id))?;
        patch.apply_to(port);
        Ok(port.clone())
    }

    async fn delete_port(&self, id: Uuid) -> Result<()> {
        self.check_failure("delete_port")?;
        let mut tables = self.tables.write().await;
        let before = tables.ports.len();
        tables.ports.retain(|p| p.id != id);
        if tables.ports.len() == before {
            return Err(missing(ResourceKind::Port, id));
        }
        Ok(())
    }
}

#[async_trait]
impl AliasStore for MemoryStore {
    async fn create_alias(&self, req: CreatePortAlias) -> Result<PortAlias> {
        self.check_failure("create_alias")?;
        let alias = PortAlias {
            id: Uuid::new_v4(),
            tenant_id: req.tenant_id,
            name: req.name,
            protocol: req.protocol,
            port: req.port,
        };
        self.tables.write().await.aliases.push(alias.clone());
        Ok(alias)
    }

    async fn get_alias(&self, id: Uuid) -> Result<PortAlias> {
        self.check_failure("get_alias")?;
        self.tables
            .read()
            .await
            .aliases
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| missing(ResourceKind::PortAlias, id))
    }

    async fn list_aliases(
        &self,
        tenant_id: Option<&str>,
        filter: &PortAliasFilter,
    ) -> Result<Vec<PortAlias>> {
        self.check_failure("list_aliases")?;
        Ok(self
            .tables
            .read()
            .await
            .aliases
            .iter()
            .filter(|a| tenant_id.map_or(true, |t| a.tenant_id == t))
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn update_alias(&self, id: Uuid, patch: PortAliasUpdate) -> Result<PortAlias> {
        self.check_failure("update_alias")?;
        let mut tables = self.tables.write().await;
        let alias = tables
            .aliases
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| missing(ResourceKind::PortAlias, id))?;
        patch.apply_to(alias);
        Ok(alias.clone())
    }

    async fn delete_alias(&self, id: Uuid) -> Result<()> {
        self.check_failure("delete_alias")?;
        let mut tables = self.tables.write().await;
        let before = tables.aliases.len();
        tables.aliases.retain(|a| a.id != id);
        if tables.aliases.len() == before {
            return Err(missing(ResourceKind::PortAlias, id));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaDriver for MemoryStore {
    async fn reserve(&self, tenant_id: &str, resource: &str, count: u32) -> Result<Reservation> {
        self.check_failure("reserve")?;
        let mut usage = self.usage.write().await;
        let used = usage
            .entry((tenant_id.to_string(), resource.to_string()))
            .or_insert(0);

        if let Some(limit) = self.limits.get(resource) {
            if used.saturating_add(count) > *limit {
                return Err(Error::QuotaExceeded {
                    tenant: tenant_id.to_string(),
                    resource: resource.to_string(),
                });
            }
        }

        *used = used.saturating_add(count);
        Ok(Reservation::new(tenant_id, resource, count))
    }

    async fn release(&self, reservation: Reservation) -> Result<()> {
        self.check_failure("release")?;
        let mut usage = self.usage.write().await;
        if let Some(used) = usage.get_mut(&(reservation.tenant_id, reservation.resource)) {
            *used = used.saturating_sub(reservation.count);
        }
        Ok(())
    }
}
