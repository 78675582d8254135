//! Resource model shared by the reconciliation crates
//!
//! These types mirror what the external store hands out. The core reads and
//! augments them but never owns their persistence.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// Opaque tenant identifier
pub type TenantId = String;

/// Subnet id used for addresses that do not belong to any stored subnet
pub const ZERO_SUBNET_ID: Uuid = Uuid::nil();

/// Caller identity for a single lifecycle request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub is_admin: bool,
}

impl RequestContext {
    /// Context for a regular tenant request
    pub fn tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            is_admin: false,
        }
    }

    /// Context for an administrative request
    pub fn admin(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            is_admin: true,
        }
    }

    /// Same tenant, with admin rights
    pub fn elevated(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            is_admin: true,
        }
    }

    /// Whether this caller may act on resources owned by `owner`
    pub fn owns(&self, owner: &str) -> bool {
        self.is_admin || self.tenant_id == owner
    }
}

/// Resource kinds, used in reports, events and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    Router,
    RouterInterface,
    Port,
    PortAlias,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::Router => "router",
            Self::RouterInterface => "router_interface",
            Self::Port => "port",
            Self::PortAlias => "portalias",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

// ============================================================================
// Networks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    /// Provider/external networks never get tenant IPv6 subnets
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub subnets: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetwork {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkFilter {
    pub tenant_id: Option<TenantId>,
}

impl NetworkFilter {
    pub fn matches(&self, network: &Network) -> bool {
        self.tenant_id
            .as_ref()
            .map_or(true, |t| &network.tenant_id == t)
    }
}

// ============================================================================
// Subnets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ipv6AddressMode {
    Slaac,
    Dhcpv6Stateful,
    Dhcpv6Stateless,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: Uuid,
    pub network_id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    pub cidr: IpNetwork,
    pub gateway_ip: Option<IpAddr>,
    #[serde(default = "default_true")]
    pub enable_dhcp: bool,
    #[serde(default)]
    pub ipv6_address_mode: Option<Ipv6AddressMode>,
}

impl Subnet {
    pub fn ip_version(&self) -> IpVersion {
        IpVersion::of(&self.cidr.ip())
    }

    pub fn is_ipv4(&self) -> bool {
        self.ip_version() == IpVersion::V4
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip_version() == IpVersion::V6
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubnet {
    pub network_id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    pub cidr: IpNetwork,
    #[serde(default)]
    pub gateway_ip: Option<IpAddr>,
    #[serde(default = "default_true")]
    pub enable_dhcp: bool,
    #[serde(default)]
    pub ipv6_address_mode: Option<Ipv6AddressMode>,
}

/// Partial subnet update. `gateway_ip: Some(None)` clears the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub gateway_ip: Option<Option<IpAddr>>,
    #[serde(default)]
    pub enable_dhcp: Option<bool>,
}

impl SubnetUpdate {
    pub fn gateway(gateway_ip: Option<IpAddr>) -> Self {
        Self {
            gateway_ip: Some(gateway_ip),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, subnet: &mut Subnet) {
        if let Some(name) = &self.name {
            subnet.name = name.clone();
        }
        if let Some(gateway_ip) = self.gateway_ip {
            subnet.gateway_ip = gateway_ip;
        }
        if let Some(enable_dhcp) = self.enable_dhcp {
            subnet.enable_dhcp = enable_dhcp;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubnetFilter {
    pub network_id: Option<Uuid>,
    pub cidr: Option<IpNetwork>,
    pub tenant_id: Option<TenantId>,
}

impl SubnetFilter {
    pub fn network(network_id: Uuid) -> Self {
        Self {
            network_id: Some(network_id),
            ..Default::default()
        }
    }

    pub fn cidr(cidr: IpNetwork) -> Self {
        Self {
            cidr: Some(cidr),
            ..Default::default()
        }
    }

    pub fn matches(&self, subnet: &Subnet) -> bool {
        self.network_id.map_or(true, |n| subnet.network_id == n)
            && self.cidr.map_or(true, |c| subnet.cidr == c)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |t| &subnet.tenant_id == t)
    }
}

// ============================================================================
// Routers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRouter {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterFilter {
    pub tenant_id: Option<TenantId>,
    pub ids: Option<Vec<Uuid>>,
}

impl RouterFilter {
    pub fn tenant(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ids: None,
        }
    }

    pub fn matches(&self, router: &Router) -> bool {
        self.tenant_id
            .as_ref()
            .map_or(true, |t| &router.tenant_id == t)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&router.id))
    }
}

// ============================================================================
// Ports
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOwner {
    #[default]
    None,
    Compute,
    RouterInterface,
    RouterGateway,
    FloatingIp,
    Dhcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: Uuid,
    pub ip_address: IpAddr,
}

impl FixedIp {
    pub fn new(subnet_id: Uuid, ip_address: IpAddr) -> Self {
        Self {
            subnet_id,
            ip_address,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressPair {
    pub mac_address: String,
    /// Host address or CIDR
    pub ip_address: IpNetwork,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: Uuid,
    pub network_id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub device_owner: DeviceOwner,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub allowed_address_pairs: Vec<AddressPair>,
    #[serde(default = "default_true")]
    pub port_security_enabled: bool,
}

impl Port {
    /// Fixed IP carried for `subnet_id`, if any
    pub fn fixed_ip_on(&self, subnet_id: Uuid) -> Option<&FixedIp> {
        self.fixed_ips.iter().find(|ip| ip.subnet_id == subnet_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePort {
    pub network_id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub device_owner: DeviceOwner,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub allowed_address_pairs: Vec<AddressPair>,
    #[serde(default = "default_true")]
    pub port_security_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fixed_ips: Option<Vec<FixedIp>>,
    #[serde(default)]
    pub allowed_address_pairs: Option<Vec<AddressPair>>,
}

impl PortUpdate {
    pub fn fixed_ips(fixed_ips: Vec<FixedIp>) -> Self {
        Self {
            fixed_ips: Some(fixed_ips),
            ..Default::default()
        }
    }

    pub fn allowed_address_pairs(pairs: Vec<AddressPair>) -> Self {
        Self {
            allowed_address_pairs: Some(pairs),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, port: &mut Port) {
        if let Some(name) = &self.name {
            port.name = name.clone();
        }
        if let Some(fixed_ips) = &self.fixed_ips {
            port.fixed_ips = fixed_ips.clone();
        }
        if let Some(pairs) = &self.allowed_address_pairs {
            port.allowed_address_pairs = pairs.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortFilter {
    pub network_id: Option<Uuid>,
    pub device_owner: Option<DeviceOwner>,
    pub device_id: Option<String>,
    pub tenant_id: Option<TenantId>,
}

impl PortFilter {
    /// Interface ports of one router
    pub fn router_interfaces(router_id: Uuid) -> Self {
        Self {
            device_owner: Some(DeviceOwner::RouterInterface),
            device_id: Some(router_id.to_string()),
            ..Default::default()
        }
    }

    pub fn on_network(mut self, network_id: Uuid) -> Self {
        self.network_id = Some(network_id);
        self
    }

    pub fn matches(&self, port: &Port) -> bool {
        self.network_id.map_or(true, |n| port.network_id == n)
            && self.device_owner.map_or(true, |o| port.device_owner == o)
            && self
                .device_id
                .as_ref()
                .map_or(true, |d| &port.device_id == d)
            && self
                .tenant_id
                .as_ref()
                .map_or(true, |t| &port.tenant_id == t)
    }
}

// ============================================================================
// Port aliases
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAlias {
    pub id: Uuid,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    pub protocol: String,
    pub port: u16,
}

impl PortAlias {
    /// Port `0` marks a system wildcard alias
    pub fn is_system(&self) -> bool {
        self.port == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePortAlias {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    pub protocol: String,
    pub port: u16,
}

/// Mutable port alias attributes. `id` and `tenant_id` are immutable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortAliasUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl PortAliasUpdate {
    pub fn apply_to(&self, alias: &mut PortAlias) {
        if let Some(name) = &self.name {
            alias.name = name.clone();
        }
        if let Some(protocol) = &self.protocol {
            alias.protocol = protocol.clone();
        }
        if let Some(port) = self.port {
            alias.port = port;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortAliasFilter {
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<u16>,
}

impl PortAliasFilter {
    pub fn matches(&self, alias: &PortAlias) -> bool {
        self.name.as_ref().map_or(true, |n| &alias.name == n)
            && self.protocol.as_ref().map_or(true, |p| &alias.protocol == p)
            && self.port.map_or(true, |p| alias.port == p)
    }
}

fn default_true() -> bool {
    true
}

/// Distinguishes an absent field from an explicit `null`
fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
