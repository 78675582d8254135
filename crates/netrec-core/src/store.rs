//! Collaborator contracts
//!
//! The external store is the single source of truth. Backend adapters
//! implement these traits; the reconciler and the alias registry depend only
//! on them. Implementations must report an already-existing resource as
//! [`Error::Conflict`](crate::Error::Conflict), distinct from other failures.

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Quota resource name consumed by port alias creation
pub const PORTALIAS_RESOURCE: &str = "portalias";

/// Network, subnet, router and port CRUD
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_network(&self, req: CreateNetwork) -> Result<Network>;
    async fn get_network(&self, id: Uuid) -> Result<Network>;
    async fn list_networks(&self, filter: &NetworkFilter) -> Result<Vec<Network>>;

    async fn create_subnet(&self, req: CreateSubnet) -> Result<Subnet>;
    async fn get_subnet(&self, id: Uuid) -> Result<Subnet>;
    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>>;
    async fn update_subnet(&self, id: Uuid, patch: SubnetUpdate) -> Result<Subnet>;

    async fn create_router(&self, req: CreateRouter) -> Result<Router>;
    async fn get_router(&self, id: Uuid) -> Result<Router>;
    async fn list_routers(&self, filter: &RouterFilter) -> Result<Vec<Router>>;

    /// Attach `subnet_id` to `router_id`, returning the new interface port.
    /// Attaching a subnet twice is a conflict.
    async fn add_router_interface(&self, router_id: Uuid, subnet_id: Uuid) -> Result<Port>;

    async fn create_port(&self, req: CreatePort) -> Result<Port>;
    async fn get_port(&self, id: Uuid) -> Result<Port>;
    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>>;
    async fn update_port(&self, id: Uuid, patch: PortUpdate) -> Result<Port>;
    async fn delete_port(&self, id: Uuid) -> Result<()>;
}

/// Port alias persistence
#[async_trait]
pub trait AliasStore: Send + Sync {
    async fn create_alias(&self, req: CreatePortAlias) -> Result<PortAlias>;
    async fn get_alias(&self, id: Uuid) -> Result<PortAlias>;
    async fn list_aliases(&self, tenant_id: Option<&str>, filter: &PortAliasFilter) -> Result<Vec<PortAlias>>;
    async fn update_alias(&self, id: Uuid, patch: PortAliasUpdate) -> Result<PortAlias>;
    async fn delete_alias(&self, id: Uuid) -> Result<()>;
}

/// Units of a quota resource held by a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub tenant_id: TenantId,
    pub resource: String,
    pub count: u32,
}

impl Reservation {
    pub fn new(tenant_id: impl Into<TenantId>, resource: impl Into<String>, count: u32) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            resource: resource.into(),
            count,
        }
    }
}

/// Quota enforcement
#[async_trait]
pub trait QuotaDriver: Send + Sync {
    /// Check and consume `count` units atomically. Fails with
    /// [`Error::QuotaExceeded`](crate::Error::QuotaExceeded) when over limit.
    async fn reserve(&self, tenant_id: &str, resource: &str, count: u32) -> Result<Reservation>;

    /// Return previously consumed units
    async fn release(&self, reservation: Reservation) -> Result<()>;
}
