//! Lifecycle hook points

use std::sync::Arc;

use netrec_addressing::check_subnet_cidr;
use netrec_core::*;
use netrec_portalias::PortAliasRegistry;
use netrec_reconciler::{ReconcileReport, Reconciler};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{HookHandler, LifecycleEvent};
use crate::presentation::{present_port, RouterSyncData};

/// A committed resource together with the reconciliation it triggered
#[derive(Debug, Clone, Serialize)]
pub struct HookOutcome<T> {
    pub resource: T,
    pub reports: Vec<ReconcileReport>,
}

/// Wraps the delegate store's lifecycle operations with reconciliation
pub struct LifecycleHooks {
    store: Arc<dyn ResourceStore>,
    reconciler: Arc<Reconciler>,
    aliases: Arc<PortAliasRegistry>,
    hooks: Arc<RwLock<Vec<HookHandler>>>,
}

impl LifecycleHooks {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        reconciler: Arc<Reconciler>,
        aliases: Arc<PortAliasRegistry>,
    ) -> Self {
        Self {
            store,
            reconciler,
            aliases,
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Build the full stack over one backend implementing every collaborator
    pub fn from_backend<S>(backend: Arc<S>, config: ReconcilerConfig) -> Result<Self>
    where
        S: ResourceStore + AliasStore + QuotaDriver + 'static,
    {
        let aliases = Arc::new(PortAliasRegistry::new(
            backend.clone(),
            backend.clone(),
            config.platform_tenant.clone(),
        ));
        let reconciler = Arc::new(Reconciler::with_default_policy(backend.clone(), config)?);
        Ok(Self::new(backend, reconciler, aliases))
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn aliases(&self) -> &Arc<PortAliasRegistry> {
        &self.aliases
    }

    /// Register a hook for lifecycle events
    pub async fn register_hook(&self, handler: HookHandler) {
        let mut hooks = self.hooks.write().await;
        hooks.push(handler);
    }

    /// Emit an event to all hooks
    async fn emit_event(&self, event: LifecycleEvent) {
        let hooks = self.hooks.read().await;
        for hook in hooks.iter() {
            if let Err(e) = hook(&event) {
                warn!("Hook error on {}: {}", event.name(), e);
            }
        }
    }

    /// Record the outcome of one reconciliation step
    async fn settle(
        &self,
        kind: ResourceKind,
        id: Uuid,
        result: Result<ReconcileReport>,
    ) -> Result<ReconcileReport> {
        match result {
            Ok(report) => {
                self.emit_event(LifecycleEvent::Reconciled {
                    report: report.clone(),
                })
                .await;
                Ok(report)
            }
            Err(e) => {
                warn!("Reconciliation of {} {} failed: {}", kind, id, e);
                self.emit_event(LifecycleEvent::ReconcileFailed {
                    kind,
                    id,
                    error: e.to_string(),
                })
                .await;
                Err(Error::reconciliation(kind.to_string(), id, e))
            }
        }
    }

    pub async fn create_network(
        &self,
        ctx: &RequestContext,
        req: CreateNetwork,
    ) -> Result<HookOutcome<Network>> {
        let network = self.store.create_network(req).await?;
        info!("Network {} created for tenant {}", network.id, network.tenant_id);
        self.emit_event(LifecycleEvent::NetworkCreated {
            network: network.clone(),
        })
        .await;

        let mut reports = Vec::new();
        let result = self.reconciler.on_network_created(ctx, &network).await;
        reports.push(self.settle(ResourceKind::Network, network.id, result).await?);

        if self.reconciler.config().auto_add_resources && !ctx.is_admin {
            let result = self.seed_system_aliases(network.id).await;
            reports.push(self.settle(ResourceKind::Network, network.id, result).await?);
        }

        Ok(HookOutcome {
            resource: network,
            reports,
        })
    }

    async fn seed_system_aliases(&self, network_id: Uuid) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::new("system_aliases", ResourceKind::Network, network_id);
        let created = self.aliases.ensure_system_aliases().await?;
        if created.is_empty() {
            report.noop(ResourceKind::PortAlias, None, "system port aliases present");
        }
        for alias in created {
            report.created(ResourceKind::PortAlias, alias.id, format!("system alias '{}'", alias.name));
        }
        Ok(report)
    }

    /// Non-admin requests are held to the tenant subnet size policy before
    /// anything is written.
    pub async fn create_subnet(
        &self,
        ctx: &RequestContext,
        req: CreateSubnet,
    ) -> Result<HookOutcome<Subnet>> {
        if !ctx.is_admin {
            check_subnet_cidr(&req.cidr)?;
        }

        let subnet = self.store.create_subnet(req).await?;
        info!("Subnet {} ({}) created on network {}", subnet.id, subnet.cidr, subnet.network_id);
        self.emit_event(LifecycleEvent::SubnetCreated {
            subnet: subnet.clone(),
        })
        .await;

        let result = self.reconciler.on_subnet_created(ctx, &subnet).await;
        let report = self.settle(ResourceKind::Subnet, subnet.id, result).await?;
        Ok(HookOutcome {
            resource: subnet,
            reports: vec![report],
        })
    }

    pub async fn update_subnet(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        patch: SubnetUpdate,
    ) -> Result<HookOutcome<Subnet>> {
        let previous_gateway_ip = self.store.get_subnet(id).await?.gateway_ip;
        let subnet = self.store.update_subnet(id, patch).await?;
        debug!(
            "Subnet {} gateway {:?} -> {:?}",
            subnet.id, previous_gateway_ip, subnet.gateway_ip
        );
        self.emit_event(LifecycleEvent::SubnetUpdated {
            subnet: subnet.clone(),
            previous_gateway_ip,
        })
        .await;

        let result = self
            .reconciler
            .on_subnet_updated(ctx, &subnet, previous_gateway_ip)
            .await;
        let report = self.settle(ResourceKind::Subnet, subnet.id, result).await?;
        Ok(HookOutcome {
            resource: subnet,
            reports: vec![report],
        })
    }

    /// Returns the port as stored after reconciliation, presented
    pub async fn create_port(
        &self,
        ctx: &RequestContext,
        req: CreatePort,
    ) -> Result<HookOutcome<Port>> {
        let port = self.store.create_port(req).await?;
        info!("Port {} created on network {}", port.id, port.network_id);
        self.emit_event(LifecycleEvent::PortCreated { port: port.clone() })
            .await;

        let result = self.reconciler.on_port_created(ctx, &port).await;
        let report = self.settle(ResourceKind::Port, port.id, result).await?;

        let port = self
            .store
            .get_port(port.id)
            .await
            .map_err(|e| Error::reconciliation(ResourceKind::Port.to_string(), port.id, e))?;
        Ok(HookOutcome {
            resource: self.present(port),
            reports: vec![report],
        })
    }

    pub async fn delete_port(&self, _ctx: &RequestContext, id: Uuid) -> Result<()> {
        self.store.delete_port(id).await?;
        info!("Port {} deleted", id);
        self.emit_event(LifecycleEvent::PortDeleted { port_id: id })
            .await;
        Ok(())
    }

    pub async fn get_port(&self, _ctx: &RequestContext, id: Uuid) -> Result<Port> {
        let port = self.store.get_port(id).await?;
        Ok(self.present(port))
    }

    pub async fn list_ports(&self, _ctx: &RequestContext, filter: &PortFilter) -> Result<Vec<Port>> {
        let ports = self.store.list_ports(filter).await?;
        Ok(ports.into_iter().map(|p| self.present(p)).collect())
    }

    /// Routers visible to the caller with their interface ports. Admins see
    /// every tenant's routers.
    pub async fn sync_routers(
        &self,
        ctx: &RequestContext,
        router_ids: Option<Vec<Uuid>>,
    ) -> Result<Vec<RouterSyncData>> {
        let filter = RouterFilter {
            tenant_id: (!ctx.is_admin).then(|| ctx.tenant_id.clone()),
            ids: router_ids,
        };

        let mut data = Vec::new();
        for router in self.store.list_routers(&filter).await? {
            let interfaces = self
                .store
                .list_ports(&PortFilter::router_interfaces(router.id))
                .await?
                .into_iter()
                .map(|p| self.present(p))
                .collect();
            data.push(RouterSyncData { router, interfaces });
        }
        debug!("Synced {} routers for tenant {}", data.len(), ctx.tenant_id);
        Ok(data)
    }

    fn present(&self, port: Port) -> Port {
        present_port(self.reconciler.policy().as_ref(), port)
    }
}
