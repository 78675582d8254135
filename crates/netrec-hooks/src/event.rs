//! Lifecycle events delivered to registered hook handlers

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use netrec_core::{Network, Port, ResourceKind, Subnet};
use netrec_reconciler::ReconcileReport;
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    NetworkCreated {
        network: Network,
    },
    SubnetCreated {
        subnet: Subnet,
    },
    SubnetUpdated {
        subnet: Subnet,
        previous_gateway_ip: Option<IpAddr>,
    },
    PortCreated {
        port: Port,
    },
    PortDeleted {
        port_id: Uuid,
    },
    Reconciled {
        report: ReconcileReport,
    },
    ReconcileFailed {
        kind: ResourceKind,
        id: Uuid,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::NetworkCreated { .. } => "network_created",
            LifecycleEvent::SubnetCreated { .. } => "subnet_created",
            LifecycleEvent::SubnetUpdated { .. } => "subnet_updated",
            LifecycleEvent::PortCreated { .. } => "port_created",
            LifecycleEvent::PortDeleted { .. } => "port_deleted",
            LifecycleEvent::Reconciled { .. } => "reconciled",
            LifecycleEvent::ReconcileFailed { .. } => "reconcile_failed",
        }
    }
}

/// Hook handler type
pub type HookHandler = Arc<dyn Fn(&LifecycleEvent) -> Result<()> + Send + Sync>;
