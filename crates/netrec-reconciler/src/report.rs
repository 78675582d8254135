//! Reconciliation reports and change tracking

use chrono::{DateTime, Utc};
use netrec_core::ResourceKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Create,
    Update,
    NoOp,
}

/// One corrective operation (or deliberate non-operation)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileAction {
    pub operation: ChangeOperation,
    pub kind: ResourceKind,
    pub id: Option<Uuid>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// What a single reconciliation call did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Lifecycle event that triggered the call (e.g. `subnet_created`)
    pub trigger: String,
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub actions: Vec<ReconcileAction>,
}

impl ReconcileReport {
    pub fn new(trigger: impl Into<String>, kind: ResourceKind, resource_id: Uuid) -> Self {
        Self {
            trigger: trigger.into(),
            kind,
            resource_id,
            actions: Vec::new(),
        }
    }

    fn record(
        &mut self,
        operation: ChangeOperation,
        kind: ResourceKind,
        id: Option<Uuid>,
        description: impl Into<String>,
    ) {
        self.actions.push(ReconcileAction {
            operation,
            kind,
            id,
            description: description.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn created(&mut self, kind: ResourceKind, id: Uuid, description: impl Into<String>) {
        self.record(ChangeOperation::Create, kind, Some(id), description);
    }

    pub fn updated(&mut self, kind: ResourceKind, id: Uuid, description: impl Into<String>) {
        self.record(ChangeOperation::Update, kind, Some(id), description);
    }

    pub fn noop(&mut self, kind: ResourceKind, id: Option<Uuid>, description: impl Into<String>) {
        self.record(ChangeOperation::NoOp, kind, id, description);
    }

    /// True when nothing was created or updated
    pub fn is_noop(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.operation == ChangeOperation::NoOp)
    }

    /// Number of actions of `operation` on resources of `kind`
    pub fn count(&self, operation: ChangeOperation, kind: ResourceKind) -> usize {
        self.actions
            .iter()
            .filter(|a| a.operation == operation && a.kind == kind)
            .count()
    }
}
