//! Replay file format and step execution
//!
//! A step is a JSON object with an `op`, a request context `ctx`, the
//! operation's arguments and an optional `as` name. Any string argument of
//! the form `@name` is replaced with the id produced by the step named
//! `name`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use netrec_core::*;
use netrec_hooks::LifecycleHooks;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ReplayFile {
    /// Overrides the environment-derived configuration when present
    #[serde(default)]
    pub config: Option<ReconcilerConfig>,
    pub steps: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default, rename = "as")]
    name: Option<String>,
    ctx: RequestContext,
    #[serde(flatten)]
    step: Step,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    CreateNetwork {
        request: CreateNetwork,
    },
    CreateSubnet {
        request: CreateSubnet,
    },
    UpdateSubnet {
        id: Uuid,
        patch: SubnetUpdate,
    },
    CreatePort {
        request: CreatePort,
    },
    GetPort {
        id: Uuid,
    },
    DeletePort {
        id: Uuid,
    },
    SyncRouters {
        #[serde(default)]
        router_ids: Option<Vec<Uuid>>,
    },
    CreatePortAlias {
        request: CreatePortAlias,
    },
    UpdatePortAlias {
        id: Uuid,
        patch: PortAliasUpdate,
    },
    DeletePortAlias {
        id: Uuid,
    },
    ListPortAliases {
        #[serde(default)]
        filter: PortAliasFilter,
    },
}

/// Printed once per step
#[derive(Debug, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Replayer {
    hooks: LifecycleHooks,
    names: HashMap<String, Uuid>,
}

impl Replayer {
    pub fn new(hooks: LifecycleHooks) -> Self {
        Self {
            hooks,
            names: HashMap::new(),
        }
    }

    pub async fn run(&mut self, index: usize, raw: Value) -> StepOutcome {
        let op = raw
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        match self.execute(raw).await {
            Ok((id, result)) => StepOutcome {
                step: index,
                op,
                id,
                result: Some(result),
                error: None,
            },
            Err(e) => StepOutcome {
                step: index,
                op,
                id: None,
                result: None,
                error: Some(format!("{e:#}")),
            },
        }
    }

    async fn execute(&mut self, raw: Value) -> Result<(Option<Uuid>, Value)> {
        let entry: Entry =
            serde_json::from_value(self.resolve(raw)?).context("invalid replay step")?;
        let ctx = &entry.ctx;
        let hooks = &self.hooks;

        let (id, result) = match entry.step {
            Step::CreateNetwork { request } => {
                let outcome = hooks.create_network(ctx, request).await?;
                (Some(outcome.resource.id), serde_json::to_value(&outcome)?)
            }
            Step::CreateSubnet { request } => {
                let outcome = hooks.create_subnet(ctx, request).await?;
                (Some(outcome.resource.id), serde_json::to_value(&outcome)?)
            }
            Step::UpdateSubnet { id, patch } => {
                let outcome = hooks.update_subnet(ctx, id, patch).await?;
                (Some(id), serde_json::to_value(&outcome)?)
            }
            Step::CreatePort { request } => {
                let outcome = hooks.create_port(ctx, request).await?;
                (Some(outcome.resource.id), serde_json::to_value(&outcome)?)
            }
            Step::GetPort { id } => (Some(id), serde_json::to_value(hooks.get_port(ctx, id).await?)?),
            Step::DeletePort { id } => {
                hooks.delete_port(ctx, id).await?;
                (Some(id), Value::Null)
            }
            Step::SyncRouters { router_ids } => {
                (None, serde_json::to_value(hooks.sync_routers(ctx, router_ids).await?)?)
            }
            Step::CreatePortAlias { request } => {
                let alias = hooks.aliases().create(ctx, request).await?;
                (Some(alias.id), serde_json::to_value(&alias)?)
            }
            Step::UpdatePortAlias { id, patch } => {
                let alias = hooks.aliases().update(ctx, id, patch).await?;
                (Some(id), serde_json::to_value(&alias)?)
            }
            Step::DeletePortAlias { id } => {
                hooks.aliases().delete(ctx, id).await?;
                (Some(id), Value::Null)
            }
            Step::ListPortAliases { filter } => {
                (None, serde_json::to_value(hooks.aliases().list(ctx, &filter).await?)?)
            }
        };

        if let (Some(name), Some(id)) = (entry.name, id) {
            self.names.insert(name, id);
        }
        Ok((id, result))
    }

    /// Substitute `@name` references with recorded ids
    fn resolve(&self, value: Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => match s.strip_prefix('@') {
                Some(name) => {
                    let id = self
                        .names
                        .get(name)
                        .with_context(|| format!("unknown reference @{name}"))?;
                    Value::String(id.to_string())
                }
                None => Value::String(s),
            },
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| self.resolve(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, self.resolve(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => other,
        })
    }
}
