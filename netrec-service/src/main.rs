//! netrec replay service
//!
//! Replays a JSON file of lifecycle requests through the interception layer
//! backed by the in-memory store, printing one JSON line per step.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use netrec_core::{ReconcilerConfig, PORTALIAS_RESOURCE};
use netrec_hooks::{LifecycleEvent, LifecycleHooks};
use netrec_store::MemoryStore;

mod replay;

use replay::{ReplayFile, Replayer};

#[derive(Parser, Debug)]
#[command(name = "netrec-replay")]
#[command(about = "Replay network lifecycle requests through the reconciliation core")]
struct Args {
    /// Replay file (JSON)
    path: PathBuf,

    /// Continue after a failed step
    #[arg(long)]
    keep_going: bool,

    /// Also print lifecycle events as they are emitted
    #[arg(long)]
    events: bool,

    /// Pretty-print step results
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from /etc/netrec/environment (if exists)
    netrec_core::config::load_environment();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("netrec_service=info".parse()?)
                .add_directive("netrec_hooks=info".parse()?)
                .add_directive("netrec_reconciler=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let content = std::fs::read_to_string(&args.path)
        .with_context(|| format!("reading replay file {}", args.path.display()))?;
    let file: ReplayFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing replay file {}", args.path.display()))?;

    let config = match file.config.clone() {
        Some(config) => config,
        None => ReconcilerConfig::from_env()?,
    };
    config.validate()?;
    info!(
        "Replaying {} steps (IPv6 range {}, /{})",
        file.steps.len(),
        config.ipv6_tenant_range,
        config.ipv6_prefix_length
    );

    let store =
        Arc::new(MemoryStore::new().with_quota_limit(PORTALIAS_RESOURCE, config.portalias_quota));
    let hooks = LifecycleHooks::from_backend(store, config)?;

    if args.events {
        hooks
            .register_hook(Arc::new(|event: &LifecycleEvent| -> anyhow::Result<()> {
                eprintln!("{}", serde_json::to_string(event)?);
                Ok(())
            }))
            .await;
    }

    let mut replayer = Replayer::new(hooks);
    let mut failed = 0;
    for (index, raw) in file.steps.into_iter().enumerate() {
        let outcome = replayer.run(index, raw).await;
        if outcome.error.is_some() {
            failed += 1;
        }

        let line = if args.pretty {
            serde_json::to_string_pretty(&outcome)?
        } else {
            serde_json::to_string(&outcome)?
        };
        println!("{line}");

        if let Some(err) = &outcome.error {
            error!("Step {} ({}) failed: {}", index, outcome.op, err);
            if !args.keep_going {
                anyhow::bail!("replay stopped at step {index}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} steps failed");
    }
    info!("Replay complete");
    Ok(())
}
