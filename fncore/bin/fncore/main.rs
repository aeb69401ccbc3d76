use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use fncore::{
    cli::{FncoreArgs, FncoreSubcommand},
    config::FncoreConfig,
    coordinator::{run_worker, NoSecrets, TaskCoordinator, TaskQueue},
    gateway::InvocationGateway,
    orchestrator::{cluster_client, KubernetesOrchestrator},
    scheduler::TriggerScheduler,
    store::db,
    FncoreResult,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How often the scheduler self-heals against store drift.
const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> FncoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = FncoreArgs::parse();
    match args.subcommand {
        FncoreSubcommand::Serve { config } => serve(load_config(config).await?).await,
        FncoreSubcommand::Init { config } => init(load_config(config).await?).await,
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

async fn load_config(path: Option<PathBuf>) -> FncoreResult<FncoreConfig> {
    match path {
        Some(path) => FncoreConfig::load(path).await,
        None => Ok(FncoreConfig::default()),
    }
}

async fn init(config: FncoreConfig) -> FncoreResult<()> {
    let (client, _) = cluster_client().await?;
    let orchestrator =
        KubernetesOrchestrator::new(client, config.get_namespace().clone(), config.registry());
    orchestrator.initialize().await
}

async fn serve(config: FncoreConfig) -> FncoreResult<()> {
    let pool = db::get_or_create_db_pool(config.get_db_path(), &db::MIGRATOR).await?;

    let (client, in_cluster) = cluster_client().await?;
    let orchestrator = Arc::new(KubernetesOrchestrator::new(
        client,
        config.get_namespace().clone(),
        config.registry(),
    ));
    let gateway = Arc::new(InvocationGateway::new(&config, in_cluster));

    let coordinator = Arc::new(TaskCoordinator::new(
        pool.clone(),
        orchestrator,
        gateway,
        Arc::new(NoSecrets),
        &config,
    ));

    let (queue, rx) = TaskQueue::channel();
    let scheduler = Arc::new(TriggerScheduler::new(pool, queue));

    // Pick up whatever trigger state the store already holds.
    scheduler.reconcile_all().await?;

    let worker = tokio::spawn(run_worker(coordinator, rx));

    let reconciler = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = scheduler.reconcile_all().await {
                    tracing::error!("trigger reconciliation failed: {}", e);
                }
            }
        })
    };

    tracing::info!(
        "control plane running (namespace: {}, mode: {})",
        config.get_namespace(),
        if in_cluster { "in-cluster" } else { "local" }
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
    }

    tracing::info!("shutting down control plane");
    scheduler.shutdown().await;
    reconciler.abort();
    worker.abort();

    Ok(())
}
