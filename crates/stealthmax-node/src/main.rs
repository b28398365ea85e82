//! # stealthmax-node
//!
//! One process running the HTTP API, the block watcher and the settlement
//! orchestrator against either the live registry, rollup gateway and RPC
//! endpoint, or (`--simulate`) their in-memory counterparts.

mod args;
mod logging;

use std::process::exit;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use stealthmax_api::AppState;
use stealthmax_directory::{
    InMemoryRegistry, NameDirectory, NameRegistry, NamestoneClient, RegistrationService,
    RegistryDirectory,
};
use stealthmax_keys::{KeyDeriver, MasterSecret};
use stealthmax_settlement::{GatewayConnector, RollupConnector, SettlementOrchestrator, SimulatedRollup};
use stealthmax_types::{Secrets, ServiceConfig, constants};
use stealthmax_watcher::{
    AddressBook, BlockWatcher, ChainSource, JsonRpcChainSource, ScriptedChain, Supervisor,
    SupervisorExit, spawn_refresher,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::args::Args;

/// The three outbound adapters a node runs against.
struct Adapters<R> {
    registry: Arc<R>,
    rollup: Arc<dyn RollupConnector>,
    chain: Arc<dyn ChainSource>,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; values may come from the real environment.
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    logging::init(args.log_json);
    match dotenv {
        Err(err) if !err.not_found() => warn!(error = %err, "Could not read .env"),
        _ => {}
    }

    if let Err(err) = start(args).await {
        error!(error = ?err, "Node stopped with an error");
        exit(1);
    }
}

async fn start(args: Args) -> anyhow::Result<()> {
    let config = args.service_config();
    config.validate().context("invalid configuration")?;
    let secrets = Secrets::from_lookup(|var| std::env::var(var).ok());
    info!(
        service = constants::SERVICE_NAME,
        version = constants::VERSION,
        domain = %config.domain,
        network = %config.network_name,
        simulate = args.simulate,
        secrets = ?secrets,
        "Starting node"
    );

    if args.simulate {
        let keys = match secrets.private_key.as_deref() {
            Some(hex) => KeyDeriver::from_hex(hex).context("PRIVATE_KEY")?,
            None => {
                warn!("PRIVATE_KEY not set, using a throwaway secret for this run");
                KeyDeriver::new(MasterSecret::new(rand::random()))
            }
        };
        let adapters = Adapters {
            registry: Arc::new(InMemoryRegistry::new()),
            rollup: Arc::new(SimulatedRollup::new()),
            chain: Arc::new(ScriptedChain::new()),
        };
        run(config, keys, adapters).await
    } else {
        let keys = KeyDeriver::from_hex(secrets.require_private_key()?).context("PRIVATE_KEY")?;
        let registry = NamestoneClient::new(
            config.registry_url.clone(),
            secrets.require_registry_api_key()?,
            config.request_timeout,
        )?;
        let rollup = GatewayConnector::new(config.rollup_gateway_url.clone(), config.request_timeout)?;
        let chain = JsonRpcChainSource::new(config.resolve_rpc_url(&secrets)?, config.request_timeout)?;
        let adapters = Adapters {
            registry: Arc::new(registry),
            rollup: Arc::new(rollup),
            chain: Arc::new(chain),
        };
        run(config, keys, adapters).await
    }
}

async fn run<R: NameRegistry + 'static>(
    config: ServiceConfig,
    keys: KeyDeriver,
    adapters: Adapters<R>,
) -> anyhow::Result<()> {
    let master = keys.master()?;
    info!(master = %master.address(), "Master identity loaded");

    let registry_directory = Arc::new(RegistryDirectory::new(
        adapters.registry,
        config.domain.clone(),
    ));
    let directory: Arc<dyn NameDirectory> = registry_directory.clone();
    let registration = Arc::new(RegistrationService::new(
        registry_directory,
        keys.clone(),
        config.clone(),
    ));
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        keys,
        directory.clone(),
        adapters.rollup,
        config.settlement.clone(),
    ));

    let book = AddressBook::new();
    match book.refresh(directory.as_ref()).await {
        Ok(count) => info!(count, "Loaded monitored addresses"),
        Err(err) => warn!(error = %err, "Initial address refresh failed, starting with an empty set"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresher = spawn_refresher(
        book.clone(),
        directory,
        config.watcher.refresh_interval,
        shutdown_rx.clone(),
    );

    let mut watcher = BlockWatcher::new(
        adapters.chain,
        book.clone(),
        orchestrator.clone(),
        config.watcher.clone(),
    );
    let supervisor = Supervisor::new(&config.watcher);
    let watch_shutdown = shutdown_rx.clone();
    let watcher_task = tokio::spawn(async move {
        let outcome = supervisor.run(&mut watcher, watch_shutdown).await;
        let stats = watcher.stats();
        info!(
            blocks = stats.blocks_scanned,
            matched = stats.transfers_matched,
            settled = stats.transfers_settled,
            replays = stats.replays_skipped,
            "Block watcher stopped"
        );
        outcome
    });

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    let router = stealthmax_api::router(AppState::new(registration, orchestrator, book, config));
    let server = tokio::spawn(stealthmax_api::serve(listener, router, shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(err) => error!(error = %err, "Could not listen for Ctrl-C, shutting down"),
    }
    // Receivers may already be gone if a task exited early.
    let _ = shutdown_tx.send(true);

    if let SupervisorExit::GaveUp { failures, last_error } = watcher_task.await? {
        error!(failures, %last_error, "Block watcher gave up before shutdown");
    }
    refresher.await?;
    server.await??;
    info!("Shutdown complete");
    Ok(())
}
