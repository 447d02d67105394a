// Copyright (c) 2025 xzzpig
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Namespace, Node, Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource, ResourceExt};
use kube_dns_manager::constants::{
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, ERROR_REQUEUE_DURATION_SECS,
    KIND_CLUSTER_GENERATOR, KIND_CLUSTER_PROVIDER, KIND_GENERATOR, KIND_PROVIDER, KIND_RECORD,
    KIND_RESOURCE_WATCHER, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH, METRICS_SERVER_PORT,
    TOKIO_WORKER_THREADS,
};
use kube_dns_manager::context::{Context, Stored, Stores};
use kube_dns_manager::crd::{
    ClusterGenerator, ClusterProvider, ClusterTemplate, Generator, GeneratorObject,
    GeneratorResourceKind, Provider, ProviderObject, Record, ResourceWatcher, Template,
    WatchedResource, WatchedResourceKind,
};
use kube_dns_manager::reconcilers::{
    emit_event, reconcile_generator, reconcile_provider, reconcile_record,
    reconcile_resourcewatcher, EVENT_TYPE_NORMAL,
};
use kube_dns_manager::{metrics, provider};
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("dns-manager")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level. Respects
/// `RUST_LOG_FORMAT` for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting kube-dns-manager");
}

/// Start the Prometheus metrics HTTP server.
fn start_metrics_server() -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = METRICS_SERVER_BIND_ADDRESS,
        port = METRICS_SERVER_PORT,
        path = METRICS_SERVER_PATH,
        "Starting Prometheus metrics HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(text) => text,
                Err(err) => {
                    error!("Failed to gather metrics: {err}");
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

        let bind_addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{METRICS_SERVER_PORT}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!("Failed to bind metrics server to {bind_addr}: {err}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_addr}{METRICS_SERVER_PATH}");

        if let Err(err) = axum::serve(listener, app).await {
            error!("Metrics server error: {err}");
        }
    })
}

/// Leader election configuration, environment-driven.
struct LeaderElectionConfig {
    enabled: bool,
    lease_name: String,
    lease_namespace: String,
    identity: String,
    lease_duration: u64,
    retry_period: u64,
}

fn load_leader_election_config() -> LeaderElectionConfig {
    let enabled = std::env::var("DNS_MANAGER_ENABLE_LEADER_ELECTION")
        .unwrap_or_else(|_| "true".to_string())
        .parse::<bool>()
        .unwrap_or(true);

    let lease_name = std::env::var("DNS_MANAGER_LEASE_NAME")
        .unwrap_or_else(|_| "kube-dns-manager-leader".to_string());

    let lease_namespace = std::env::var("DNS_MANAGER_LEASE_NAMESPACE")
        .or_else(|_| std::env::var("POD_NAMESPACE"))
        .unwrap_or_else(|_| "default".to_string());

    let lease_duration = std::env::var("DNS_MANAGER_LEASE_DURATION_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_DURATION_SECS);

    let retry_period = std::env::var("DNS_MANAGER_LEASE_RETRY_PERIOD_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_RETRY_PERIOD_SECS);

    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("dns-manager-{}", rand::random::<u32>()));

    LeaderElectionConfig {
        enabled,
        lease_name,
        lease_namespace,
        identity,
        lease_duration,
        retry_period,
    }
}

async fn async_main() -> Result<()> {
    initialize_logging();

    provider::register_builtin();

    let client = Client::try_default().await?;
    let _metrics_handle = start_metrics_server();

    let config = load_leader_election_config();

    if config.enabled {
        info!(
            lease_name = %config.lease_name,
            lease_namespace = %config.lease_namespace,
            identity = %config.identity,
            "Leader election enabled, waiting to acquire leadership..."
        );

        let lease_manager = LeaseManagerBuilder::new(client.clone(), &config.lease_name)
            .with_namespace(&config.lease_namespace)
            .with_identity(&config.identity)
            .with_duration(config.lease_duration)
            .with_grace(config.retry_period)
            .build()
            .await?;

        let (leader_rx, _lease_handle) = lease_manager.watch().await;

        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }

        info!("Leadership acquired, starting controllers");
        run_with_shutdown(client, Some(leader_rx)).await?;
    } else {
        warn!("Leader election DISABLED - running without high availability");
        run_with_shutdown(client, None).await?;
    }

    Ok(())
}

/// Monitor leadership status; returns when leadership is lost.
async fn monitor_leadership(mut leader_rx: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            return Ok(());
        }
    }
}

/// Run all controllers until a signal arrives or leadership is lost.
async fn run_with_shutdown(
    client: Client,
    leader_rx: Option<tokio::sync::watch::Receiver<bool>>,
) -> Result<()> {
    let stores = Stores::spawn(&client);
    info!("Waiting for reflector stores to sync");
    stores.wait_ready().await;

    let ctx = Arc::new(Context {
        client: client.clone(),
        stores,
    });

    let leadership = async {
        match leader_rx {
            Some(rx) => monitor_leadership(rx).await,
            // No leader election: never resolves.
            None => std::future::pending::<Result<()>>().await,
        }
    };

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        result = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                sigterm.recv().await;
                Ok::<(), anyhow::Error>(())
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
                Ok::<(), anyhow::Error>(())
            }
        } => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = leadership => {
            match result {
                Ok(()) => {
                    warn!("Leadership lost! Stopping all controllers...");
                    anyhow::bail!("leadership lost - stepping down")
                }
                Err(err) => {
                    error!("Leadership monitor error: {err:?}");
                    anyhow::bail!("leadership monitoring failed: {err}")
                }
            }
        }

        result = run_all_controllers(ctx) => {
            result
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");
    Ok(())
}

/// Run all six controllers; none of them should ever exit.
async fn run_all_controllers(ctx: Arc<Context>) -> Result<()> {
    tokio::select! {
        result = run_generator_controller::<Generator>(ctx.clone(), KIND_GENERATOR) => {
            error!("CRITICAL: Generator controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("Generator controller exited unexpectedly without error")
        }
        result = run_generator_controller::<ClusterGenerator>(ctx.clone(), KIND_CLUSTER_GENERATOR) => {
            error!("CRITICAL: ClusterGenerator controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("ClusterGenerator controller exited unexpectedly without error")
        }
        result = run_resourcewatcher_controller(ctx.clone()) => {
            error!("CRITICAL: ResourceWatcher controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("ResourceWatcher controller exited unexpectedly without error")
        }
        result = run_record_controller(ctx.clone()) => {
            error!("CRITICAL: Record controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("Record controller exited unexpectedly without error")
        }
        result = run_provider_controller::<Provider>(ctx.clone(), KIND_PROVIDER) => {
            error!("CRITICAL: Provider controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("Provider controller exited unexpectedly without error")
        }
        result = run_provider_controller::<ClusterProvider>(ctx.clone(), KIND_CLUSTER_PROVIDER) => {
            error!("CRITICAL: ClusterProvider controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("ClusterProvider controller exited unexpectedly without error")
        }
    }
}

/// Run the Generator or ClusterGenerator controller.
///
/// Source kinds (Ingress, Record) are watched and mapped back to the
/// generators selecting them via the `.spec.resourceKind` store lookup.
async fn run_generator_controller<G>(ctx: Arc<Context>, kind: &'static str) -> Result<()>
where
    G: GeneratorObject + Stored,
{
    info!("Starting {kind} controller");

    let api = G::api_scoped(ctx.client.clone(), None);
    let ingress_ctx = ctx.clone();
    let record_ctx = ctx.clone();

    Controller::new(api, watcher::Config::default())
        .watches(
            Api::<Ingress>::all(ctx.client.clone()),
            watcher::Config::default(),
            move |ingress: Ingress| {
                ingress_ctx.stores.generators_selecting_kind::<G>(
                    GeneratorResourceKind::Ingress,
                    ingress.namespace().as_deref(),
                )
            },
        )
        .watches(
            Api::<Record>::all(ctx.client.clone()),
            watcher::Config::default(),
            move |record: Record| {
                record_ctx.stores.generators_selecting_kind::<G>(
                    GeneratorResourceKind::Record,
                    record.namespace().as_deref(),
                )
            },
        )
        .shutdown_on_signal()
        .run(reconcile_generator_wrapper::<G>, error_policy::<G, Context>, ctx)
        .for_each(|result| log_reconcile_result(result))
        .await;

    Ok(())
}

async fn reconcile_generator_wrapper<G>(
    generator: Arc<G>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError>
where
    G: GeneratorObject,
{
    let start = Instant::now();
    let result = reconcile_generator(generator, ctx).await;
    observe(G::kind(&()).as_ref(), &result, start);
    result.map_err(ReconcileError)
}

/// Watch mapper for the ResourceWatcher controller: map a change of any
/// auxiliary kind to the watchers whose last rendering touched it, posting a
/// "Trigger" event for each (fire-and-forget; mappers cannot await).
fn map_watched<K>(
    ctx: Arc<Context>,
    kind: WatchedResourceKind,
) -> impl Fn(K) -> Vec<ObjectRef<ResourceWatcher>>
where
    K: Resource<DynamicType = ()> + ResourceExt,
{
    move |object: K| {
        let key = WatchedResource::new(
            kind,
            &object.namespace().unwrap_or_default(),
            &object.name_any(),
        )
        .index_key();

        let watchers = ctx.stores.watchers_tracking(&key);
        for watcher in &watchers {
            let client = ctx.client.clone();
            let watcher = watcher.clone();
            let source = key.clone();
            tokio::spawn(async move {
                emit_event(
                    &client,
                    &*watcher,
                    EVENT_TYPE_NORMAL,
                    "Trigger",
                    &format!("Record re-parsing, triggered by {source}"),
                )
                .await;
            });
        }

        watchers
            .iter()
            .map(|watcher| ObjectRef::from_obj(&**watcher))
            .collect()
    }
}

/// Run the ResourceWatcher controller with its nine auxiliary watches.
async fn run_resourcewatcher_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting ResourceWatcher controller");

    let client = &ctx.client;
    let api = Api::<ResourceWatcher>::all(client.clone());
    let cfg = watcher::Config::default;

    Controller::new(api, cfg())
        .watches(
            Api::<Template>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Template),
        )
        .watches(
            Api::<ClusterTemplate>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::ClusterTemplate),
        )
        .watches(
            Api::<Namespace>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Namespace),
        )
        .watches(
            Api::<Ingress>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Ingress),
        )
        .watches(
            Api::<Service>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Service),
        )
        .watches(
            Api::<Endpoints>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Endpoints),
        )
        .watches(
            Api::<Node>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Node),
        )
        .watches(
            Api::<Pod>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Pod),
        )
        .watches(
            Api::<Record>::all(client.clone()),
            cfg(),
            map_watched(ctx.clone(), WatchedResourceKind::Record),
        )
        .shutdown_on_signal()
        .run(
            reconcile_resourcewatcher_wrapper,
            error_policy::<ResourceWatcher, Context>,
            ctx.clone(),
        )
        .for_each(|result| log_reconcile_result(result))
        .await;

    Ok(())
}

async fn reconcile_resourcewatcher_wrapper(
    watcher: Arc<ResourceWatcher>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_resourcewatcher(watcher, ctx).await;
    observe(KIND_RESOURCE_WATCHER, &result, start);
    result.map_err(ReconcileError)
}

/// Run the Record controller.
///
/// Provider and ClusterProvider changes are mapped to every Record their
/// selector matches via the record store.
async fn run_record_controller(ctx: Arc<Context>) -> Result<()> {
    info!("Starting Record controller");

    let api = Api::<Record>::all(ctx.client.clone());
    let provider_ctx = ctx.clone();
    let cluster_provider_ctx = ctx.clone();

    Controller::new(api, watcher::Config::default())
        .watches(
            Api::<Provider>::all(ctx.client.clone()),
            watcher::Config::default(),
            move |provider: Provider| {
                provider_ctx.stores.records_matching_provider(
                    &provider.spec.common.selector,
                    provider.namespace().as_deref(),
                )
            },
        )
        .watches(
            Api::<ClusterProvider>::all(ctx.client.clone()),
            watcher::Config::default(),
            move |provider: ClusterProvider| {
                cluster_provider_ctx
                    .stores
                    .records_matching_provider(&provider.spec.common.selector, None)
            },
        )
        .shutdown_on_signal()
        .run(reconcile_record_wrapper, error_policy::<Record, Context>, ctx)
        .for_each(|result| log_reconcile_result(result))
        .await;

    Ok(())
}

async fn reconcile_record_wrapper(
    record: Arc<Record>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let result = reconcile_record(record, ctx).await;
    observe(KIND_RECORD, &result, start);
    result.map_err(ReconcileError)
}

/// Run the Provider or ClusterProvider controller.
async fn run_provider_controller<P>(ctx: Arc<Context>, kind: &'static str) -> Result<()>
where
    P: ProviderObject,
{
    info!("Starting {kind} controller");

    let api = P::api_scoped(ctx.client.clone(), None);

    Controller::new(api, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile_provider_wrapper::<P>, error_policy::<P, Context>, ctx)
        .for_each(|result| log_reconcile_result(result))
        .await;

    Ok(())
}

async fn reconcile_provider_wrapper<P>(
    object: Arc<P>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError>
where
    P: ProviderObject,
{
    let start = Instant::now();
    let result = reconcile_provider(object, ctx).await;
    observe(P::kind(&()).as_ref(), &result, start);
    result.map_err(ReconcileError)
}

fn observe(kind: &str, result: &Result<Action>, start: Instant) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_reconciliation(kind, status, start.elapsed());
}

async fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>) {
    match result {
        Ok(object) => debug!("reconciled {object:?}"),
        Err(err) => warn!("reconcile failed: {err}"),
    }
}

/// Generic error policy: requeue after a fixed delay.
fn error_policy<T, C>(_resource: Arc<T>, _err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: std::fmt::Debug,
{
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
