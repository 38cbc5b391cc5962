// Copyright (c) 2025 The Rampart Authors
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser as _;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, ResourceExt as _};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use rampart::cli::{self, Args};
use rampart::configurator::params::{render_main_config, ConfigParams};
use rampart::configurator::{Applied, Configurator};
use rampart::controllers::configuration::{self, typed_key, ReconcilerContext};
use rampart::controllers::events::EventSink;
use rampart::controllers::run_worker;
use rampart::crd::ExternalEndpoint;
use rampart::health::{self, HealthState};
use rampart::namespaces::NamespaceManager;
use rampart::nginx::admin::PlusClient;
use rampart::nginx::process::NginxProcess;
use rampart::nginx::NginxManager;
use rampart::queue::WorkQueue;
use rampart::{leader, telemetry};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("rampart-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    // Initialize logging.
    //
    // Respects RUST_LOG for the filter (defaults to info) and
    // RUST_LOG_FORMAT for the output format (text or json).
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    let args = Args::parse();
    let (pod_namespace, pod_name) = cli::pod_identity();
    info!(pod = %pod_name, namespace = %pod_namespace, "Starting Rampart ingress controller");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;

    // ========================================================================
    // Proxy manager and initial configuration
    // ========================================================================

    let manager = Arc::new(
        NginxManager::new(&args.nginx_prefix, &args.nginx_binary)
            .context("failed to initialize the NGINX configuration tree")?,
    );

    let config_params = load_config_params(&client, &args).await?;
    manager
        .write_main_config(&render_main_config(&config_params, args.enable_tls_passthrough))
        .context("failed to write the initial nginx.conf")?;

    let process = NginxProcess::start(&args.nginx_binary, &args.nginx_prefix)
        .context("failed to start NGINX")?;
    let mut nginx_exit = process.supervise();

    // The first verified reload flips the readiness endpoint.
    manager
        .reload()
        .await
        .context("initial NGINX reload failed")?;

    let plus = args
        .nginx_plus
        .then(|| PlusClient::new(&args.plus_api_socket));
    let configurator = Arc::new(Configurator::new(Arc::clone(&manager), plus));

    // ========================================================================
    // Leadership
    // ========================================================================

    let is_leader = if args.enable_leader_election {
        leader::start(client.clone(), &pod_namespace, &pod_name).await?
    } else {
        // Without election every replica acts as the leader.
        let (tx, rx) = watch::channel(true);
        drop(tx);
        rx
    };

    // ========================================================================
    // Caches, queues, reconciler context
    // ========================================================================

    let namespaces = NamespaceManager::new(client.clone());
    let ctx = Arc::new(ReconcilerContext {
        client: client.clone(),
        namespaces: Arc::clone(&namespaces),
        configurator: Arc::clone(&configurator),
        events: EventSink::new(client.clone(), Some(pod_name.clone())),
        queue: WorkQueue::new(),
        cert_queue: WorkQueue::new(),
        dns_queue: WorkQueue::new(),
        listeners: RwLock::new(HashMap::new()),
        is_leader,
        external_endpoints: RwLock::new(Vec::new()),
    });

    {
        let ctx = Arc::clone(&ctx);
        namespaces.on_group_created(move |group| configuration::register_handlers(&ctx, group));
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    if let Some(selector) = args.watch_namespace_label.clone() {
        info!(selector = %selector, "Watching namespaces by label");
        tokio::spawn(Arc::clone(&namespaces).run_label_watcher(selector, stop_rx.clone()));
    } else {
        for namespace in args.static_namespaces() {
            namespaces.add_namespace(&namespace);
        }
        for group in namespaces.all() {
            if !group.wait_for_sync(Duration::from_secs(60)).await {
                warn!(namespace = %group.namespace, "Caches did not sync within a minute, continuing degraded");
            }
        }
    }

    if let Some(value) = &args.global_configuration {
        let (namespace, name) = cli::split_namespaced_name(value)
            .context("invalid --global-configuration")?;
        namespaces.add_namespace(&namespace);
        ctx.queue.add(&typed_key("gc", &namespace, &name));
    }

    if let Some(value) = &args.nginx_configmaps {
        let (namespace, name) =
            cli::split_namespaced_name(value).context("invalid --nginx-configmaps")?;
        tokio::spawn(run_primary_configmap_watch(
            client.clone(),
            Arc::clone(&configurator),
            namespace,
            name,
            args.enable_tls_passthrough,
            stop_rx.clone(),
        ));
    }

    if let Some(value) = &args.external_service {
        let (namespace, name) =
            cli::split_namespaced_name(value).context("invalid --external-service")?;
        tokio::spawn(run_external_service_watch(
            Arc::clone(&ctx),
            namespace,
            name,
            stop_rx.clone(),
        ));
    }

    // ========================================================================
    // Health and telemetry
    // ========================================================================

    let health_state = Arc::new(HealthState {
        manager: Arc::clone(&manager),
        configurator: Arc::clone(&configurator),
    });

    if !args.disable_telemetry {
        let collector = telemetry::Collector::new(
            client.clone(),
            Arc::clone(&namespaces),
            pod_namespace.clone(),
            pod_name.clone(),
        );
        tokio::spawn(telemetry::run(
            collector,
            Arc::new(telemetry::StdoutExporter),
            stop_rx.clone(),
        ));
    }

    // ========================================================================
    // Workers
    // ========================================================================

    info!("Starting controllers");

    let mut main_worker = tokio::spawn({
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&ctx.queue);
        async move {
            run_worker(queue, "configuration", |key| {
                let ctx = Arc::clone(&ctx);
                async move { configuration::sync(&ctx, &key).await }
            })
            .await;
        }
    });
    let mut cert_worker = tokio::spawn({
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&ctx.cert_queue);
        run_optional_worker(
            args.enable_cert_manager,
            queue,
            "certificates",
            stop_rx.clone(),
            move |key| {
                let ctx = Arc::clone(&ctx);
                async move { configuration::sync_certificates_key(&ctx, &key).await }
            },
        )
    });
    let mut dns_worker = tokio::spawn({
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&ctx.dns_queue);
        run_optional_worker(
            args.enable_external_dns,
            queue,
            "dns-endpoints",
            stop_rx.clone(),
            move |key| {
                let ctx = Arc::clone(&ctx);
                async move { configuration::sync_dns_endpoint_key(&ctx, &key).await }
            },
        )
    });

    // Controllers never exit on their own; any return here is fatal except
    // the shutdown path.
    tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received, draining");
            let _ = stop_tx.send(true);
            ctx.queue.shut_down();
            ctx.cert_queue.shut_down();
            ctx.dns_queue.shut_down();
            // Workers finish their in-flight sync, then exit on the drained
            // queue. NGINX stays up until they are done.
            let _ = tokio::join!(&mut main_worker, &mut cert_worker, &mut dns_worker);
            if let Err(e) = manager.quit().await {
                warn!(error = %e, "Graceful NGINX quit failed");
            }
            info!("Shutdown complete");
            Ok(())
        }
        result = &mut main_worker => {
            error!("CRITICAL: configuration worker exited unexpectedly");
            result?;
            anyhow::bail!("configuration worker exited unexpectedly")
        }
        result = &mut cert_worker => {
            error!("CRITICAL: certificate worker exited unexpectedly");
            result?;
            anyhow::bail!("certificate worker exited unexpectedly")
        }
        result = &mut dns_worker => {
            error!("CRITICAL: dns-endpoint worker exited unexpectedly");
            result?;
            anyhow::bail!("dns-endpoint worker exited unexpectedly")
        }
        result = serve_health(health_state, [args.ready_status_port, args.metrics_port, args.service_insight_port]) => {
            error!("CRITICAL: health server exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("health server exited unexpectedly without error")
        }
        status = &mut nginx_exit => {
            error!(?status, "CRITICAL: NGINX exited outside shutdown");
            anyhow::bail!("NGINX exited outside shutdown")
        }
    }
}

/// Fetch and parse the primary ConfigMap.
///
/// A missing or unreadable primary ConfigMap is fatal; individual bad keys
/// inside it only produce warnings.
async fn load_config_params(client: &Client, args: &Args) -> Result<ConfigParams> {
    let Some(value) = &args.nginx_configmaps else {
        return Ok(ConfigParams::default());
    };
    let (namespace, name) =
        cli::split_namespaced_name(value).context("invalid --nginx-configmaps")?;
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let cm = api
        .get(&name)
        .await
        .with_context(|| format!("failed to fetch the primary ConfigMap {namespace}/{name}"))?;
    let (params, warnings) = ConfigParams::from_configmap(&cm);
    for warning in warnings {
        warn!(configmap = %value, "{warning}");
    }
    Ok(params)
}

/// Run a shim worker, or idle with its queue closed when the feature gate
/// is off. A closed queue drops keys instead of growing, and the idle task
/// still exits on the stop signal so shutdown can join it.
async fn run_optional_worker<F, Fut>(
    enabled: bool,
    queue: Arc<WorkQueue>,
    worker: &'static str,
    mut stop: watch::Receiver<bool>,
    sync: F,
) where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    if enabled {
        run_worker(queue, worker, sync).await;
    } else {
        queue.shut_down();
        while stop.changed().await.is_ok() {
            if *stop.borrow() {
                return;
            }
        }
    }
}

/// Poll the primary ConfigMap and apply parameter changes to the running
/// configuration.
///
/// Apply failures are logged, not fatal: the last good `nginx.conf` keeps
/// serving until a readable ConfigMap comes back.
async fn run_primary_configmap_watch(
    client: Client,
    configurator: Arc<Configurator>,
    namespace: String,
    name: String,
    tls_passthrough: bool,
    mut stop: watch::Receiver<bool>,
) {
    let api: Api<ConfigMap> = Api::namespaced(client, &namespace);
    loop {
        match api.get(&name).await {
            Ok(cm) => {
                let (params, warnings) = ConfigParams::from_configmap(&cm);
                for warning in warnings {
                    warn!(configmap = %format!("{namespace}/{name}"), "{warning}");
                }
                match configurator.apply_config_params(&params, tls_passthrough).await {
                    Ok(Applied::Unchanged) => {}
                    Ok(applied) => {
                        info!(configmap = %format!("{namespace}/{name}"), ?applied, "Applied primary ConfigMap change");
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to apply primary ConfigMap change");
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not read the primary ConfigMap"),
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(60)) => {}
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
            }
        }
    }
}

/// Serve the health router on the readiness, metrics and service-insight
/// ports.
async fn serve_health(state: Arc<HealthState>, ports: [u16; 3]) -> Result<()> {
    tokio::try_join!(
        health::serve(Arc::clone(&state), ports[0]),
        health::serve(Arc::clone(&state), ports[1]),
        health::serve(state, ports[2]),
    )?;
    Ok(())
}

/// Poll the fronting Service and publish its external addresses.
///
/// On a change every VirtualServer is requeued so the leader refreshes
/// `status.externalEndpoints`.
async fn run_external_service_watch(
    ctx: Arc<ReconcilerContext>,
    namespace: String,
    name: String,
    mut stop: watch::Receiver<bool>,
) {
    let api: Api<Service> = Api::namespaced(ctx.client.clone(), &namespace);
    loop {
        match api.get(&name).await {
            Ok(service) => {
                let endpoints = external_endpoints_of(&service);
                let changed = {
                    let mut current = ctx
                        .external_endpoints
                        .write()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    if *current == endpoints {
                        false
                    } else {
                        *current = endpoints;
                        true
                    }
                };
                if changed {
                    info!(service = %format!("{namespace}/{name}"), "External service addresses changed");
                    for group in ctx.namespaces.all() {
                        for vs in group.virtual_servers.list() {
                            let key = typed_key(
                                "vs",
                                &vs.namespace().unwrap_or_default(),
                                &vs.name_any(),
                            );
                            ctx.queue.add(&key);
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "Could not read the external service"),
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(60)) => {}
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
            }
        }
    }
}

/// External addresses published by a LoadBalancer Service.
fn external_endpoints_of(service: &Service) -> Vec<ExternalEndpoint> {
    let ports = service.spec.as_ref().and_then(|spec| spec.ports.as_ref()).map(|ports| {
        ports
            .iter()
            .map(|p| p.port.to_string())
            .collect::<Vec<_>>()
            .join(",")
    });

    service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| {
            ingress
                .iter()
                .map(|entry| ExternalEndpoint {
                    ip: entry.ip.clone(),
                    hostname: entry.hostname.clone(),
                    ports: ports.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve on SIGTERM or Ctrl-C.
async fn shutdown_signal() {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(e) => {
            error!(error = %e, "Could not install the SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!();
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
