mod beads_client;
mod cli;
mod config;
mod controller;
mod digest_tracker;
mod k8s_runtime;
mod reconciler;
mod spec_builder;
mod upgrade_tracker;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rigctl_core::errors::EmptyResult;
use rigctl_core::logging;
use rigctl_watch::{
    EventWatcher,
    NatsBusConnector,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::beads_client::HttpBeadsClient;
use crate::cli::Options;
use crate::config::ReconcilerConfig;
use crate::controller::ControllerLoop;
use crate::digest_tracker::DigestTracker;
use crate::k8s_runtime::KubePodRuntime;
use crate::reconciler::Reconciler;
use crate::spec_builder::DefaultSpecBuilder;
use crate::upgrade_tracker::UpgradeTracker;

const EVENT_CHANNEL_CAPACITY: usize = rigctl_core::constants::DEFAULT_EVENT_CHANNEL_CAPACITY;

#[instrument(skip_all)]
async fn run(opts: Options) -> EmptyResult {
    if let Some(path) = &opts.kubeconfig {
        // SAFETY: single-threaded at this point in startup, before any task
        // that might read the environment concurrently has been spawned.
        unsafe { std::env::set_var("KUBECONFIG", path) };
    }
    let k8s_client = kube::Client::try_default().await?;

    let beads_client = Arc::new(HttpBeadsClient::new(opts.beads_base_url.clone())?);
    let pod_runtime = Arc::new(KubePodRuntime::new(k8s_client));
    let spec_builder = Arc::new(DefaultSpecBuilder::new(opts.namespace.clone()));
    let digest_tracker = Arc::new(DigestTracker::new(opts.registry_confirm_threshold)?);
    let upgrade_tracker = Arc::new(UpgradeTracker::new(clockabilly::UtcClock::new()));

    let config = ReconcilerConfig {
        spawn_burst_limit: opts.spawn_burst_limit,
        max_concurrent_pods: opts.max_concurrent_pods,
        registry_confirm_threshold: opts.registry_confirm_threshold,
        upgrade_stale_timeout: Duration::from_secs(rigctl_core::constants::DEFAULT_UPGRADE_STALE_TIMEOUT_SECS),
        sync_interval: Duration::from_secs(opts.sync_interval_secs),
    }
    .normalized();

    let reconciler = Arc::new(Reconciler::new(
        beads_client.clone(),
        pod_runtime.clone(),
        beads_client.clone(),
        beads_client.clone(),
        spec_builder.clone(),
        digest_tracker.clone(),
        upgrade_tracker,
        config,
        opts.namespace.clone(),
        rigctl_core::constants::APP_LABEL_VALUE,
    ));

    let bus_connector = NatsBusConnector::new(opts.bus_url.clone(), opts.bus_stream_name.clone(), opts.bus_subject.clone(), opts.bus_consumer_name.clone());
    let (watcher, event_rx) = EventWatcher::new(bus_connector, EVENT_CHANNEL_CAPACITY);

    let cancel = CancellationToken::new();

    let watcher_cancel = cancel.clone();
    let watcher_handle = tokio::spawn(async move { watcher.start(watcher_cancel).await });

    let digest_cancel = cancel.clone();
    let digest_refresh_interval = Duration::from_secs(opts.digest_refresh_interval_secs);
    let digest_tracker_for_refresh = digest_tracker.clone();
    let digest_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(digest_refresh_interval);
        loop {
            tokio::select! {
                _ = digest_cancel.cancelled() => return,
                _ = tick.tick() => {
                    if let Err(err) = digest_tracker_for_refresh.refresh_images().await {
                        warn!("registry digest refresh failed: {err:?}");
                    }
                },
            }
        }
    });

    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        shutdown_cancel.cancel();
    });

    let controller_loop = ControllerLoop::new(reconciler, pod_runtime, spec_builder, opts.namespace, Duration::from_secs(opts.sync_interval_secs));
    let loop_result = controller_loop.run(event_rx, cancel.clone()).await;

    cancel.cancel();
    match watcher_handle.await {
        Ok(Err(err)) => warn!("event watcher exited with an error: {err:?}"),
        Err(err) => warn!("watcher task panicked: {err:?}"),
        Ok(Ok(())) => {},
    }
    digest_handle.abort();

    loop_result
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{
        signal,
        SignalKind,
    };

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> EmptyResult {
    let opts = Options::parse();
    logging::setup(&opts.log_level);

    if let Err(err) = run(opts).await {
        error!("fatal startup error: {err:?}");
        std::process::exit(1);
    }
    Ok(())
}
