use std::sync::Arc;
use std::time::Duration;

use rigctl_core::interfaces::{
    PodRuntime,
    SpecBuilder,
};
use rigctl_core::model::LifecycleEvent;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::reconciler::Reconciler;

const NAMESPACE_METADATA_KEY: &str = "namespace";

/// The main loop: selects over the lifecycle-event channel, the periodic
/// reconcile tick, and cancellation. Per-event handling is synchronous here
/// — parallel event handling isn't provided, because events mutate shared
/// pod state — and a handled event never blocks on the next reconcile pass:
/// the pass re-derives desired/actual from scratch regardless of what an
/// event handler already did.
pub struct ControllerLoop {
    reconciler: Arc<Reconciler>,
    pod_runtime: Arc<dyn PodRuntime>,
    spec_builder: Arc<dyn SpecBuilder>,
    namespace: String,
    sync_interval: Duration,
}

impl ControllerLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        pod_runtime: Arc<dyn PodRuntime>,
        spec_builder: Arc<dyn SpecBuilder>,
        namespace: impl Into<String>,
        sync_interval: Duration,
    ) -> Self {
        ControllerLoop {
            reconciler,
            pod_runtime,
            spec_builder,
            namespace: namespace.into(),
            sync_interval,
        }
    }

    /// Runs until `cancel` fires. Shutdown drains in the order spec.md
    /// prescribes: the watcher has already stopped feeding `events` by the
    /// time this returns control to `main`, and the in-flight pass (if any)
    /// is allowed to finish before exit — here, by running one last pass
    /// synchronously rather than aborting mid-reconcile.
    #[instrument(skip_all)]
    pub async fn run(&self, mut events: mpsc::Receiver<LifecycleEvent>, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.sync_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.tick().await; // consume the immediate first tick; reconcile explicitly below

        if let Err(err) = self.reconciler.reconcile().await {
            warn!("startup reconcile pass failed, will retry on the next tick: {err:?}");
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("shutdown requested, running final reconcile pass before exit");
                    if let Err(err) = self.reconciler.reconcile().await {
                        warn!("final reconcile pass failed: {err:?}");
                    }
                    return Ok(());
                },
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("lifecycle event channel closed; continuing on the periodic tick alone");
                            // Don't poll a closed channel in a busy loop; park on tick/cancel only.
                            loop {
                                tokio::select! {
                                    _ = cancel.cancelled() => return Ok(()),
                                    _ = tick.tick() => self.run_tick().await,
                                }
                            }
                        },
                    }
                },
                _ = tick.tick() => self.run_tick().await,
            }
        }
    }

    async fn run_tick(&self) {
        match self.reconciler.reconcile().await {
            Ok(summary) => debug!(?summary, "reconcile pass complete"),
            Err(err) => warn!("reconcile pass failed, will retry on the next tick: {err:?}"),
        }
    }

    /// A low-latency best-effort reaction to one lifecycle event. Any
    /// failure here is transient-transport-shaped and deferred to the next
    /// reconcile pass rather than propagated — the pass is the source of
    /// truth and will retry from re-derived state.
    async fn handle_event(&self, event: LifecycleEvent) {
        let fingerprint = event.fingerprint();
        match event {
            LifecycleEvent::Spawn(data) => {
                let spec = self.spec_builder.build(&data.rig, data.role, &data.agent, &data.bead_id, &data.metadata);
                if let Err(err) = self.pod_runtime.create(spec).await {
                    debug!("spawn for {fingerprint} deferred to next reconcile pass: {err:?}");
                }
            },
            LifecycleEvent::Done(data) | LifecycleEvent::Kill(data) => {
                let namespace = data.metadata.get(NAMESPACE_METADATA_KEY).cloned().unwrap_or_else(|| self.namespace.clone());
                if let Err(err) = self.pod_runtime.delete(&fingerprint, &namespace).await {
                    debug!("delete for {fingerprint} deferred to next reconcile pass: {err:?}");
                }
            },
            LifecycleEvent::Stuck(data) => {
                info!("forcing recycle of stuck pod {fingerprint}");
                let namespace = data.metadata.get(NAMESPACE_METADATA_KEY).cloned().unwrap_or_else(|| self.namespace.clone());
                if let Err(err) = self.pod_runtime.delete(&fingerprint, &namespace).await {
                    debug!("recycle delete for {fingerprint} deferred to next reconcile pass: {err:?}");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rigctl_core::constants::AGENT_CONTAINER_NAME;
    use rigctl_core::interfaces::{
        PodSpec,
        RestartPolicy,
    };
    use rigctl_core::model::{
        LifecycleEventData,
        Role,
    };
    use rigctl_testutils::{
        FakeBeadLister,
        FakeNotesReader,
        FakePodRuntime,
        FakeReporter,
    };
    use test_log::test;

    use super::*;
    use crate::digest_tracker::DigestTracker;
    use crate::upgrade_tracker::UpgradeTracker;

    struct StaticSpecBuilder;

    impl SpecBuilder for StaticSpecBuilder {
        fn build(&self, rig: &str, role: Role, agent: &str, bead_id: &str, _metadata: &BTreeMap<String, String>) -> PodSpec {
            let name = rigctl_core::fingerprint::fingerprint(rig, role, agent);
            let mut images = BTreeMap::new();
            images.insert(AGENT_CONTAINER_NAME.to_string(), "agent:latest".to_string());
            let mut annotations = BTreeMap::new();
            annotations.insert(rigctl_core::constants::BEAD_ID_ANNOTATION_KEY.to_string(), bead_id.to_string());
            PodSpec {
                name,
                namespace: "test-ns".to_string(),
                labels: BTreeMap::new(),
                annotations,
                images,
                restart_policy: RestartPolicy::Never,
            }
        }
    }

    fn build_loop(pods: Arc<FakePodRuntime>) -> ControllerLoop {
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(FakeBeadLister::default()),
            pods.clone(),
            Arc::new(FakeReporter::default()),
            Arc::new(FakeNotesReader::default()),
            Arc::new(StaticSpecBuilder),
            Arc::new(DigestTracker::new(2).unwrap()),
            Arc::new(UpgradeTracker::new(clockabilly::UtcClock::new())),
            crate::config::ReconcilerConfig::default(),
            "test-ns",
            "rigctl",
        ));
        ControllerLoop::new(reconciler, pods, Arc::new(StaticSpecBuilder), "test-ns", Duration::from_secs(3600))
    }

    fn event_data(rig: &str, role: Role, agent: &str) -> LifecycleEventData {
        LifecycleEventData {
            rig: rig.to_string(),
            role,
            agent: agent.to_string(),
            bead_id: format!("{rig}-{role}-{agent}"),
            metadata: BTreeMap::new(),
        }
    }

    #[test(tokio::test)]
    async fn spawn_event_creates_pod_immediately() {
        let pods = Arc::new(FakePodRuntime::default());
        let ctrl_loop = build_loop(pods.clone());

        ctrl_loop.handle_event(LifecycleEvent::Spawn(event_data("gastown", Role::Polecat, "furiosa"))).await;

        assert_eq!(pods.created.lock().unwrap().as_slice(), ["gt-gastown-polecat-furiosa"]);
    }

    #[test(tokio::test)]
    async fn done_event_deletes_pod_immediately() {
        let pods = Arc::new(FakePodRuntime::default());
        let ctrl_loop = build_loop(pods.clone());
        ctrl_loop.handle_event(LifecycleEvent::Spawn(event_data("gastown", Role::Crew, "toolbox"))).await;

        ctrl_loop.handle_event(LifecycleEvent::Done(event_data("gastown", Role::Crew, "toolbox"))).await;

        assert_eq!(pods.deleted.lock().unwrap().as_slice(), ["gt-gastown-crew-toolbox"]);
    }

    #[test(tokio::test)]
    async fn stuck_event_forces_recycle_delete() {
        let pods = Arc::new(FakePodRuntime::default());
        let ctrl_loop = build_loop(pods.clone());
        ctrl_loop.handle_event(LifecycleEvent::Spawn(event_data("gastown", Role::Crew, "toolbox"))).await;

        ctrl_loop.handle_event(LifecycleEvent::Stuck(event_data("gastown", Role::Crew, "toolbox"))).await;

        assert_eq!(pods.deleted.lock().unwrap().as_slice(), ["gt-gastown-crew-toolbox"]);
    }
}
