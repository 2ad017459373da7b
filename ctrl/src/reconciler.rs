use std::collections::BTreeMap;
use std::sync::Arc;

use rigctl_core::constants::AGENT_CONTAINER_NAME;
use rigctl_core::errors::EmptyResult;
use rigctl_core::interfaces::{
    BeadLister,
    NotesReader,
    PodRuntime,
    PodStatusReport,
    Reporter,
    SpecBuilder,
};
use rigctl_core::model::{
    AgentBead,
    PodPhase,
    PodRecord,
    Role,
};
use tracing::*;

use crate::config::ReconcilerConfig;
use crate::digest_tracker::DigestTracker;
use crate::upgrade_tracker::UpgradeTracker;

mod metrics_keys {
    pub use rigctl_core::metrics::keys::*;
}

/// One reconcile pass's outcome, returned for logging and tests. Errors
/// from a pod operation abort the pass; this is the result of a
/// successfully *completed* pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub created: usize,
    pub deleted: usize,
    pub deferred: usize,
    pub skipped_drift: usize,
    pub orphan_guard_triggered: bool,
}

enum Candidate {
    Create { bead: AgentBead },
    RecreateFailed { bead: AgentBead, old_name: String },
    RecreateDrift { bead: AgentBead, old_name: String },
}

/// Diffs desired agent beads against actual pods and converges them,
/// subject to burst/concurrency caps and the upgrade-turn discipline.
/// `Reconcile` is serialized by `pass_lock`: at most one pass runs at a time.
pub struct Reconciler {
    bead_lister: Arc<dyn BeadLister>,
    pod_runtime: Arc<dyn PodRuntime>,
    reporter: Arc<dyn Reporter>,
    notes_reader: Arc<dyn NotesReader>,
    spec_builder: Arc<dyn SpecBuilder>,
    digest_tracker: Arc<DigestTracker>,
    upgrade_tracker: Arc<UpgradeTracker>,
    config: ReconcilerConfig,
    namespace: String,
    app_label_value: String,
    pass_lock: tokio::sync::Mutex<()>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bead_lister: Arc<dyn BeadLister>,
        pod_runtime: Arc<dyn PodRuntime>,
        reporter: Arc<dyn Reporter>,
        notes_reader: Arc<dyn NotesReader>,
        spec_builder: Arc<dyn SpecBuilder>,
        digest_tracker: Arc<DigestTracker>,
        upgrade_tracker: Arc<UpgradeTracker>,
        config: ReconcilerConfig,
        namespace: impl Into<String>,
        app_label_value: impl Into<String>,
    ) -> Self {
        Reconciler {
            bead_lister,
            pod_runtime,
            reporter,
            notes_reader,
            spec_builder,
            digest_tracker,
            upgrade_tracker,
            config,
            namespace: namespace.into(),
            app_label_value: app_label_value.into(),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Narrows the server-side fetch to pods carrying the app label; the
    /// further filter to agent-labeled pods (excluding the controller's own
    /// pod) happens in the `PodRuntime` implementation.
    fn label_selector(&self) -> String {
        format!("{}={}", rigctl_core::constants::APP_KUBERNETES_IO_NAME_KEY, self.app_label_value)
    }

    /// Run one reconcile pass to completion. Mutually exclusive: a second
    /// concurrent call blocks on `pass_lock` until the first returns.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> anyhow::Result<PassSummary> {
        let _guard = self.pass_lock.lock().await;
        let mut summary = PassSummary::default();

        // Step 1: fetch desired. Fail-closed: abort with no mutations.
        let beads = self.bead_lister.list_agent_beads().await?;
        let desired: BTreeMap<String, AgentBead> = beads.into_iter().map(|b| (b.fingerprint(), b)).collect();

        // Step 2: fetch actual, already filtered to agent-labeled pods by the selector.
        let pods = self.pod_runtime.list(&self.namespace, &self.label_selector()).await?;
        let actual: BTreeMap<String, PodRecord> = pods.into_iter().map(|p| (p.fingerprint(), p)).collect();

        self.upgrade_tracker.reset();

        // Step 4/5: orphan guard and deletion.
        if desired.is_empty() && !actual.is_empty() {
            warn!("desired bead set is empty but {} actual pods exist; skipping orphan deletion this pass", actual.len());
            summary.orphan_guard_triggered = true;
        } else {
            for (name, pod) in &actual {
                if !desired.contains_key(name) {
                    info!("deleting orphaned pod {name}");
                    self.pod_runtime.delete(&pod.name, &pod.namespace).await?;
                    metrics::counter!(metrics_keys::PODS_DELETED).increment(1);
                    summary.deleted += 1;
                    self.report_status(&pod.agent, pod.bead_id.as_deref(), PodPhase::Unknown, false, Some("orphaned, deleted")).await;
                }
            }
        }

        // Step 6: active count = in both sets and not Failed.
        let mut active_pods = actual
            .iter()
            .filter(|(name, pod)| desired.contains_key(*name) && pod.phase != PodPhase::Failed)
            .count();

        // Step 7: drift scan.
        let mut drifting: BTreeMap<String, Role> = BTreeMap::new();
        for (name, pod) in &actual {
            let Some(bead) = desired.get(name) else { continue };
            if pod.phase == PodPhase::Failed {
                continue;
            }

            let desired_spec = self.spec_builder.build(&bead.rig, bead.role, &bead.agent, &bead.bead_id, &bead.metadata);
            for (container, digest) in &pod.digests {
                if let Some(image) = pod.images.get(container) {
                    self.digest_tracker.record_digest(image, digest);
                }
            }

            if let Some(reason) = drift_reason(pod, &desired_spec.images, &self.digest_tracker) {
                debug!("pod {name} drifting: {reason}");
                self.upgrade_tracker.register_drift(name, bead.role);
                drifting.insert(name.clone(), bead.role);
                metrics::counter!(metrics_keys::DIGEST_DRIFT_DETECTED).increment(1);
            }

            if pod.ready {
                self.upgrade_tracker.clear_upgrading(name);
            }
        }

        // Step 8: apply. Stable order via BTreeMap iteration over `desired`.
        let mut candidates = Vec::new();
        for (name, bead) in &desired {
            match actual.get(name) {
                None => candidates.push(Candidate::Create { bead: bead.clone() }),
                Some(pod) if pod.phase == PodPhase::Failed => {
                    candidates.push(Candidate::RecreateFailed { bead: bead.clone(), old_name: pod.name.clone() });
                },
                Some(pod) if drifting.contains_key(name) => {
                    if self.upgrade_tracker.can_upgrade(name, bead.role) {
                        candidates.push(Candidate::RecreateDrift { bead: bead.clone(), old_name: pod.name.clone() });
                    } else {
                        summary.skipped_drift += 1;
                    }
                },
                _ => {},
            }
        }

        for candidate in candidates {
            if summary.created >= self.config.spawn_burst_limit {
                summary.deferred += 1;
                continue;
            }
            if self.config.concurrency_cap_enabled() && active_pods >= self.config.max_concurrent_pods {
                summary.deferred += 1;
                continue;
            }

            // A failed pod was never counted in `active_pods` (step 6 excludes
            // Failed phase), so its replacement is a net-new active pod. A
            // drift recreate replaces a pod that *was* counted, so the count
            // doesn't change.
            let (bead, counts_as_new_active) = match candidate {
                Candidate::Create { bead } => (bead, true),
                Candidate::RecreateFailed { bead, old_name } => {
                    info!("deleting failed pod {old_name} for recreation");
                    self.pod_runtime.delete(&old_name, &self.namespace).await?;
                    metrics::counter!(metrics_keys::PODS_DELETED).increment(1);
                    (bead, true)
                },
                Candidate::RecreateDrift { bead, old_name } => {
                    info!("deleting drifting pod {old_name} for recreation");
                    self.pod_runtime.delete(&old_name, &self.namespace).await?;
                    metrics::counter!(metrics_keys::PODS_DELETED).increment(1);
                    self.upgrade_tracker.mark_upgrading(&old_name);
                    metrics::counter!(metrics_keys::UPGRADE_TURNS_GRANTED).increment(1);
                    (bead, false)
                },
            };

            let spec = self.spec_builder.build(&bead.rig, bead.role, &bead.agent, &bead.bead_id, &bead.metadata);
            info!("creating pod {}", spec.name);
            self.pod_runtime.create(spec).await?;
            metrics::counter!(metrics_keys::PODS_CREATED).increment(1);
            summary.created += 1;
            if counts_as_new_active {
                active_pods += 1;
            }
            self.report_status(&bead.agent, Some(bead.bead_id.as_str()), PodPhase::Pending, false, None).await;
        }

        self.upgrade_tracker.clean_stale_upgrades(self.config.upgrade_stale_timeout);

        if summary.deferred > 0 {
            metrics::counter!(metrics_keys::PODS_DEFERRED).increment(summary.deferred as u64);
        }
        if summary.skipped_drift > 0 {
            metrics::counter!(metrics_keys::PODS_SKIPPED).increment(summary.skipped_drift as u64);
        }

        if let Err(err) = self.reporter.sync_all().await {
            warn!("failed to sync backend status after reconcile pass: {err:?}");
        }

        Ok(summary)
    }

    async fn report_status(&self, agent_name: &str, bead_id: Option<&str>, phase: PodPhase, ready: bool, message: Option<&str>) {
        let backend_meta = match bead_id {
            Some(bead_id) => match self.notes_reader.get_agent_notes(bead_id).await {
                Ok(notes) => rigctl_core::notes::parse(&notes).into_iter().collect(),
                Err(err) => {
                    debug!("failed to fetch agent notes for bead {bead_id}: {err:?}");
                    Default::default()
                },
            },
            None => {
                debug!("no bead id available for {agent_name}, skipping notes lookup");
                Default::default()
            },
        };
        let report = PodStatusReport {
            phase,
            ready,
            message: message.map(String::from),
            backend_meta,
        };
        if let Err(err) = self.reporter.report_pod_status(agent_name, report).await {
            warn!("failed to report pod status for {agent_name}: {err:?}");
        }
    }
}

/// (a) agent container image tag mismatch, or (b) digest drift via the
/// tracker's known-good digest. Either is sufficient to flag drift.
fn drift_reason(pod: &PodRecord, desired_images: &BTreeMap<String, String>, digest_tracker: &DigestTracker) -> Option<&'static str> {
    let desired_image = desired_images.get(AGENT_CONTAINER_NAME)?;
    let observed_image = pod.images.get(AGENT_CONTAINER_NAME);

    if observed_image != Some(desired_image) {
        return Some("image tag mismatch");
    }

    if let Some(known_good) = digest_tracker.latest_digest(desired_image)
        && let Some(observed_digest) = pod.digests.get(AGENT_CONTAINER_NAME)
        && *observed_digest != known_good
    {
        return Some("digest drift");
    }

    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as Map;

    use rigctl_core::interfaces::{
        PodSpec,
        RestartPolicy,
    };
    use rigctl_testutils::{
        FakeBeadLister,
        FakeNotesReader,
        FakePodRuntime,
        FakeReporter,
    };
    use rstest::fixture;
    use test_log::test;

    use super::*;

    struct StaticSpecBuilder;

    impl SpecBuilder for StaticSpecBuilder {
        fn build(&self, rig: &str, role: Role, agent: &str, bead_id: &str, metadata: &Map<String, String>) -> PodSpec {
            let name = rigctl_core::fingerprint::fingerprint(rig, role, agent);
            let mut images = Map::new();
            images.insert(AGENT_CONTAINER_NAME.to_string(), metadata.get("image").cloned().unwrap_or_else(|| "agent:latest".into()));
            let mut labels = Map::new();
            labels.insert(rigctl_core::constants::APP_KUBERNETES_IO_NAME_KEY.to_string(), "rigctl".to_string());
            labels.insert(rigctl_core::constants::RIG_LABEL_KEY.to_string(), rig.to_string());
            labels.insert(rigctl_core::constants::ROLE_LABEL_KEY.to_string(), role.as_str().to_string());
            labels.insert(rigctl_core::constants::AGENT_LABEL_KEY.to_string(), agent.to_string());
            let mut annotations = Map::new();
            annotations.insert(rigctl_core::constants::BEAD_ID_ANNOTATION_KEY.to_string(), bead_id.to_string());
            PodSpec {
                name,
                namespace: "test-ns".to_string(),
                labels,
                annotations,
                images,
                restart_policy: if role.role_type() == rigctl_core::model::RoleType::Ephemeral { RestartPolicy::Never } else { RestartPolicy::Always },
            }
        }
    }

    fn bead(rig: &str, role: Role, agent: &str) -> AgentBead {
        AgentBead {
            bead_id: format!("{rig}-{role}-{agent}"),
            rig: rig.to_string(),
            role,
            agent: agent.to_string(),
            metadata: Map::new(),
        }
    }

    #[fixture]
    fn reconciler_parts() -> (Arc<FakeBeadLister>, Arc<FakePodRuntime>, Arc<FakeReporter>, Arc<DigestTracker>, Arc<UpgradeTracker>) {
        (
            Arc::new(FakeBeadLister::default()),
            Arc::new(FakePodRuntime::default()),
            Arc::new(FakeReporter::default()),
            Arc::new(DigestTracker::new(2).unwrap()),
            Arc::new(UpgradeTracker::new(clockabilly::UtcClock::new())),
        )
    }

    fn build_reconciler(
        beads: Arc<FakeBeadLister>,
        pods: Arc<FakePodRuntime>,
        reporter: Arc<FakeReporter>,
        digest: Arc<DigestTracker>,
        upgrade: Arc<UpgradeTracker>,
        config: ReconcilerConfig,
    ) -> Reconciler {
        Reconciler::new(
            beads,
            pods,
            reporter,
            Arc::new(FakeNotesReader::default()),
            Arc::new(StaticSpecBuilder),
            digest,
            upgrade,
            config,
            "test-ns",
            "rigctl",
        )
    }

    #[test(tokio::test)]
    async fn spawns_a_missing_pod() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        beads.set(vec![bead("gastown", Role::Polecat, "furiosa")]);
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, ReconcilerConfig::default());

        let summary = reconciler.reconcile().await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(pods.created.lock().unwrap().as_slice(), ["gt-gastown-polecat-furiosa"]);
    }

    #[test(tokio::test)]
    async fn reconcile_pass_syncs_the_reporter_once() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        beads.set(vec![bead("gastown", Role::Polecat, "furiosa")]);
        let reconciler = build_reconciler(beads, pods, reporter.clone(), digest, upgrade, ReconcilerConfig::default());

        reconciler.reconcile().await.unwrap();
        assert_eq!(*reporter.sync_all_calls.lock().unwrap(), 1);
    }

    #[test(tokio::test)]
    async fn orphan_guard_skips_deletion_on_empty_desired() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        pods.set_pods(vec![
            pod_record("gt-gastown-crew-a", Role::Crew, "a", PodPhase::Running, true),
            pod_record("gt-gastown-crew-b", Role::Crew, "b", PodPhase::Running, true),
        ]);
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, ReconcilerConfig::default());

        let summary = reconciler.reconcile().await.unwrap();
        assert!(summary.orphan_guard_triggered);
        assert_eq!(summary.deleted, 0);
        assert_eq!(pods.pods().len(), 2);
    }

    #[test(tokio::test)]
    async fn burst_limit_caps_creations_per_pass() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        let desired: Vec<_> = (0..10).map(|i| bead("gastown", Role::Crew, &format!("a{i}"))).collect();
        beads.set(desired);
        let config = ReconcilerConfig { spawn_burst_limit: 3, ..Default::default() }.normalized();
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, config);

        let first = reconciler.reconcile().await.unwrap();
        assert_eq!(first.created, 3);
        assert_eq!(first.deferred, 7);

        let second = reconciler.reconcile().await.unwrap();
        assert_eq!(second.created, 3);
        assert_eq!(pods.pods().len(), 6);
    }

    #[test(tokio::test)]
    async fn failed_pod_is_deleted_and_recreated_in_same_pass() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        beads.set(vec![bead("gastown", Role::Crew, "toolbox")]);
        pods.set_pods(vec![pod_record("gt-gastown-crew-toolbox", Role::Crew, "toolbox", PodPhase::Failed, false)]);
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, ReconcilerConfig::default());

        let summary = reconciler.reconcile().await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.created, 1);
    }

    #[test(tokio::test)]
    async fn drifting_pod_is_recreated_when_role_admits_the_upgrade() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        beads.set(vec![bead("gastown", Role::Crew, "toolbox")]);
        let mut drifted = pod_record("gt-gastown-crew-toolbox", Role::Crew, "toolbox", PodPhase::Running, true);
        drifted.images.insert(AGENT_CONTAINER_NAME.to_string(), "agent:old".to_string());
        pods.set_pods(vec![drifted]);
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, ReconcilerConfig::default());

        let summary = reconciler.reconcile().await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped_drift, 0);
    }

    #[test(tokio::test)]
    async fn desired_list_failure_aborts_pass_without_mutation() {
        let (beads, pods, reporter, digest, upgrade) = reconciler_parts();
        beads.fail_next_list();
        pods.set_pods(vec![pod_record("gt-gastown-crew-a", Role::Crew, "a", PodPhase::Running, true)]);
        let reconciler = build_reconciler(beads, pods.clone(), reporter, digest, upgrade, ReconcilerConfig::default());

        assert!(reconciler.reconcile().await.is_err());
        assert_eq!(pods.pods().len(), 1);
        assert!(pods.deleted.lock().unwrap().is_empty());
    }

    fn pod_record(name: &str, role: Role, agent: &str, phase: PodPhase, ready: bool) -> PodRecord {
        PodRecord {
            name: name.to_string(),
            namespace: "test-ns".to_string(),
            phase,
            ready,
            images: Map::new(),
            digests: Map::new(),
            bead_id: None,
            rig: "gastown".to_string(),
            role,
            agent: agent.to_string(),
        }
    }
}
