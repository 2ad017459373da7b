use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rigctl_core::constants::{
    AGENT_LABEL_KEY,
    BEAD_ID_ANNOTATION_KEY,
    RIG_LABEL_KEY,
    ROLE_LABEL_KEY,
};
use rigctl_core::interfaces::{
    PodRuntime,
    PodSpec,
};
use rigctl_core::model::{
    PodPhase,
    PodRecord,
    Role,
};

/// An in-memory [`PodRuntime`]. `create`/`delete` are idempotent at the
/// fingerprint level, matching the real contract, and every call is
/// recorded so tests can assert on ordering and counts.
#[derive(Default)]
pub struct FakePodRuntime {
    pods: Mutex<Vec<PodRecord>>,
    pub created: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    fail_create_next: Mutex<bool>,
    fail_delete_next: Mutex<bool>,
}

impl FakePodRuntime {
    pub fn new(pods: Vec<PodRecord>) -> Self {
        FakePodRuntime {
            pods: Mutex::new(pods),
            ..Default::default()
        }
    }

    pub fn set_pods(&self, pods: Vec<PodRecord>) {
        *self.pods.lock().unwrap() = pods;
    }

    pub fn pods(&self) -> Vec<PodRecord> {
        self.pods.lock().unwrap().clone()
    }

    pub fn fail_next_create(&self) {
        *self.fail_create_next.lock().unwrap() = true;
    }

    pub fn fail_next_delete(&self) {
        *self.fail_delete_next.lock().unwrap() = true;
    }

    pub fn mark_ready(&self, name: &str) {
        let mut pods = self.pods.lock().unwrap();
        if let Some(p) = pods.iter_mut().find(|p| p.name == name) {
            p.phase = PodPhase::Running;
            p.ready = true;
        }
    }

    pub fn set_phase(&self, name: &str, phase: PodPhase) {
        let mut pods = self.pods.lock().unwrap();
        if let Some(p) = pods.iter_mut().find(|p| p.name == name) {
            p.phase = phase;
        }
    }

    pub fn set_digest(&self, name: &str, image_key: &str, digest: &str) {
        let mut pods = self.pods.lock().unwrap();
        if let Some(p) = pods.iter_mut().find(|p| p.name == name) {
            p.digests.insert(image_key.to_string(), digest.to_string());
        }
    }
}

fn record_from_spec(spec: &PodSpec) -> PodRecord {
    let rig = spec.labels.get(RIG_LABEL_KEY).cloned().unwrap_or_default();
    let role = spec
        .labels
        .get(ROLE_LABEL_KEY)
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or(Role::Polecat);
    let agent = spec.labels.get(AGENT_LABEL_KEY).cloned().unwrap_or_default();
    let bead_id = spec.annotations.get(BEAD_ID_ANNOTATION_KEY).cloned();

    PodRecord {
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        phase: PodPhase::Pending,
        ready: false,
        images: spec.images.clone(),
        digests: BTreeMap::new(),
        bead_id,
        rig,
        role,
        agent,
    }
}

#[async_trait]
impl PodRuntime for FakePodRuntime {
    async fn create(&self, spec: PodSpec) -> rigctl_core::errors::EmptyResult {
        if std::mem::take(&mut *self.fail_create_next.lock().unwrap()) {
            anyhow::bail!("fake pod runtime create failure");
        }
        let mut pods = self.pods.lock().unwrap();
        if pods.iter().any(|p| p.name == spec.name) {
            // idempotent at the fingerprint level
            return Ok(());
        }
        pods.push(record_from_spec(&spec));
        drop(pods);
        self.created.lock().unwrap().push(spec.name);
        Ok(())
    }

    async fn delete(&self, name: &str, _namespace: &str) -> rigctl_core::errors::EmptyResult {
        if std::mem::take(&mut *self.fail_delete_next.lock().unwrap()) {
            anyhow::bail!("fake pod runtime delete failure");
        }
        self.pods.lock().unwrap().retain(|p| p.name != name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn list(&self, namespace: &str, _label_selector: &str) -> anyhow::Result<Vec<PodRecord>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str, namespace: &str) -> anyhow::Result<Option<PodRecord>> {
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.name == name && p.namespace == namespace)
            .cloned())
    }
}
