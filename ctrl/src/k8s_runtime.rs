use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{
    DeleteParams,
    ListParams,
    PostParams,
};
use rigctl_core::constants::{
    AGENT_LABEL_KEY,
    BEAD_ID_ANNOTATION_KEY,
    RIG_LABEL_KEY,
    ROLE_LABEL_KEY,
};
use rigctl_core::errors::EmptyResult;
use rigctl_core::interfaces::{
    PodRuntime,
    PodSpec,
    RestartPolicy,
};
use rigctl_core::k8s::{
    build_agent_label_selector,
    KubeResourceExt,
    PodExt,
};
use rigctl_core::model::{
    PodPhase,
    PodRecord,
    Role,
};
use tracing::debug;

/// The real [`PodRuntime`]: a thin `kube::Api<Pod>` wrapper. `create` and
/// `delete` treat `AlreadyExists`/`NotFound` per spec.md's error taxonomy
/// (already-exists bubbles up as a configuration bug; not-found on delete
/// is success).
pub struct KubePodRuntime {
    client: kube::Client,
}

impl KubePodRuntime {
    pub fn new(client: kube::Client) -> Self {
        KubePodRuntime { client }
    }

    fn api(&self, namespace: &str) -> kube::Api<corev1::Pod> {
        kube::Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_k8s_pod(spec: PodSpec) -> corev1::Pod {
    let containers = spec
        .images
        .iter()
        .map(|(name, image)| corev1::Container {
            name: name.clone(),
            image: Some(image.clone()),
            ..Default::default()
        })
        .collect();

    corev1::Pod {
        metadata: kube::api::ObjectMeta {
            name: Some(spec.name),
            namespace: Some(spec.namespace),
            labels: Some(spec.labels.into_iter().collect()),
            annotations: Some(spec.annotations.into_iter().collect()),
            ..Default::default()
        },
        spec: Some(corev1::PodSpec {
            containers,
            restart_policy: Some(
                match spec.restart_policy {
                    RestartPolicy::Always => "Always",
                    RestartPolicy::OnFailure => "OnFailure",
                    RestartPolicy::Never => "Never",
                }
                .to_string(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn phase_of(status: Option<&corev1::PodStatus>) -> PodPhase {
    match status.and_then(|s| s.phase.as_deref()) {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    }
}

fn ready_of(status: Option<&corev1::PodStatus>) -> bool {
    status
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

/// `image_id` looks like `docker-pullable://repo@sha256:abcdef...`; the
/// digest is the part after the last `@`.
fn digest_of(image_id: &str) -> Option<String> {
    image_id.rsplit_once('@').map(|(_, digest)| digest.to_string())
}

/// Pods lacking the agent label are not managed; callers that already
/// filtered by [`build_agent_label_selector`] will never hit that branch,
/// but `get()` looks a pod up by name alone so it still needs the guard.
fn to_pod_record(pod: corev1::Pod) -> Option<PodRecord> {
    if !pod.labels_contains_key(AGENT_LABEL_KEY) {
        return None;
    }

    let labels = pod.metadata.labels.clone().unwrap_or_default();
    let rig = labels.get(RIG_LABEL_KEY)?.clone();
    let role = labels.get(ROLE_LABEL_KEY)?.parse::<Role>().ok()?;
    let agent = labels.get(AGENT_LABEL_KEY)?.clone();
    let bead_id = pod.metadata.annotations.as_ref().and_then(|a| a.get(BEAD_ID_ANNOTATION_KEY)).cloned();
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();

    let status = pod.status().ok();
    let phase = phase_of(status);
    let ready = ready_of(status);

    let mut images = BTreeMap::new();
    let mut digests = BTreeMap::new();
    if let Some(statuses) = status.and_then(|s| s.container_statuses.as_ref()) {
        for cs in statuses {
            let image = pod.image_for(&cs.name).unwrap_or_else(|| cs.image.clone());
            images.insert(cs.name.clone(), image);
            if let Some(digest) = digest_of(&cs.image_id) {
                digests.insert(cs.name.clone(), digest);
            }
        }
    }

    Some(PodRecord {
        name,
        namespace,
        phase,
        ready,
        images,
        digests,
        bead_id,
        rig,
        role,
        agent,
    })
}

#[async_trait]
impl PodRuntime for KubePodRuntime {
    async fn create(&self, spec: PodSpec) -> EmptyResult {
        let namespace = spec.namespace.clone();
        let pod = to_k8s_pod(spec);
        debug!("creating pod {}", pod.namespaced_name());
        self.api(&namespace).create(&PostParams::default(), &pod).await?;
        Ok(())
    }

    async fn delete(&self, name: &str, namespace: &str) -> EmptyResult {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// `label_selector` narrows the server-side fetch (typically to the app
    /// label); pods are additionally filtered here to those carrying the
    /// agent label via [`build_agent_label_selector`], which excludes the
    /// controller's own pod and anything else sharing just the app label.
    async fn list(&self, namespace: &str, label_selector: &str) -> anyhow::Result<Vec<PodRecord>> {
        let params = ListParams::default().labels(label_selector);
        let pods = self.api(namespace).list(&params).await?;
        let agent_selector = build_agent_label_selector();
        Ok(pods
            .items
            .into_iter()
            .filter(|pod| pod.matches(&agent_selector).unwrap_or(false))
            .filter_map(to_pod_record)
            .collect())
    }

    async fn get(&self, name: &str, namespace: &str) -> anyhow::Result<Option<PodRecord>> {
        match self.api(namespace).get_opt(name).await? {
            Some(pod) => Ok(to_pod_record(pod)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_parses_pullable_image_id() {
        assert_eq!(
            digest_of("docker-pullable://ghcr.io/gastown/agent@sha256:deadbeef"),
            Some("sha256:deadbeef".to_string())
        );
        assert_eq!(digest_of("no-at-sign-here"), None);
    }
}
