use super::*;
use crate::prelude::*;

// Helper functions to get references to a pod's spec and status objects
impl PodExt for corev1::Pod {
    fn labels_contains_key(&self, key: &str) -> bool {
        self.metadata.labels.as_ref().unwrap_or(&Default::default()).contains_key(key)
    }

    fn spec(&self) -> anyhow::Result<&corev1::PodSpec> {
        match self.spec.as_ref() {
            None => bail!(KubernetesError::field_not_found("pod spec")),
            Some(ps) => Ok(ps),
        }
    }

    fn status(&self) -> anyhow::Result<&corev1::PodStatus> {
        match self.status.as_ref() {
            None => bail!(KubernetesError::field_not_found("pod status")),
            Some(ps) => Ok(ps),
        }
    }

    fn image_for(&self, container: &str) -> Option<String> {
        self.spec
            .as_ref()?
            .containers
            .iter()
            .find(|c| c.name == container)
            .and_then(|c| c.image.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_with_container(image: &str) -> corev1::Pod {
        corev1::Pod {
            metadata: kube::api::ObjectMeta {
                labels: Some([("gastown.io/agent".to_string(), "furiosa".to_string())].into()),
                ..Default::default()
            },
            spec: Some(corev1::PodSpec {
                containers: vec![corev1::Container {
                    name: "agent".into(),
                    image: Some(image.into()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: Some(corev1::PodStatus {
                phase: Some("Running".into()),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn labels_contains_key_is_false_when_pod_has_no_labels() {
        let pod = corev1::Pod::default();
        assert!(!pod.labels_contains_key("gastown.io/agent"));
    }

    #[test]
    fn labels_contains_key_finds_a_present_key() {
        let pod = pod_with_container("ghcr.io/gastown/agent:latest");
        assert!(pod.labels_contains_key("gastown.io/agent"));
        assert!(!pod.labels_contains_key("gastown.io/missing"));
    }

    #[test]
    fn spec_and_status_error_when_unset() {
        let pod = corev1::Pod::default();
        assert!(pod.spec().is_err());
        assert!(pod.status().is_err());
    }

    #[test]
    fn image_for_reads_the_named_container() {
        let pod = pod_with_container("ghcr.io/gastown/agent:v3");
        assert_eq!(pod.image_for("agent"), Some("ghcr.io/gastown/agent:v3".to_string()));
        assert_eq!(pod.image_for("sidecar"), None);
    }
}
