use std::collections::BTreeMap;

use rigctl_core::constants::{
    AGENT_CONTAINER_NAME,
    AGENT_LABEL_KEY,
    APP_KUBERNETES_IO_NAME_KEY,
    APP_LABEL_VALUE,
    BEAD_ID_ANNOTATION_KEY,
    RIG_LABEL_KEY,
    ROLE_LABEL_KEY,
};
use rigctl_core::interfaces::{
    PodSpec,
    RestartPolicy,
};
use rigctl_core::model::{
    Role,
    RoleType,
};

const DEFAULT_AGENT_IMAGE: &str = "ghcr.io/gastown/agent:latest";
const NAMESPACE_METADATA_KEY: &str = "namespace";
const IMAGE_METADATA_KEY: &str = "image";

/// The one concrete [`rigctl_core::interfaces::SpecBuilder`] this
/// workspace ships: a minimal, label/annotation-correct `PodSpec` for an
/// agent bead. Sidecars, volumes, security contexts, and env injection are
/// explicitly out of scope for the core — real deployments are expected
/// to supply their own `SpecBuilder` wrapping this one or replacing it
/// outright.
pub struct DefaultSpecBuilder {
    default_namespace: String,
}

impl DefaultSpecBuilder {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        DefaultSpecBuilder { default_namespace: default_namespace.into() }
    }
}

impl rigctl_core::interfaces::SpecBuilder for DefaultSpecBuilder {
    fn build(&self, rig: &str, role: Role, agent: &str, bead_id: &str, metadata: &BTreeMap<String, String>) -> PodSpec {
        let name = rigctl_core::fingerprint::fingerprint(rig, role, agent);
        let namespace = metadata.get(NAMESPACE_METADATA_KEY).cloned().unwrap_or_else(|| self.default_namespace.clone());
        let image = metadata.get(IMAGE_METADATA_KEY).cloned().unwrap_or_else(|| DEFAULT_AGENT_IMAGE.to_string());

        let mut labels = BTreeMap::new();
        labels.insert(APP_KUBERNETES_IO_NAME_KEY.to_string(), APP_LABEL_VALUE.to_string());
        labels.insert(RIG_LABEL_KEY.to_string(), rig.to_string());
        labels.insert(ROLE_LABEL_KEY.to_string(), role.as_str().to_string());
        labels.insert(AGENT_LABEL_KEY.to_string(), agent.to_string());

        let mut annotations = BTreeMap::new();
        annotations.insert(BEAD_ID_ANNOTATION_KEY.to_string(), bead_id.to_string());

        let mut images = BTreeMap::new();
        images.insert(AGENT_CONTAINER_NAME.to_string(), image);

        let restart_policy = match role.role_type() {
            RoleType::Ephemeral => RestartPolicy::Never,
            RoleType::Persistent => RestartPolicy::Always,
        };

        PodSpec {
            name,
            namespace,
            labels,
            annotations,
            images,
            restart_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use rigctl_core::interfaces::SpecBuilder;

    use super::*;

    #[test]
    fn spawning_a_polecat_sets_restart_never_and_expected_labels() {
        let builder = DefaultSpecBuilder::new("gastown-ns");
        let metadata = BTreeMap::new();
        let spec = builder.build("gastown", Role::Polecat, "furiosa", "bead-1", &metadata);

        assert_eq!(spec.name, "gt-gastown-polecat-furiosa");
        assert_eq!(spec.restart_policy, RestartPolicy::Never);
        assert_eq!(spec.annotations.get(BEAD_ID_ANNOTATION_KEY), Some(&"bead-1".to_string()));
        assert_eq!(spec.labels.get(RIG_LABEL_KEY), Some(&"gastown".to_string()));
        assert_eq!(spec.labels.get(ROLE_LABEL_KEY), Some(&"polecat".to_string()));
        assert_eq!(spec.labels.get(AGENT_LABEL_KEY), Some(&"furiosa".to_string()));
    }

    #[test]
    fn metadata_overrides_namespace_and_image() {
        let builder = DefaultSpecBuilder::new("gastown-ns");
        let mut metadata = BTreeMap::new();
        metadata.insert(NAMESPACE_METADATA_KEY.to_string(), "custom-ns".to_string());
        metadata.insert(IMAGE_METADATA_KEY.to_string(), "registry.example/agent:v2".to_string());
        let spec = builder.build("gastown", Role::Crew, "toolbox", "bead-2", &metadata);

        assert_eq!(spec.namespace, "custom-ns");
        assert_eq!(spec.images.get(AGENT_CONTAINER_NAME), Some(&"registry.example/agent:v2".to_string()));
        assert_eq!(spec.restart_policy, RestartPolicy::Always);
    }
}
