mod pod_ext;
mod util;

pub use pod_ext::*;
pub use util::*;

use crate::errors::*;
use crate::prelude::*;

err_impl! {KubernetesError,
    #[error("field not found in struct: {0}")]
    FieldNotFound(String),

    #[error("malformed label selector: {0:?}")]
    MalformedLabelSelector(metav1::LabelSelectorRequirement),
}

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
    fn matches(&self, sel: &metav1::LabelSelector) -> anyhow::Result<bool>;
}

pub trait PodExt {
    fn labels_contains_key(&self, key: &str) -> bool;
    fn spec(&self) -> anyhow::Result<&corev1::PodSpec>;
    fn status(&self) -> anyhow::Result<&corev1::PodStatus>;
    fn image_for(&self, container: &str) -> Option<String>;
}
