use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(feature = "mock")]
use mockall::automock;
use serde::Serialize;

use crate::errors::EmptyResult;
use crate::model::{
    AgentBead,
    PodRecord,
    Role,
};

/// Desired-state source. The work-item database itself — CRUD, schema,
/// query planning — is out of scope; this is the only surface the
/// reconciler needs.
#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait BeadLister: Send + Sync {
    async fn list_agent_beads(&self) -> anyhow::Result<Vec<AgentBead>>;
}

/// Opaque pod spec handed to `PodRuntime::create`. Construction (sidecars,
/// volumes, security contexts, env injection) lives behind `SpecBuilder`.
#[derive(Clone, Debug)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub images: BTreeMap<String, String>,
    pub restart_policy: RestartPolicy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    Never,
}

/// Actual-state source and mutator. Create/delete are idempotent at the
/// fingerprint level: a second `Create` for a fingerprint that already
/// exists, or a second `Delete` for one that's already gone, must not be
/// treated as a hard failure by callers relying on at-least-once retries.
#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait PodRuntime: Send + Sync {
    async fn create(&self, spec: PodSpec) -> EmptyResult;
    async fn delete(&self, name: &str, namespace: &str) -> EmptyResult;
    async fn list(&self, namespace: &str, label_selector: &str) -> anyhow::Result<Vec<PodRecord>>;
    async fn get(&self, name: &str, namespace: &str) -> anyhow::Result<Option<PodRecord>>;
}

#[derive(Clone, Debug, Serialize)]
pub struct PodStatusReport {
    pub phase: crate::model::PodPhase,
    pub ready: bool,
    pub message: Option<String>,
    pub backend_meta: BTreeMap<String, String>,
}

/// Status back-reporting transport. Out of scope beyond this surface.
#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report_pod_status(&self, agent_name: &str, report: PodStatusReport) -> EmptyResult;
    async fn sync_all(&self) -> EmptyResult;
}

/// Reads the flat `key: value` transport-metadata blob attached to a bead.
/// See [`crate::notes::parse`] for the wire format this text is expected to
/// be in.
#[cfg_attr(feature = "mock", automock)]
#[async_trait]
pub trait NotesReader: Send + Sync {
    async fn get_agent_notes(&self, bead_id: &str) -> anyhow::Result<String>;
}

/// Pure pod-template construction, intentionally not async and not
/// fallible in the common case: `(config, role, identity, metadata) ->
/// PodSpec`. Out of scope beyond this seam; a concrete implementation is
/// supplied by callers, not by this crate.
pub trait SpecBuilder: Send + Sync {
    fn build(&self, rig: &str, role: Role, agent: &str, bead_id: &str, metadata: &BTreeMap<String, String>) -> PodSpec;
}
