use async_trait::async_trait;
use rigctl_core::errors::EmptyResult;
use rigctl_core::interfaces::{
    BeadLister,
    NotesReader,
    PodStatusReport,
    Reporter,
};
use rigctl_core::model::AgentBead;

/// Thin HTTP client for the three opaque interfaces the beads database and
/// status-reporting transport present to the core: listing agent beads,
/// reading an agent's transport-metadata notes, and pushing pod status back.
/// The database's CRUD/schema/query-planning and the reporting transport's
/// wire protocol are both explicitly out of scope for this workspace — this
/// client is deliberately thin, doing no caching or retrying of its own
/// (that's the reconcile pass's job, at the next tick).
pub struct HttpBeadsClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBeadsClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(HttpBeadsClient {
            base_url: base_url.into(),
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl BeadLister for HttpBeadsClient {
    async fn list_agent_beads(&self) -> anyhow::Result<Vec<AgentBead>> {
        let resp = self
            .client
            .get(format!("{}/api/v1/agent-beads", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl NotesReader for HttpBeadsClient {
    async fn get_agent_notes(&self, bead_id: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .get(format!("{}/api/v1/agent-notes/{bead_id}", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl Reporter for HttpBeadsClient {
    async fn report_pod_status(&self, agent_name: &str, report: PodStatusReport) -> EmptyResult {
        self.client
            .post(format!("{}/api/v1/pod-status/{agent_name}", self.base_url))
            .json(&report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn sync_all(&self) -> EmptyResult {
        self.client
            .post(format!("{}/api/v1/sync-all", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
