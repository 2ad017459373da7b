use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use rigctl_core::constants::REGISTRY_HTTP_TIMEOUT_SECS;
use rigctl_core::err_impl;
use rigctl_core::errors::EmptyResult;
use tracing::*;

err_impl! {DigestTrackerError,
    #[error("registry manifest query for {0} did not return a content digest")]
    NoContentDigest(String),
}

#[derive(Clone, Debug, Default)]
struct DigestEntry {
    /// Last registry-confirmed digest. Only this field drives drift.
    known_good: Option<String>,
    /// First digest observed on a running pod; baseline only, never overwritten.
    observed: Option<String>,
    /// Candidate awaiting confirmation, plus how many consecutive matching
    /// registry responses it has received.
    pending: Option<String>,
    pending_count: u32,
}

/// Detects that a mutable image tag (e.g. `:latest`) now resolves to a new
/// immutable digest, confirming a candidate across `threshold` consecutive
/// registry responses before treating it as drift, so a single transient
/// multi-arch manifest response can't cycle every pod of a role.
pub struct DigestTracker {
    entries: RwLock<HashMap<String, DigestEntry>>,
    threshold: u32,
    client: reqwest::Client,
    /// Overrides the registry host for `check_registry_digest`, used in
    /// tests to point at an `httpmock` server instead of a real registry.
    registry_base_override: Option<String>,
}

impl DigestTracker {
    pub fn new(threshold: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REGISTRY_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(DigestTracker {
            entries: RwLock::new(HashMap::new()),
            threshold: threshold.max(1),
            client,
            registry_base_override: None,
        })
    }

    pub fn with_registry_base_override(mut self, base: impl Into<String>) -> Self {
        self.registry_base_override = Some(base.into());
        self
    }

    pub fn latest_digest(&self, image: &str) -> Option<String> {
        self.entries.read().unwrap().get(image).and_then(|e| e.known_good.clone())
    }

    /// Observe a digest reported by a running pod. Sets the baseline once,
    /// if absent; never itself signals drift.
    pub fn record_digest(&self, image: &str, digest: &str) -> bool {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(image.to_string()).or_default();
        if entry.observed.is_none() {
            entry.observed = Some(digest.to_string());
        }
        false
    }

    /// Register a registry-confirmed digest. Returns true iff a confirmed
    /// transition to a new digest just occurred.
    pub fn record_registry_digest(&self, image: &str, digest: &str) -> bool {
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(image.to_string()).or_default();

        if entry.known_good.as_deref() == Some(digest) {
            entry.pending = None;
            entry.pending_count = 0;
            return false;
        }

        if entry.pending.as_deref() == Some(digest) {
            entry.pending_count += 1;
        } else {
            entry.pending = Some(digest.to_string());
            entry.pending_count = 1;
        }

        if entry.pending_count >= self.threshold {
            let had_known_good = entry.known_good.is_some();
            entry.known_good = Some(digest.to_string());
            entry.pending = None;
            entry.pending_count = 0;
            return had_known_good;
        }

        false
    }

    /// One manifest HEAD-style query, returning the registry's content digest.
    #[instrument(skip(self))]
    pub async fn check_registry_digest(&self, image: &str) -> anyhow::Result<String> {
        let (base, repository, reference) = self.resolve_manifest_url_parts(image);
        let url = format!("{base}/v2/{repository}/manifests/{reference}");

        let resp = self
            .client
            .head(&url)
            .header("Accept", "application/vnd.docker.distribution.manifest.v2+json")
            .send()
            .await?
            .error_for_status()?;

        resp.headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DigestTrackerError::no_content_digest(image))
    }

    fn resolve_manifest_url_parts(&self, image: &str) -> (String, String, String) {
        if let Some(base) = &self.registry_base_override {
            let (repository, reference) = split_repo_and_reference(image);
            return (base.clone(), repository, reference);
        }

        let (registry, rest) = match image.split_once('/') {
            Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => (host.to_string(), rest),
            _ => ("registry-1.docker.io".to_string(), image),
        };
        let (repository, reference) = split_repo_and_reference(rest);
        (format!("https://{registry}"), repository, reference)
    }

    /// Snapshot the tracked image set under a read-lock, then poll and
    /// record each one. Per-image failures are logged and skipped; they
    /// never affect other images and never themselves trigger drift.
    pub async fn refresh_images(&self) -> EmptyResult {
        let images: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        for image in images {
            match self.check_registry_digest(&image).await {
                Ok(digest) => {
                    if self.record_registry_digest(&image, &digest) {
                        info!("registry-confirmed digest transition for {image}");
                        metrics::counter!(rigctl_core::metrics::keys::DIGEST_DRIFT_CONFIRMED).increment(1);
                    }
                },
                Err(err) => {
                    warn!("registry query for {image} failed, skipping this refresh: {err:?}");
                },
            }
        }
        Ok(())
    }
}

fn split_repo_and_reference(rest: &str) -> (String, String) {
    match rest.rsplit_once(':') {
        Some((repo, tag)) => (repo.to_string(), tag.to_string()),
        None => (rest.to_string(), "latest".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;
    use test_log::test;

    use super::*;

    #[test]
    fn pod_observation_never_signals_drift_and_sets_baseline_once() {
        let tracker = DigestTracker::new(2).unwrap();
        assert!(!tracker.record_digest("img", "aaa"));
        assert!(!tracker.record_digest("img", "bbb"));
        assert_eq!(tracker.latest_digest("img"), None);
    }

    #[test]
    fn registry_digest_flap_flop_requires_consecutive_confirmation() {
        let tracker = DigestTracker::new(2).unwrap();
        // Establish known-good="aaa" first, matching the scenario's starting state.
        tracker.record_registry_digest("img", "aaa");
        tracker.record_registry_digest("img", "aaa");
        assert_eq!(tracker.latest_digest("img"), Some("aaa".to_string()));

        assert!(!tracker.record_registry_digest("img", "bbb"));
        assert!(!tracker.record_registry_digest("img", "ccc"));
        assert!(tracker.record_registry_digest("img", "ccc"));
        assert_eq!(tracker.latest_digest("img"), Some("ccc".to_string()));
    }

    #[test]
    fn matching_registry_response_clears_pending_state() {
        let tracker = DigestTracker::new(2).unwrap();
        // Bootstrap known-good to "aaa" (establishing a baseline is never itself a transition).
        assert!(!tracker.record_registry_digest("img", "aaa"));
        assert!(!tracker.record_registry_digest("img", "aaa"));
        assert_eq!(tracker.latest_digest("img"), Some("aaa".to_string()));

        // A transient "bbb" response followed by a matching "aaa" response clears the candidate.
        assert!(!tracker.record_registry_digest("img", "bbb"));
        assert!(!tracker.record_registry_digest("img", "aaa"));

        // So "bbb" must accumulate two fresh confirmations, not resume the cleared count.
        assert!(!tracker.record_registry_digest("img", "bbb"));
        assert!(tracker.record_registry_digest("img", "bbb"));
        assert_eq!(tracker.latest_digest("img"), Some("bbb".to_string()));
    }

    #[test]
    fn first_confirmation_does_not_count_as_transition() {
        let tracker = DigestTracker::new(1).unwrap();
        assert!(!tracker.record_registry_digest("img", "aaa"));
        assert_eq!(tracker.latest_digest("img"), Some("aaa".to_string()));
    }

    #[test(tokio::test)]
    async fn check_registry_digest_reads_content_digest_header() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::HEAD).path("/v2/library/agent/manifests/latest");
            then.status(200).header("Docker-Content-Digest", "sha256:deadbeef");
        });

        let tracker = DigestTracker::new(2).unwrap().with_registry_base_override(server.base_url());
        let digest = tracker.check_registry_digest("library/agent:latest").await.unwrap();
        assert_eq!(digest, "sha256:deadbeef");
        mock.assert();
    }
}
