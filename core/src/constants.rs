// Well-known labels and annotations written by SpecBuilder and read by the reconciler.
pub const APP_KUBERNETES_IO_NAME_KEY: &str = "app.kubernetes.io/name";

pub const RIG_LABEL_KEY: &str = "gastown.io/rig";
pub const ROLE_LABEL_KEY: &str = "gastown.io/role";
pub const AGENT_LABEL_KEY: &str = "gastown.io/agent";
pub const BEAD_ID_ANNOTATION_KEY: &str = "gastown.io/bead-id";

// The container name PodSpec carries agent images under; rigctl only ever
// manages single-container agent pods at the fingerprint level.
pub const AGENT_CONTAINER_NAME: &str = "agent";

// The app.kubernetes.io/name label value written to every pod this controller manages.
pub const APP_LABEL_VALUE: &str = "rigctl";

// Pod-name fingerprint prefix: gt-<rig>-<role>-<agent>
pub const FINGERPRINT_PREFIX: &str = "gt-";

// Env vars
pub const NAMESPACE_ENV_VAR: &str = "RIGCTL_NAMESPACE";
pub const KUBECONFIG_ENV_VAR: &str = "RIGCTL_KUBECONFIG";
pub const LOG_LEVEL_ENV_VAR: &str = "RIGCTL_LOG_LEVEL";
pub const SPAWN_BURST_LIMIT_ENV_VAR: &str = "RIGCTL_SPAWN_BURST_LIMIT";
pub const MAX_CONCURRENT_PODS_ENV_VAR: &str = "RIGCTL_MAX_CONCURRENT_PODS";
pub const SYNC_INTERVAL_SECS_ENV_VAR: &str = "RIGCTL_SYNC_INTERVAL_SECS";
pub const BUS_URL_ENV_VAR: &str = "RIGCTL_BUS_URL";
pub const BUS_CONSUMER_NAME_ENV_VAR: &str = "RIGCTL_BUS_CONSUMER_NAME";
pub const REGISTRY_CONFIRM_THRESHOLD_ENV_VAR: &str = "RIGCTL_REGISTRY_CONFIRM_THRESHOLD";
pub const DIGEST_REFRESH_INTERVAL_SECS_ENV_VAR: &str = "RIGCTL_DIGEST_REFRESH_INTERVAL_SECS";
pub const BEADS_BASE_URL_ENV_VAR: &str = "RIGCTL_BEADS_BASE_URL";

// Defaults
pub const DEFAULT_SPAWN_BURST_LIMIT: usize = 3;
pub const DEFAULT_MAX_CONCURRENT_PODS: usize = 0; // 0 == disabled
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REGISTRY_CONFIRM_THRESHOLD: u32 = 2;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_UPGRADE_STALE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_DIGEST_REFRESH_INTERVAL_SECS: u64 = 60;

// Timing
pub const BUS_BACKOFF_INITIAL_SECS: u64 = 1;
pub const BUS_BACKOFF_MAX_SECS: u64 = 30;
pub const REGISTRY_HTTP_TIMEOUT_SECS: u64 = 10;

#[cfg(feature = "testutils")]
mod test_constants {
    pub const TEST_NAMESPACE: &str = "test-ns";
    pub const TEST_RIG: &str = "gastown";
    pub const TEST_AGENT: &str = "furiosa";
}

#[cfg(feature = "testutils")]
pub use test_constants::*;
