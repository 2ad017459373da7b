use clap::Parser;
use rigctl_core::constants::{
    BEADS_BASE_URL_ENV_VAR,
    BUS_CONSUMER_NAME_ENV_VAR,
    BUS_URL_ENV_VAR,
    DEFAULT_DIGEST_REFRESH_INTERVAL_SECS,
    DEFAULT_MAX_CONCURRENT_PODS,
    DEFAULT_REGISTRY_CONFIRM_THRESHOLD,
    DEFAULT_SPAWN_BURST_LIMIT,
    DEFAULT_SYNC_INTERVAL_SECS,
    DIGEST_REFRESH_INTERVAL_SECS_ENV_VAR,
    KUBECONFIG_ENV_VAR,
    LOG_LEVEL_ENV_VAR,
    MAX_CONCURRENT_PODS_ENV_VAR,
    NAMESPACE_ENV_VAR,
    REGISTRY_CONFIRM_THRESHOLD_ENV_VAR,
    SPAWN_BURST_LIMIT_ENV_VAR,
    SYNC_INTERVAL_SECS_ENV_VAR,
};

/// Daemon configuration. Every flag is env-overridable per spec.md section 6
/// (CLI & env): flags win when both are given, matching `clap`'s default
/// precedence for `env`-bound args.
#[derive(Clone, Debug, Parser)]
#[command(name = "rigctl", about = "Reconciles rig agent beads against a pod runtime")]
pub struct Options {
    /// Namespace the pod runtime is scoped to.
    #[arg(long, env = NAMESPACE_ENV_VAR, default_value = "default")]
    pub namespace: String,

    /// Path to a kubeconfig file. Falls back to in-cluster config, then the
    /// default kubeconfig location, when unset. Threaded through as the
    /// `KUBECONFIG` env var before client inference, matching how `kube`
    /// itself discovers config.
    #[arg(long, env = KUBECONFIG_ENV_VAR)]
    pub kubeconfig: Option<String>,

    #[arg(short, long, env = LOG_LEVEL_ENV_VAR, default_value = "info")]
    pub log_level: String,

    #[arg(long, env = SPAWN_BURST_LIMIT_ENV_VAR, default_value_t = DEFAULT_SPAWN_BURST_LIMIT)]
    pub spawn_burst_limit: usize,

    /// 0 disables the concurrency cap.
    #[arg(long, env = MAX_CONCURRENT_PODS_ENV_VAR, default_value_t = DEFAULT_MAX_CONCURRENT_PODS)]
    pub max_concurrent_pods: usize,

    #[arg(long, env = SYNC_INTERVAL_SECS_ENV_VAR, default_value_t = DEFAULT_SYNC_INTERVAL_SECS)]
    pub sync_interval_secs: u64,

    #[arg(long, env = REGISTRY_CONFIRM_THRESHOLD_ENV_VAR, default_value_t = DEFAULT_REGISTRY_CONFIRM_THRESHOLD)]
    pub registry_confirm_threshold: u32,

    #[arg(long, env = DIGEST_REFRESH_INTERVAL_SECS_ENV_VAR, default_value_t = DEFAULT_DIGEST_REFRESH_INTERVAL_SECS)]
    pub digest_refresh_interval_secs: u64,

    /// Durable mutation-bus URL (NATS).
    #[arg(long, env = BUS_URL_ENV_VAR, default_value = "nats://localhost:4222")]
    pub bus_url: String,

    /// Durable consumer name. Stable across restarts so the stream position
    /// and redelivery-on-crash guarantees hold.
    #[arg(long, env = BUS_CONSUMER_NAME_ENV_VAR, default_value = "rigctl")]
    pub bus_consumer_name: String,

    #[arg(long, default_value = "rigctl-mutations")]
    pub bus_stream_name: String,

    #[arg(long, default_value = "gastown.mutations.agent")]
    pub bus_subject: String,

    /// Base URL of the beads/notes/status HTTP API. The work-item database
    /// itself is out of scope; this is just the thin transport the opaque
    /// `BeadLister`/`NotesReader`/`Reporter` traits are implemented against.
    #[arg(long, env = BEADS_BASE_URL_ENV_VAR, default_value = "http://localhost:8080")]
    pub beads_base_url: String,
}
