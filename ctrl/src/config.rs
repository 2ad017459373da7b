use std::time::Duration;

use rigctl_core::constants::{
    DEFAULT_MAX_CONCURRENT_PODS,
    DEFAULT_REGISTRY_CONFIRM_THRESHOLD,
    DEFAULT_SPAWN_BURST_LIMIT,
    DEFAULT_SYNC_INTERVAL_SECS,
    DEFAULT_UPGRADE_STALE_TIMEOUT_SECS,
};

/// Reconcile-pass tunables. `normalized` applies the boundary coercions
/// from spec.md's Boundary behaviors section rather than scattering `if x
/// == 0` checks through [`crate::reconciler::Reconciler`].
#[derive(Clone, Copy, Debug)]
pub struct ReconcilerConfig {
    pub spawn_burst_limit: usize,
    pub max_concurrent_pods: usize,
    pub registry_confirm_threshold: u32,
    pub upgrade_stale_timeout: Duration,
    pub sync_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            spawn_burst_limit: DEFAULT_SPAWN_BURST_LIMIT,
            max_concurrent_pods: DEFAULT_MAX_CONCURRENT_PODS,
            registry_confirm_threshold: DEFAULT_REGISTRY_CONFIRM_THRESHOLD,
            upgrade_stale_timeout: Duration::from_secs(DEFAULT_UPGRADE_STALE_TIMEOUT_SECS),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
        }
    }
}

impl ReconcilerConfig {
    /// `SpawnBurstLimit=0` is coerced to the default (3); `MaxConcurrentPods=0`
    /// is left as-is and means "no cap", per spec.md's Boundary behaviors.
    pub fn normalized(mut self) -> Self {
        if self.spawn_burst_limit == 0 {
            self.spawn_burst_limit = DEFAULT_SPAWN_BURST_LIMIT;
        }
        if self.registry_confirm_threshold == 0 {
            self.registry_confirm_threshold = DEFAULT_REGISTRY_CONFIRM_THRESHOLD;
        }
        self
    }

    pub fn concurrency_cap_enabled(&self) -> bool {
        self.max_concurrent_pods > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_burst_limit_coerces_to_default() {
        let cfg = ReconcilerConfig { spawn_burst_limit: 0, ..Default::default() }.normalized();
        assert_eq!(cfg.spawn_burst_limit, DEFAULT_SPAWN_BURST_LIMIT);
    }

    #[test]
    fn zero_max_concurrent_pods_disables_cap() {
        let cfg = ReconcilerConfig { max_concurrent_pods: 0, ..Default::default() }.normalized();
        assert!(!cfg.concurrency_cap_enabled());
    }
}
