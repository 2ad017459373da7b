use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use clockabilly::{
    Clockable,
    DateTime,
    Utc,
};
use rigctl_core::model::{
    Role,
    UpgradeStrategy,
};
use tracing::*;

#[derive(Default)]
struct State {
    upgrading: HashMap<String, DateTime<Utc>>,
    pending_by_role: HashMap<Role, Vec<String>>,
}

/// Serializes drift-driven pod replacements per role and enforces that
/// `witness` (the `Last` strategy) only progresses once no `Rolling` role
/// has pending or in-flight work.
pub struct UpgradeTracker {
    state: Mutex<State>,
    clock: Box<dyn Clockable + Send + Sync>,
}

impl UpgradeTracker {
    pub fn new(clock: Box<dyn Clockable + Send + Sync>) -> Self {
        UpgradeTracker { state: Mutex::new(State::default()), clock }
    }

    /// Clears `pending_by_role`; called at the top of every reconcile pass.
    pub fn reset(&self) {
        self.state.lock().unwrap().pending_by_role.clear();
    }

    pub fn register_drift(&self, pod: &str, role: Role) {
        self.state.lock().unwrap().pending_by_role.entry(role).or_default().push(pod.to_string());
    }

    pub fn mark_upgrading(&self, pod: &str) {
        let now = self.clock.now();
        self.state.lock().unwrap().upgrading.insert(pod.to_string(), now);
    }

    /// Called when a pod becomes ready, concluding the previous upgrade
    /// turn for its role.
    pub fn clear_upgrading(&self, pod: &str) {
        self.state.lock().unwrap().upgrading.remove(pod);
    }

    /// Purges in-flight entries older than `timeout`, recovering from pods
    /// that were deleted for replacement but never became ready.
    pub fn clean_stale_upgrades(&self, timeout: Duration) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();
        let stale: Vec<String> = state
            .upgrading
            .iter()
            .filter(|(_, started)| (now - **started).to_std().map(|d| d >= timeout).unwrap_or(true))
            .map(|(pod, _)| pod.clone())
            .collect();
        for pod in stale {
            warn!("purging stale upgrade entry for {pod}");
            state.upgrading.remove(&pod);
        }
    }

    /// The decision oracle: may `pod` (of `role`) be replaced this pass?
    pub fn can_upgrade(&self, pod: &str, role: Role) -> bool {
        let state = self.state.lock().unwrap();
        match role.upgrade_strategy() {
            UpgradeStrategy::Skip => false,
            UpgradeStrategy::Rolling => !state.upgrading.keys().any(|p| p != pod && rigctl_core::fingerprint::role_from_pod_name(p) == Some(role)),
            UpgradeStrategy::Last => {
                let any_rolling_pending = state
                    .pending_by_role
                    .keys()
                    .any(|r| *r != role && r.upgrade_strategy() == UpgradeStrategy::Rolling);
                let any_rolling_upgrading = state.upgrading.keys().any(|p| {
                    rigctl_core::fingerprint::role_from_pod_name(p).is_some_and(|r| r.upgrade_strategy() == UpgradeStrategy::Rolling)
                });
                let any_other_last_upgrading = state.upgrading.keys().any(|p| {
                    p != pod && rigctl_core::fingerprint::role_from_pod_name(p).is_some_and(|r| r.upgrade_strategy() == UpgradeStrategy::Last)
                });
                !any_rolling_pending && !any_rolling_upgrading && !any_other_last_upgrading
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use clockabilly::mock::MockUtcClock;

    use super::*;

    fn tracker_at(ts: i64) -> (UpgradeTracker, MockUtcClock) {
        let clock = MockUtcClock::new(ts);
        let handle = (*clock).clone();
        (UpgradeTracker::new(clock), handle)
    }

    #[test]
    fn skip_role_never_upgrades() {
        let tracker = UpgradeTracker::new(clockabilly::UtcClock::new());
        assert!(!tracker.can_upgrade("gt-gastown-polecat-furiosa", Role::Polecat));
    }

    #[test]
    fn rolling_role_allows_one_in_flight() {
        let tracker = UpgradeTracker::new(clockabilly::UtcClock::new());
        assert!(tracker.can_upgrade("gt-gastown-crew-toolbox", Role::Crew));
        tracker.mark_upgrading("gt-gastown-crew-toolbox");
        assert!(!tracker.can_upgrade("gt-gastown-crew-other", Role::Crew));
    }

    #[test]
    fn witness_last_waits_for_rolling_roles() {
        let tracker = UpgradeTracker::new(clockabilly::UtcClock::new());
        tracker.reset();
        tracker.register_drift("gt-gastown-crew-toolbox", Role::Crew);
        tracker.register_drift("gt-gastown-witness-main", Role::Witness);

        assert!(tracker.can_upgrade("gt-gastown-crew-toolbox", Role::Crew));
        assert!(!tracker.can_upgrade("gt-gastown-witness-main", Role::Witness));

        tracker.mark_upgrading("gt-gastown-crew-toolbox");
        assert!(!tracker.can_upgrade("gt-gastown-witness-main", Role::Witness));

        tracker.reset();
        tracker.clear_upgrading("gt-gastown-crew-toolbox");
        assert!(tracker.can_upgrade("gt-gastown-witness-main", Role::Witness));
    }

    #[test]
    fn at_most_one_last_role_upgrading_at_once() {
        let tracker = UpgradeTracker::new(clockabilly::UtcClock::new());
        assert!(tracker.can_upgrade("gt-gastown-witness-main", Role::Witness));
        tracker.mark_upgrading("gt-gastown-witness-main");
        assert!(!tracker.can_upgrade("gt-gastown-witness-backup", Role::Witness));
    }

    #[test]
    fn clean_stale_upgrades_purges_entries_past_timeout() {
        let (tracker, mut clock) = tracker_at(0);
        tracker.mark_upgrading("gt-gastown-crew-toolbox");
        clock.advance(700);
        tracker.clean_stale_upgrades(Duration::from_secs(600));
        assert!(tracker.can_upgrade("gt-gastown-crew-other", Role::Crew));
    }
}
