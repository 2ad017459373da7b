use crate::constants::FINGERPRINT_PREFIX;
use crate::model::Role;

/// The canonical pod name `gt-<rig>-<role>-<agent>`, the join key between
/// desired beads and actual pods.
pub fn fingerprint(rig: &str, role: Role, agent: &str) -> String {
    format!("{FINGERPRINT_PREFIX}{rig}-{}-{agent}", role.as_str())
}

/// Recover a pod's role from its fingerprint alone: strip the `gt-` prefix,
/// split on `-`, the second segment is the role. `UpgradeTracker` needs this
/// because its `upgrading` set is keyed by pod name only.
pub fn role_from_pod_name(name: &str) -> Option<Role> {
    let stripped = name.strip_prefix(FINGERPRINT_PREFIX)?;
    let mut parts = stripped.split('-');
    parts.next()?; // rig
    let role = parts.next()?;
    role.parse().ok()
}
