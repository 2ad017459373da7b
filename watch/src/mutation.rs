use std::collections::BTreeMap;

use rigctl_core::model::{
    LifecycleEvent,
    LifecycleEventData,
    Role,
};
use serde::Deserialize;

const AGENT_ISSUE_TYPE: &str = "agent";
const RIG_LABEL_PREFIX: &str = "rig:";
const ROLE_LABEL_PREFIX: &str = "role:";
const AGENT_LABEL_PREFIX: &str = "agent:";

/// The JSON envelope carried by each mutation-bus message.
#[derive(Clone, Debug, Deserialize)]
pub struct MutationEnvelope {
    #[serde(rename = "type")]
    pub mutation_type: String,
    pub issue_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub old_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub issue_type: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub await_type: Option<String>,
}

/// An issue counts as an agent bead only if it's tagged with the agent
/// issue type and carries `rig:`/`role:`/`agent:` labels identifying it.
pub fn is_agent_bead(env: &MutationEnvelope) -> bool {
    env.issue_type == AGENT_ISSUE_TYPE && extract_identity(env).is_some()
}

fn extract_identity(env: &MutationEnvelope) -> Option<(String, Role, String)> {
    let mut rig = None;
    let mut role = None;
    let mut agent = None;
    for label in &env.labels {
        if let Some(v) = label.strip_prefix(RIG_LABEL_PREFIX) {
            rig = Some(v.to_string());
        } else if let Some(v) = label.strip_prefix(ROLE_LABEL_PREFIX) {
            role = v.parse::<Role>().ok();
        } else if let Some(v) = label.strip_prefix(AGENT_LABEL_PREFIX) {
            agent = Some(v.to_string());
        }
    }
    Some((rig?, role?, agent?))
}

fn extract_metadata(env: &MutationEnvelope) -> BTreeMap<String, String> {
    env.labels
        .iter()
        .filter(|l| {
            !l.starts_with(RIG_LABEL_PREFIX) && !l.starts_with(ROLE_LABEL_PREFIX) && !l.starts_with(AGENT_LABEL_PREFIX)
        })
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Map a mutation envelope to exactly one lifecycle event, or suppress it.
///
/// Total and deterministic: the result depends only on the fields of
/// `env`, never on any watcher or controller state. Rejects anything that
/// doesn't carry identifying labels or isn't the agent issue type.
pub fn map_mutation(env: &MutationEnvelope) -> Option<LifecycleEvent> {
    if !is_agent_bead(env) {
        return None;
    }
    let (rig, role, agent) = extract_identity(env)?;
    let data = LifecycleEventData {
        rig,
        role,
        agent,
        bead_id: env.issue_id.clone(),
        metadata: extract_metadata(env),
    };

    let old = env.old_status.as_deref();
    let new = env.new_status.as_deref();
    let await_type = env.await_type.as_deref();

    match (env.mutation_type.as_str(), old, new, await_type) {
        (_, _, _, Some("stuck")) => Some(LifecycleEvent::Stuck(data)),
        ("issue_deleted", ..) => Some(LifecycleEvent::Kill(data)),
        (_, _, Some("killed"), _) => Some(LifecycleEvent::Kill(data)),
        (_, _, Some("done"), _) | (_, _, Some("closed"), _) => Some(LifecycleEvent::Done(data)),
        ("issue_created", _, Some("ready"), _) => Some(LifecycleEvent::Spawn(data)),
        (_, Some(o), Some("in_progress"), _) if o != "in_progress" => Some(LifecycleEvent::Spawn(data)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn base_env() -> MutationEnvelope {
        MutationEnvelope {
            mutation_type: "issue_updated".into(),
            issue_id: "bead-1".into(),
            title: "test".into(),
            assignee: None,
            actor: None,
            timestamp: "2026-07-28T00:00:00.000000000Z".into(),
            old_status: None,
            new_status: None,
            parent_id: None,
            issue_type: "agent".into(),
            labels: vec!["rig:gastown".into(), "role:polecat".into(), "agent:furiosa".into()],
            await_type: None,
        }
    }

    #[test]
    fn rejects_non_agent_issue_type() {
        let mut env = base_env();
        env.issue_type = "task".into();
        env.new_status = Some("in_progress".into());
        env.old_status = Some("backlog".into());
        assert!(map_mutation(&env).is_none());
    }

    #[test]
    fn rejects_missing_identity_labels() {
        let mut env = base_env();
        env.labels = vec!["rig:gastown".into()];
        env.new_status = Some("in_progress".into());
        env.old_status = Some("backlog".into());
        assert!(map_mutation(&env).is_none());
    }

    #[rstest]
    #[case("issue_created", None, Some("ready"), None, true)]
    #[case("issue_updated", Some("backlog"), Some("in_progress"), None, true)]
    #[case("issue_updated", Some("in_progress"), Some("in_progress"), None, false)]
    fn spawn_mapping(
        #[case] mutation_type: &str,
        #[case] old: Option<&str>,
        #[case] new: Option<&str>,
        #[case] await_type: Option<&str>,
        #[case] expect_spawn: bool,
    ) {
        let mut env = base_env();
        env.mutation_type = mutation_type.into();
        env.old_status = old.map(String::from);
        env.new_status = new.map(String::from);
        env.await_type = await_type.map(String::from);
        let event = map_mutation(&env);
        assert_eq!(matches!(event, Some(LifecycleEvent::Spawn(_))), expect_spawn);
    }

    #[test]
    fn done_mapping_on_closed_or_done_status() {
        let mut env = base_env();
        env.new_status = Some("closed".into());
        assert!(matches!(map_mutation(&env), Some(LifecycleEvent::Done(_))));

        let mut env = base_env();
        env.new_status = Some("done".into());
        assert!(matches!(map_mutation(&env), Some(LifecycleEvent::Done(_))));
    }

    #[test]
    fn kill_mapping_on_delete_or_killed_status() {
        let mut env = base_env();
        env.mutation_type = "issue_deleted".into();
        assert!(matches!(map_mutation(&env), Some(LifecycleEvent::Kill(_))));

        let mut env = base_env();
        env.new_status = Some("killed".into());
        assert!(matches!(map_mutation(&env), Some(LifecycleEvent::Kill(_))));
    }

    #[test]
    fn stuck_mapping_takes_priority_over_status() {
        let mut env = base_env();
        env.new_status = Some("closed".into());
        env.await_type = Some("stuck".into());
        assert!(matches!(map_mutation(&env), Some(LifecycleEvent::Stuck(_))));
    }

    #[test]
    fn suppresses_unrecognized_transitions() {
        let mut env = base_env();
        env.old_status = Some("in_progress".into());
        env.new_status = Some("in_review".into());
        assert!(map_mutation(&env).is_none());
    }

    #[test]
    fn carries_remaining_labels_as_metadata() {
        let mut env = base_env();
        env.labels.push("priority:high".into());
        env.new_status = Some("closed".into());
        let event = map_mutation(&env).unwrap();
        assert_eq!(event.data().metadata.get("priority").map(String::as_str), Some("high"));
    }
}
