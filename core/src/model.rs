use std::collections::BTreeMap;

use serde::{
    Deserialize,
    Serialize,
};

/// How a role's pods are replaced during drift-driven upgrades.
///
/// See [`Role::upgrade_strategy`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpgradeStrategy {
    /// Never proactively replaced; left to run to completion.
    Skip,
    /// Replaced one at a time, at most one in flight per role.
    Rolling,
    /// Like `Rolling`, but only once no `Rolling` role has pending or in-flight work.
    Last,
}

/// Whether a role's pods are expected to exit on their own (`Ephemeral`) or
/// run indefinitely (`Persistent`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoleType {
    Ephemeral,
    Persistent,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Polecat,
    Crew,
    Witness,
    Refinery,
    Mayor,
    Deacon,
}

impl Role {
    pub fn upgrade_strategy(&self) -> UpgradeStrategy {
        match self {
            Role::Polecat => UpgradeStrategy::Skip,
            Role::Crew | Role::Refinery | Role::Mayor | Role::Deacon => UpgradeStrategy::Rolling,
            Role::Witness => UpgradeStrategy::Last,
        }
    }

    pub fn role_type(&self) -> RoleType {
        match self {
            Role::Polecat => RoleType::Ephemeral,
            Role::Crew | Role::Witness | Role::Refinery | Role::Mayor | Role::Deacon => RoleType::Persistent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Polecat => "polecat",
            Role::Crew => "crew",
            Role::Witness => "witness",
            Role::Refinery => "refinery",
            Role::Mayor => "mayor",
            Role::Deacon => "deacon",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "polecat" => Ok(Role::Polecat),
            "crew" => Ok(Role::Crew),
            "witness" => Ok(Role::Witness),
            "refinery" => Ok(Role::Refinery),
            "mayor" => Ok(Role::Mayor),
            "deacon" => Ok(Role::Deacon),
            _ => anyhow::bail!("unknown role: {s}"),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Desired-state record: one declared agent work item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentBead {
    pub bead_id: String,
    pub rig: String,
    pub role: Role,
    pub agent: String,
    pub metadata: BTreeMap<String, String>,
}

impl AgentBead {
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::fingerprint(&self.rig, self.role, &self.agent)
    }
}

/// A lifecycle event derived from a bus mutation, or injected directly in tests.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    Spawn(LifecycleEventData),
    Done(LifecycleEventData),
    Stuck(LifecycleEventData),
    Kill(LifecycleEventData),
}

#[derive(Clone, Debug, PartialEq)]
pub struct LifecycleEventData {
    pub rig: String,
    pub role: Role,
    pub agent: String,
    pub bead_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl LifecycleEvent {
    pub fn data(&self) -> &LifecycleEventData {
        match self {
            LifecycleEvent::Spawn(d) | LifecycleEvent::Done(d) | LifecycleEvent::Stuck(d) | LifecycleEvent::Kill(d) => d,
        }
    }

    pub fn fingerprint(&self) -> String {
        let d = self.data();
        crate::fingerprint::fingerprint(&d.rig, d.role, &d.agent)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

/// Actual-state record: one observed pod.
#[derive(Clone, Debug, PartialEq)]
pub struct PodRecord {
    pub name: String,
    pub namespace: String,
    pub phase: PodPhase,
    pub ready: bool,
    pub images: BTreeMap<String, String>,
    pub digests: BTreeMap<String, String>,
    pub bead_id: Option<String>,
    pub rig: String,
    pub role: Role,
    pub agent: String,
}

impl PodRecord {
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::fingerprint(&self.rig, self.role, &self.agent)
    }
}
