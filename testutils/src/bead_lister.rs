use std::sync::Mutex;

use async_trait::async_trait;
use rigctl_core::interfaces::BeadLister;
use rigctl_core::model::AgentBead;

/// An in-memory [`BeadLister`] whose desired set is set directly by tests.
/// `fail_next` lets a single test simulate a desired-state listing failure
/// (the reconciler must abort the pass without mutating anything).
#[derive(Default)]
pub struct FakeBeadLister {
    beads: Mutex<Vec<AgentBead>>,
    fail_next: Mutex<bool>,
}

impl FakeBeadLister {
    pub fn new(beads: Vec<AgentBead>) -> Self {
        FakeBeadLister {
            beads: Mutex::new(beads),
            fail_next: Mutex::new(false),
        }
    }

    pub fn set(&self, beads: Vec<AgentBead>) {
        *self.beads.lock().unwrap() = beads;
    }

    pub fn fail_next_list(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl BeadLister for FakeBeadLister {
    async fn list_agent_beads(&self) -> anyhow::Result<Vec<AgentBead>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            anyhow::bail!("fake bead lister failure");
        }
        Ok(self.beads.lock().unwrap().clone())
    }
}
