use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rigctl_core::interfaces::NotesReader;

/// Serves canned `key: value` notes text per bead id.
#[derive(Default)]
pub struct FakeNotesReader {
    notes: Mutex<HashMap<String, String>>,
}

impl FakeNotesReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, bead_id: &str, notes: &str) {
        self.notes.lock().unwrap().insert(bead_id.to_string(), notes.to_string());
    }
}

#[async_trait]
impl NotesReader for FakeNotesReader {
    async fn get_agent_notes(&self, bead_id: &str) -> anyhow::Result<String> {
        Ok(self.notes.lock().unwrap().get(bead_id).cloned().unwrap_or_default())
    }
}
