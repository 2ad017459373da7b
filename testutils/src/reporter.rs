use std::sync::Mutex;

use async_trait::async_trait;
use rigctl_core::errors::EmptyResult;
use rigctl_core::interfaces::{
    PodStatusReport,
    Reporter,
};

/// Records every status report and `sync_all` call for test assertions.
#[derive(Default)]
pub struct FakeReporter {
    pub reports: Mutex<Vec<(String, PodStatusReport)>>,
    pub sync_all_calls: Mutex<usize>,
}

#[async_trait]
impl Reporter for FakeReporter {
    async fn report_pod_status(&self, agent_name: &str, report: PodStatusReport) -> EmptyResult {
        self.reports.lock().unwrap().push((agent_name.to_string(), report));
        Ok(())
    }

    async fn sync_all(&self) -> EmptyResult {
        *self.sync_all_calls.lock().unwrap() += 1;
        Ok(())
    }
}
