pub mod bead_lister;
pub mod bus;
pub mod notes;
pub mod pod_runtime;
pub mod reporter;

pub use bead_lister::FakeBeadLister;
pub use bus::{
    FakeBusConnector,
    FakeBusSubscription,
};
pub use notes::FakeNotesReader;
pub use pod_runtime::FakePodRuntime;
pub use reporter::FakeReporter;
