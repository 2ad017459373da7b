pub mod bus;
pub mod mutation;
pub mod nats;
pub mod watcher;

pub use bus::{
    BusAck,
    BusConnector,
    BusMessage,
    BusSubscription,
};
pub use mutation::{
    MutationEnvelope,
    is_agent_bead,
    map_mutation,
};
pub use nats::NatsBusConnector;
pub use watcher::EventWatcher;
