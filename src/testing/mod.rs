pub mod in_memory;
pub mod mock_broker;

pub use in_memory::{
    InMemoryBacktestRunRepository, InMemoryEquitySnapshotRepository, InMemoryTradeRepository,
    InMemoryZoneRepository,
};
pub use mock_broker::MockBroker;
