pub mod consumer;
pub mod delivery;
pub mod enrichment;
pub mod forwarder;
pub mod pipeline;
pub mod stats;
pub mod supervisor;

pub use consumer::{AttemptOutcome, ConsumerState, ConsumptionLoop};
pub use delivery::{policy_from_config, DeliveryPolicy, GuardedForwarder};
pub use enrichment::{enrich, SequenceCounter};
pub use forwarder::{DaprPublisher, Forwarder};
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use stats::StatsRegister;
pub use supervisor::{spawn_consumption, start_from_config, ConsumerHandle};
