pub mod broker_set;
pub mod discovery;
pub mod transport;

pub use broker_set::{BrokerEndpoint, BrokerSet};
pub use discovery::Discovery;
pub use transport::MqttTransport;
