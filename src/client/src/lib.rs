pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod frontend;

pub use cache::{ResponseCache, DEFAULT_CACHE_CAPACITY};
pub use channel::{Connector, Fault, ReplicaChannel, TcpChannel, TcpConnector};
pub use config::{FrontendConfig, Mode};
pub use error::ClientError;
pub use frontend::ClientFrontend;
