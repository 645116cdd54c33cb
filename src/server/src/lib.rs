pub mod error;
pub mod handler;
pub mod message;
pub mod opcodes;
pub mod server;
pub mod transport;

// Re-export commonly used types
pub use error::{RpcError, ServerError};
pub use handler::RequestHandler;
pub use message::{roundtrip, Frame, ReportEntry, Request, Response, Status};
pub use opcodes::*;
pub use server::Server;
pub use transport::TcpGossipTransport;
