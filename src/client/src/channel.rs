use std::future::Future;
use log::debug;
use server::{roundtrip, Request, Response, RpcError, Status};
use tokio::net::TcpStream;

/// Outcome of a failed call, as seen by the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No answer within the deadline.
    Timeout,
    /// Connection-level failure.
    Unavailable(String),
    /// The replica answered with an error. Never retried.
    Rejected(RpcError),
}

/// One open connection to a replica.
pub trait ReplicaChannel: Send {
    fn call(&mut self, request: &Request) -> impl Future<Output = Result<Response, Fault>> + Send;
}

/// Opens channels to replica addresses.
pub trait Connector: Send + Sync {
    type Channel: ReplicaChannel;

    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Channel, Fault>> + Send;
}

/// Channel over the replica wire protocol.
///
/// The stream is checked out for each call, so a call cancelled by its
/// deadline drops the connection and the next call dials again.
pub struct TcpChannel {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpChannel {
    pub fn address(&self) -> &str {
        &self.address
    }
}

fn classify(err: RpcError) -> Fault {
    match err.status {
        Status::Unavailable => Fault::Unavailable(err.message),
        Status::DeadlineExceeded => Fault::Timeout,
        _ => Fault::Rejected(err),
    }
}

impl ReplicaChannel for TcpChannel {
    fn call(&mut self, request: &Request) -> impl Future<Output = Result<Response, Fault>> + Send {
        let request = request.clone();
        async move {
            let mut stream = match self.stream.take() {
                Some(stream) => stream,
                None => {
                    debug!("Reconnecting to {}", self.address);
                    TcpStream::connect(&self.address)
                        .await
                        .map_err(|e| Fault::Unavailable(format!("{}: {}", self.address, e)))?
                }
            };

            let reply = roundtrip(&mut stream, &request)
                .await
                .map_err(|e| Fault::Unavailable(format!("{}: {}", self.address, e)))?;
            self.stream = Some(stream);
            reply.map_err(classify)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Channel = TcpChannel;

    fn connect(&self, address: &str) -> impl Future<Output = Result<TcpChannel, Fault>> + Send {
        let address = address.to_string();
        async move {
            let stream = TcpStream::connect(&address)
                .await
                .map_err(|e| Fault::Unavailable(format!("{}: {}", address, e)))?;
            Ok(TcpChannel {
                address,
                stream: Some(stream),
            })
        }
    }
}
