use std::collections::HashMap;
use std::future::Future;
use log::debug;
use tokio::net::TcpStream;
use cluster::{GossipFault, GossipTransport, UpdateRecord};
use storage::VectorClock;

use crate::message::{roundtrip, Request, Response, Status};

/// Gossip over the replica wire protocol.
///
/// Keeps one connection per peer. A connection is checked out for the
/// duration of a pull and only returned after a complete exchange, so a pull
/// cancelled by its deadline never leaves a half-read stream behind.
#[derive(Default)]
pub struct TcpGossipTransport {
    connections: HashMap<String, TcpStream>,
}

impl TcpGossipTransport {
    pub fn new() -> Self {
        TcpGossipTransport::default()
    }
}

impl GossipTransport for TcpGossipTransport {
    fn pull(
        &mut self,
        address: &str,
        clock: &VectorClock,
    ) -> impl Future<Output = Result<Vec<UpdateRecord>, GossipFault>> + Send {
        let address = address.to_string();
        let request = Request::GossipPull { clock: clock.clone() };
        let cached = self.connections.remove(&address);
        let connections = &mut self.connections;

        async move {
            // a cached connection may have been closed by a restarted peer
            let exchanged = match cached {
                Some(mut stream) => match roundtrip(&mut stream, &request).await {
                    Ok(reply) => Some((stream, reply)),
                    Err(e) => {
                        debug!("Dropping stale gossip connection to {}: {}", address, e);
                        None
                    }
                },
                None => None,
            };

            let (stream, reply) = match exchanged {
                Some(exchanged) => exchanged,
                None => {
                    let mut stream = TcpStream::connect(&address)
                        .await
                        .map_err(|e| GossipFault::Unavailable(format!("{}: {}", address, e)))?;
                    let reply = roundtrip(&mut stream, &request)
                        .await
                        .map_err(|e| GossipFault::Unavailable(format!("{}: {}", address, e)))?;
                    (stream, reply)
                }
            };
            connections.insert(address, stream);

            match reply {
                Ok(Response::Updates { updates }) => Ok(updates),
                Ok(other) => Err(GossipFault::Rejected(format!("unexpected response {:?}", other))),
                Err(e) if e.status == Status::DeadlineExceeded => Err(GossipFault::Timeout),
                Err(e) if e.status == Status::Unavailable => Err(GossipFault::Unavailable(e.message)),
                Err(e) => Err(GossipFault::Rejected(e.to_string())),
            }
        }
    }
}
