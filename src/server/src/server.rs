use std::sync::Arc;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::io::{AsyncRead, AsyncWrite};
use cluster::{GossipExchanger, Naming, ReplicaConfig, ReplicationEngine};
use storage::ReplicaStore;

use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::message::{Frame, Request};
use crate::transport::TcpGossipTransport;

pub struct Server {
    config: ReplicaConfig,
    engine: Arc<ReplicationEngine>,
    naming: Arc<dyn Naming>,
}

impl Server {
    pub fn new(config: ReplicaConfig, naming: Arc<dyn Naming>) -> Result<Self, ServerError> {
        let engine = ReplicationEngine::new(config.replica_id, config.replicas, ReplicaStore::new())?;

        Ok(Server {
            config,
            engine: Arc::new(engine),
            naming,
        })
    }

    pub fn engine(&self) -> &Arc<ReplicationEngine> {
        &self.engine
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::InvalidPort(format!("{}: {}", addr, e)))?;

        // Shutdown broadcast channel
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        // Spawn signal handler
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                info!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal, stopping replica...");
            let _ = shutdown_tx_clone.send(());
        });

        self.serve(listener, shutdown_tx).await
    }

    /// Publish this replica, start gossip and accept connections until
    /// `shutdown_tx` fires, then unpublish.
    pub async fn serve(&self, listener: TcpListener, shutdown_tx: broadcast::Sender<()>) -> Result<(), ServerError> {
        let address = listener.local_addr()?.to_string();
        let replica_id = self.config.replica_id;
        self.naming.publish(replica_id, &address)?;
        info!("Replica {} is running on {} ...", replica_id, address);

        if let Some(interval) = self.config.gossip_interval {
            let gossip = GossipExchanger::new(
                self.engine.clone(),
                self.naming.clone(),
                TcpGossipTransport::new(),
                self.config.rpc_timeout,
            );
            tokio::spawn(gossip.run(interval, shutdown_tx.subscribe()));
        } else {
            info!("Gossip disabled");
        }

        let handler = RequestHandler::new(self.engine.clone());
        let mut shutdown_rx = shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let handler = handler.clone();
                            let mut client_shutdown_rx = shutdown_tx.subscribe();

                            info!("New connection from {}", peer_addr);

                            tokio::spawn(async move {
                                let result = handle_client(stream, handler, &mut client_shutdown_rx).await;

                                if let Err(e) = result {
                                    info!("Connection closed from {}: {}", peer_addr, e);
                                } else {
                                    info!("Connection closed from {}", peer_addr);
                                }
                            });
                        }
                        Err(e) => {
                            info!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping replica...");
                    break;
                }
            }
        }

        if let Err(e) = self.naming.unpublish(replica_id, &address) {
            warn!("Failed to unpublish replica {}: {}", replica_id, e);
        }
        info!("Replica {} stopped", replica_id);
        Ok(())
    }
}

async fn handle_client<S>(
    mut stream: S,
    handler: RequestHandler,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            result = Frame::receive_async(&mut stream) => {
                match result {
                    Ok(frame) => process_frame(frame, &handler, &mut stream).await?,
                    Err(e) => {
                        if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            return Ok(());
                        }
                        return Err(e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Client handler received shutdown signal");
                return Ok(());
            }
        }
    }
}

async fn process_frame<S>(frame: Frame, handler: &RequestHandler, stream: &mut S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let request: Request = match frame.decode() {
        Ok(request) => request,
        Err(e) => {
            info!("ERR malformed request with code {}: {}", frame.code, e);
            let err = crate::error::RpcError::invalid(format!("malformed request: {}", e));
            return Frame::error(&err)?.send_async(stream).await;
        }
    };

    let code = request.opcode();
    let reply = match handler.handle(request).await {
        Ok(response) => Frame::response(code, &response)?,
        Err(err) => Frame::error(&err)?,
    };
    reply.send_async(stream).await
}
