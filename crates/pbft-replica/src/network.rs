use futures_util::stream::StreamExt;
use pbft_common::{
    handle_connection, send_message_to_peer, InboundHandler, NetworkTrait, PbftError, WsSink,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream};
use tracing::{info, warn};

type PeerSink = Arc<Mutex<WsSink>>;
type PeerMap = Arc<RwLock<HashMap<String, PeerSink>>>;

/// WebSocket mesh. Every connection, accepted or dialed, is full duplex: its
/// write half joins `peers`, its read half feeds the inbound handler.
///
/// Each sink has its own lock, so a slow peer only delays writes to itself and
/// the map lock is never held across a send.
#[derive(Default)]
pub struct ReplicaNetwork {
    peers: PeerMap,
}

impl ReplicaNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

async fn register(peers: PeerMap, peer: String, sink: WsSink) {
    let mut peers_lock = peers.write().await;
    if peers_lock
        .insert(peer.clone(), Arc::new(Mutex::new(sink)))
        .is_some()
    {
        info!("Replaced connection with {}", peer);
    }
}

#[async_trait::async_trait]
impl NetworkTrait for ReplicaNetwork {
    async fn broadcast(&self, payload: &str) {
        let targets: Vec<(String, PeerSink)> = self
            .peers
            .read()
            .await
            .iter()
            .map(|(peer, sink)| (peer.clone(), sink.clone()))
            .collect();

        let mut disconnected = Vec::new();
        for (peer, sink) in targets {
            let result = {
                let mut sink_lock = sink.lock().await;
                send_message_to_peer(&mut *sink_lock, payload).await
            };
            if let Err(e) = result {
                warn!("Failed to send to peer {}: {}", peer, e);
                disconnected.push((peer, sink));
            }
        }

        if disconnected.is_empty() {
            return;
        }
        let mut peers = self.peers.write().await;
        for (peer, sink) in disconnected {
            // Leave a connection that replaced the failed one in place.
            if peers.get(&peer).is_some_and(|current| Arc::ptr_eq(current, &sink)) {
                peers.remove(&peer);
                info!("Connection with {} removed", peer);
            }
        }
    }

    async fn listen(&self, address: &str, handler: Arc<dyn InboundHandler>) -> Result<(), PbftError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| PbftError::NetworkError(e.to_string()))?;

        let peers = self.peers.clone();
        tokio::spawn(async move {
            while let Ok((stream, remote)) = listener.accept().await {
                let peers = peers.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    match accept_async(MaybeTlsStream::Plain(stream)).await {
                        Ok(ws_stream) => {
                            let peer = remote.to_string();
                            info!("Accepted connection from {}", peer);
                            let (write, read) = ws_stream.split();
                            register(peers, peer.clone(), write).await;
                            handle_connection(read, peer, handler).await;
                        }
                        Err(e) => warn!("WebSocket handshake with {} failed: {}", remote, e),
                    }
                });
            }
        });

        info!("WebSocket server listening on {}", address);
        Ok(())
    }

    async fn connect(&self, address: &str, handler: Arc<dyn InboundHandler>) -> Result<(), PbftError> {
        let url = format!("ws://{}/ws", address);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| PbftError::NetworkError(format!("{}: {}", url, e)))?;

        let (write, read) = ws_stream.split();
        let peer = address.to_string();
        register(self.peers.clone(), peer.clone(), write).await;
        info!("Connected to peer {}", peer);

        tokio::spawn(handle_connection(read, peer, handler));
        Ok(())
    }

    async fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.peers.read().await.keys().cloned().collect();
        peers.sort();
        peers
    }
}
