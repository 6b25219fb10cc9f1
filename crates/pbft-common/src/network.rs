use crate::errors::PbftError;
use async_trait::async_trait;
use futures_util::{stream::SplitSink, Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{self, Message as TungMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{info, warn};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = SplitSink<WsStream, TungMessage>;

/// Receives one inbound payload per call. Implemented by the node.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn deliver(&self, payload: &str);
}

/// Message delivery collaborator the consensus core talks to.
#[async_trait]
pub trait NetworkTrait: Send + Sync {
    /// Best effort; peers whose write fails are dropped from the peer set.
    async fn broadcast(&self, payload: &str);
    async fn listen(&self, address: &str, handler: Arc<dyn InboundHandler>)
        -> Result<(), PbftError>;
    async fn connect(&self, address: &str, handler: Arc<dyn InboundHandler>)
        -> Result<(), PbftError>;
    /// Addresses of currently connected peers.
    async fn peers(&self) -> Vec<String>;
}

/// Reads frames from one connection until it closes, handing each text
/// payload to `handler` in arrival order.
pub async fn handle_connection<S>(mut read: S, peer: String, handler: Arc<dyn InboundHandler>)
where
    S: Stream<Item = Result<TungMessage, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame {
            Ok(TungMessage::Text(text)) => handler.deliver(text.as_str()).await,
            Ok(TungMessage::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => handler.deliver(text).await,
                Err(e) => warn!("Dropping non UTF-8 frame from {}: {}", peer, e),
            },
            Ok(TungMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
    info!("Connection with {} closed", peer);
}

pub async fn send_message_to_peer<S>(sink: &mut S, payload: &str) -> Result<(), PbftError>
where
    S: Sink<TungMessage, Error = tungstenite::Error> + Unpin,
{
    sink.send(TungMessage::text(payload.to_owned()))
        .await
        .map_err(|e| PbftError::NetworkError(e.to_string()))
}
