use pbft_common::{Envelope, InboundHandler, NetworkTrait, PbftConfig, PbftError, Transaction, Wallet};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod block_pool;
pub mod blockchain;
pub mod consensus;
pub mod metrics;
pub mod msg_pool;
pub mod network;
pub mod rest_api;
pub mod state;
pub mod tx_pool;
pub mod validators;

pub use consensus::Emit;
pub use state::{ConsensusState, NodeSnapshot};

/// A PBFT validator node: wallet, protocol state and the network it talks through.
pub struct Replica {
    wallet: Wallet,
    config: PbftConfig,
    state: Arc<Mutex<ConsensusState>>,
    network: Arc<dyn NetworkTrait>,
}

impl Replica {
    /// Builds a node at genesis with empty pools. Only configuration errors fail.
    pub fn new(
        network: Arc<dyn NetworkTrait>,
        wallet: Wallet,
        config: PbftConfig,
    ) -> Result<Self, PbftError> {
        let state = ConsensusState::new(&config)?;
        if !state.validators.contains(&wallet.public_key()) {
            warn!(
                "Node {} is not in the validator set; its votes will be ignored",
                wallet.public_key().short()
            );
        }
        metrics::init_metrics();
        Ok(Replica {
            wallet,
            config,
            state: Arc::new(Mutex::new(state)),
            network,
        })
    }

    pub fn public_key(&self) -> pbft_common::PublicKey {
        self.wallet.public_key()
    }

    pub fn config(&self) -> &PbftConfig {
        &self.config
    }

    /// Listens on `address`, then dials every peer. Unreachable peers are skipped.
    pub async fn run(self: Arc<Self>, address: &str, peers: &[String]) -> Result<(), PbftError> {
        let handler: Arc<dyn InboundHandler> = self.clone();
        self.network.listen(address, handler.clone()).await?;

        for peer in peers {
            if let Err(e) = self.network.connect(peer, handler.clone()).await {
                warn!("Could not connect to peer {}: {}", peer, e);
            }
        }
        info!(
            "Node {} running with {} peers",
            self.wallet.public_key().short(),
            self.network.peers().await.len()
        );
        Ok(())
    }

    /// Decodes one raw payload and routes it. Never fails: bad input is a logged drop.
    pub async fn deliver_payload(&self, payload: &str) {
        match Envelope::decode(payload) {
            Ok(envelope) => self.process(envelope).await,
            Err(e) => {
                warn!("Dropping payload: {}", e);
                metrics::MESSAGES_DROPPED.inc();
            }
        }
    }

    /// Routes `envelope` and everything it causes this node to originate.
    /// The state lock is released before any broadcast.
    pub async fn process(&self, envelope: Envelope) {
        let mut queue = VecDeque::from([envelope]);

        while let Some(envelope) = queue.pop_front() {
            let kind = envelope.kind_name();
            let result = {
                let mut state = self.state.lock().await;
                let result = state.handle(&self.wallet, envelope);
                metrics::observe(&state);
                result
            };

            let emits = match result {
                Ok(emits) => emits,
                Err(e) if e.is_duplicate() => {
                    debug!("Ignoring {}: {}", kind, e);
                    continue;
                }
                Err(e) => {
                    warn!("Dropping {}: {}", kind, e);
                    metrics::MESSAGES_DROPPED.inc();
                    continue;
                }
            };

            for emit in emits {
                match emit {
                    Emit::Relay(envelope) => match envelope.encode() {
                        Ok(payload) => self.network.broadcast(&payload).await,
                        Err(e) => warn!("Failed to encode {}: {}", envelope.kind_name(), e),
                    },
                    Emit::Originate(envelope) => queue.push_back(envelope),
                }
            }
        }
    }

    /// Creates a transaction with this node's wallet and handles it as if received.
    pub async fn submit_transaction(&self, data: impl Into<String>) -> Result<Transaction, PbftError> {
        let tx = self.wallet.create_transaction(data)?;
        info!("Submitting tx [{}]", tx.hash.short());
        self.process(Envelope::Tx(tx.clone())).await;
        Ok(tx)
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        let mut snapshot = {
            let state = self.state.lock().await;
            state.snapshot(self.wallet.public_key())
        };
        snapshot.sockets = self.network.peers().await;
        snapshot
    }

    /// Runs `f` against the locked state. Meant for inspection.
    pub async fn with_state<R>(&self, f: impl FnOnce(&ConsensusState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }
}

#[async_trait::async_trait]
impl InboundHandler for Replica {
    async fn deliver(&self, payload: &str) {
        self.deliver_payload(payload).await;
    }
}
