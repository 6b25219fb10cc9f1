use crate::crypto::{Digest, Keypair, PublicKey, Signature};
use crate::errors::PbftError;
use crate::types::{Block, MessageKind, PhaseMessage, Transaction};
use tracing::debug;

/// A node's signing identity. Every operation is pure given the private key.
#[derive(Debug, Clone)]
pub struct Wallet {
    keypair: Keypair,
}

impl Wallet {
    pub fn new(secret: &str) -> Self {
        Wallet {
            keypair: Keypair::from_secret(secret),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        self.keypair.sign(digest)
    }

    pub fn create_transaction(&self, data: impl Into<String>) -> Result<Transaction, PbftError> {
        let tx = Transaction::new(&self.keypair, data)?;
        debug!("Created tx [{}]", tx.hash.short());
        Ok(tx)
    }

    pub fn create_block(&self, last: &Block, data: Vec<Transaction>) -> Result<Block, PbftError> {
        let block = Block::new(&self.keypair, last, data)?;
        debug!("Created block [{}]", block.hash.short());
        Ok(block)
    }

    pub fn create_message(&self, kind: MessageKind, block_hash: Digest) -> PhaseMessage {
        PhaseMessage::new(&self.keypair, kind, block_hash)
    }
}
