use crate::block_pool::BlockPool;
use crate::msg_pool::MessagePool;
use crate::validators::ValidatorSet;
use pbft_common::{Block, Digest, PbftError, PublicKey, Transaction, Wallet};
use std::sync::Arc;
use tracing::info;

/// The finalized chain. Always starts at genesis and only grows.
#[derive(Debug)]
pub struct Blockchain {
    validators: Arc<ValidatorSet>,
    chain: Vec<Block>,
}

impl Blockchain {
    pub fn new(validators: Arc<ValidatorSet>) -> Self {
        Blockchain {
            validators,
            chain: vec![Block::genesis()],
        }
    }

    pub fn head(&self) -> &Block {
        // The chain is never empty: it is seeded with genesis and never shrinks.
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn contains(&self, hash: &Digest) -> bool {
        self.chain.iter().any(|b| b.hash == *hash)
    }

    pub fn expected_proposer(&self) -> PublicKey {
        self.validators.proposer_for(&self.head().hash)
    }

    pub fn create_block(&self, wallet: &Wallet, txs: Vec<Transaction>) -> Result<Block, PbftError> {
        wallet.create_block(self.head(), txs)
    }

    /// Block integrity plus chain continuity and leader check.
    pub fn verify_block(&self, block: &Block) -> Result<(), PbftError> {
        let head = self.head();
        if block.last_hash != head.hash {
            return Err(PbftError::LastHashMismatch {
                expected: head.hash.short(),
                got: block.last_hash.short(),
            });
        }
        block.verify()?;
        let expected = self.expected_proposer();
        if block.proposer != expected {
            return Err(PbftError::UnexpectedProposer {
                expected: expected.short(),
                got: block.proposer.short(),
            });
        }
        Ok(())
    }

    /// Appends the pooled block `hash` with its prepare/commit vote snapshots.
    /// Fails without side effects if the block is unknown or the head moved.
    pub fn add_updated_block(
        &mut self,
        hash: &Digest,
        block_pool: &BlockPool,
        prepare_pool: &MessagePool,
        commit_pool: &MessagePool,
    ) -> Result<&Block, PbftError> {
        let candidate = block_pool
            .get(hash)
            .ok_or_else(|| PbftError::BlockNotInPool(hash.short()))?;

        let head = self.head();
        if candidate.last_hash != head.hash {
            return Err(PbftError::LastHashMismatch {
                expected: head.hash.short(),
                got: candidate.last_hash.short(),
            });
        }

        let mut block = candidate.clone();
        block.prepare_votes = prepare_pool.votes(hash).to_vec();
        block.commit_votes = commit_pool.votes(hash).to_vec();
        info!(
            "Block [{}] finalized at height {} with {} transactions",
            block.hash.short(),
            self.chain.len(),
            block.data.len()
        );
        self.chain.push(block);
        Ok(self.head())
    }
}
