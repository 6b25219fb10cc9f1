use pbft_common::{Digest, MessageKind, PbftError, PhaseMessage, PublicKey};
use std::collections::HashMap;

/// Votes of one phase, grouped by block hash. A validator counts at most once
/// per block.
#[derive(Debug)]
pub struct MessagePool {
    kind: MessageKind,
    min_approvals: usize,
    pool: HashMap<Digest, Vec<PhaseMessage>>,
}

impl MessagePool {
    pub fn new(kind: MessageKind, min_approvals: usize) -> Self {
        MessagePool {
            kind,
            min_approvals,
            pool: HashMap::new(),
        }
    }

    pub fn exists(&self, msg: &PhaseMessage) -> bool {
        self.pool
            .get(&msg.block_hash)
            .is_some_and(|votes| votes.iter().any(|v| v.public_key == msg.public_key))
    }

    /// Check-and-insert in one step. Returns the vote count for the block
    /// after insertion.
    pub fn add(&mut self, msg: PhaseMessage) -> Result<usize, PbftError> {
        if msg.kind != self.kind {
            return Err(PbftError::UnexpectedKind {
                expected: self.kind.to_string(),
                got: msg.kind.to_string(),
            });
        }
        if self.exists(&msg) {
            return Err(PbftError::DuplicateVote {
                kind: self.kind.to_string(),
                block: msg.block_hash.short(),
                validator: msg.public_key.short(),
            });
        }
        let votes = self.pool.entry(msg.block_hash).or_default();
        votes.push(msg);
        Ok(votes.len())
    }

    pub fn count(&self, hash: &Digest) -> usize {
        self.pool.get(hash).map_or(0, Vec::len)
    }

    pub fn has_quorum(&self, hash: &Digest) -> bool {
        self.count(hash) >= self.min_approvals
    }

    pub fn min_approvals(&self) -> usize {
        self.min_approvals
    }

    pub fn votes(&self, hash: &Digest) -> &[PhaseMessage] {
        self.pool.get(hash).map_or(&[], Vec::as_slice)
    }

    pub fn voters(&self, hash: &Digest) -> Vec<PublicKey> {
        self.votes(hash).iter().map(|v| v.public_key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &Vec<PhaseMessage>)> {
        self.pool.iter()
    }
}
