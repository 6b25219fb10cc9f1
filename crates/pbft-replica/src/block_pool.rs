use pbft_common::{Block, Digest, PbftError};
use std::collections::HashMap;

/// Proposed blocks awaiting finality, keyed by hash.
#[derive(Debug, Default)]
pub struct BlockPool {
    blocks: HashMap<Digest, Block>,
}

impl BlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, hash: &Digest) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn add(&mut self, block: Block) -> Result<(), PbftError> {
        if self.exists(&block.hash) {
            return Err(PbftError::DuplicateBlock(block.hash.short()));
        }
        self.blocks.insert(block.hash, block);
        Ok(())
    }

    pub fn get(&self, hash: &Digest) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn remove(&mut self, hash: &Digest) -> bool {
        self.blocks.remove(hash).is_some()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}
