use crate::block_pool::BlockPool;
use crate::blockchain::Blockchain;
use crate::msg_pool::MessagePool;
use crate::tx_pool::TxPool;
use crate::validators::ValidatorSet;
use pbft_common::{Block, Digest, MessageKind, PbftConfig, PbftError, PhaseMessage, PublicKey, Transaction};
use serde::Serialize;
use std::sync::Arc;

/// All mutable protocol state of one node. Callers hold it behind a single
/// lock so every check-then-act sequence is atomic.
#[derive(Debug)]
pub struct ConsensusState {
    pub validators: Arc<ValidatorSet>,
    pub tx_pool: TxPool,
    pub block_pool: BlockPool,
    pub prepare_pool: MessagePool,
    pub commit_pool: MessagePool,
    pub round_change_pool: MessagePool,
    pub blockchain: Blockchain,
}

impl ConsensusState {
    pub fn new(config: &PbftConfig) -> Result<Self, PbftError> {
        config.validate()?;
        let validators = Arc::new(ValidatorSet::new(config.num_of_nodes)?);
        let quorum = validators.min_approvals();
        Ok(ConsensusState {
            tx_pool: TxPool::new(config.tx_threshold),
            block_pool: BlockPool::new(),
            prepare_pool: MessagePool::new(MessageKind::Prepare, quorum),
            commit_pool: MessagePool::new(MessageKind::Commit, quorum),
            round_change_pool: MessagePool::new(MessageKind::RoundChange, quorum),
            blockchain: Blockchain::new(validators.clone()),
            validators,
        })
    }

    pub fn pool_for(&self, kind: MessageKind) -> &MessagePool {
        match kind {
            MessageKind::Prepare => &self.prepare_pool,
            MessageKind::Commit => &self.commit_pool,
            MessageKind::RoundChange => &self.round_change_pool,
        }
    }

    pub fn pool_for_mut(&mut self, kind: MessageKind) -> &mut MessagePool {
        match kind {
            MessageKind::Prepare => &mut self.prepare_pool,
            MessageKind::Commit => &mut self.commit_pool,
            MessageKind::RoundChange => &mut self.round_change_pool,
        }
    }

    /// Read-only view for the admin surface. `sockets` is filled in by the caller.
    pub fn snapshot(&self, public_key: PublicKey) -> NodeSnapshot {
        NodeSnapshot {
            public_key,
            validators: self.validators.keys().to_vec(),
            min_approvals: self.validators.min_approvals(),
            expected_proposer: self.blockchain.expected_proposer(),
            chain: self.blockchain.blocks().iter().map(BlockSummary::from).collect(),
            sockets: Vec::new(),
            tx_pool: TxPoolSnapshot {
                waiting: self.tx_pool.waiting().iter().map(TxSummary::from).collect(),
                in_progress: self.tx_pool.in_progress().map(TxSummary::from).collect(),
                committed: self.tx_pool.committed().map(TxSummary::from).collect(),
            },
            block_pool: self.block_pool.iter().map(BlockSummary::from).collect(),
            prepare_pool: votes_summary(&self.prepare_pool),
            commit_pool: votes_summary(&self.commit_pool),
            round_change_pool: votes_summary(&self.round_change_pool),
        }
    }
}

fn votes_summary(pool: &MessagePool) -> Vec<VotesSummary> {
    let mut summary: Vec<VotesSummary> = pool
        .iter()
        .map(|(hash, votes)| VotesSummary {
            block_hash: *hash,
            voters: votes.iter().map(|v: &PhaseMessage| v.public_key).collect(),
        })
        .collect();
    summary.sort_by_key(|s| s.block_hash);
    summary
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub public_key: PublicKey,
    pub validators: Vec<PublicKey>,
    pub min_approvals: usize,
    pub expected_proposer: PublicKey,
    pub chain: Vec<BlockSummary>,
    pub sockets: Vec<String>,
    pub tx_pool: TxPoolSnapshot,
    pub block_pool: Vec<BlockSummary>,
    pub prepare_pool: Vec<VotesSummary>,
    pub commit_pool: Vec<VotesSummary>,
    pub round_change_pool: Vec<VotesSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub hash: Digest,
    pub last_hash: Digest,
    pub proposer: PublicKey,
    pub nonce: u64,
    pub tx_count: usize,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        BlockSummary {
            hash: block.hash,
            last_hash: block.last_hash,
            proposer: block.proposer,
            nonce: block.nonce,
            tx_count: block.data.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxPoolSnapshot {
    pub waiting: Vec<TxSummary>,
    pub in_progress: Vec<TxSummary>,
    pub committed: Vec<TxSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TxSummary {
    pub id: String,
    pub hash: Digest,
    pub from: PublicKey,
}

impl From<&Transaction> for TxSummary {
    fn from(tx: &Transaction) -> Self {
        TxSummary {
            id: tx.id.clone(),
            hash: tx.hash,
            from: tx.from,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotesSummary {
    pub block_hash: Digest,
    pub voters: Vec<PublicKey>,
}
