use crate::state::ConsensusState;
use pbft_common::{Block, Digest, Envelope, MessageKind, PbftError, PhaseMessage, Transaction, Wallet};
use tracing::{debug, info, warn};

/// Output of one routing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    /// Send to every peer.
    Relay(Envelope),
    /// A message this node authored. It goes through the router locally, which
    /// relays it once admitted.
    Originate(Envelope),
}

impl ConsensusState {
    /// Routes one inbound envelope. `Err` means the message was dropped and no
    /// state changed; follow-up failures after admission are logged instead.
    pub fn handle(&mut self, wallet: &Wallet, envelope: Envelope) -> Result<Vec<Emit>, PbftError> {
        match envelope {
            Envelope::Tx(tx) => self.on_transaction(wallet, tx),
            Envelope::PrePrepare(block) => self.on_pre_prepare(wallet, block),
            Envelope::Prepare(msg) => self.on_phase(wallet, MessageKind::Prepare, msg),
            Envelope::Commit(msg) => self.on_phase(wallet, MessageKind::Commit, msg),
            Envelope::RoundChange(msg) => self.on_phase(wallet, MessageKind::RoundChange, msg),
        }
    }

    fn on_transaction(&mut self, wallet: &Wallet, tx: Transaction) -> Result<Vec<Emit>, PbftError> {
        if self.tx_pool.exists(&tx) {
            return Err(PbftError::DuplicateTransaction(tx.id));
        }
        tx.verify()?;
        if !self.validators.contains(&tx.from) {
            return Err(PbftError::UnknownValidator(tx.from.short()));
        }

        let batch = self.tx_pool.admit(tx.clone())?;
        let mut emits = vec![Emit::Relay(Envelope::Tx(tx))];

        if let Some(batch) = batch {
            if self.blockchain.expected_proposer() == wallet.public_key() {
                match self.blockchain.create_block(wallet, batch) {
                    Ok(block) => {
                        info!(
                            "Proposing block [{}] with {} transactions",
                            block.hash.short(),
                            block.data.len()
                        );
                        emits.push(Emit::Originate(Envelope::PrePrepare(block)));
                    }
                    Err(e) => warn!("Failed to build block: {}", e),
                }
            }
        }
        Ok(emits)
    }

    fn on_pre_prepare(&mut self, wallet: &Wallet, block: Block) -> Result<Vec<Emit>, PbftError> {
        if self.block_pool.exists(&block.hash) {
            return Err(PbftError::DuplicateBlock(block.hash.short()));
        }
        self.blockchain.verify_block(&block)?;

        let hash = block.hash;
        self.block_pool.add(block.clone())?;
        info!("Block [{}] accepted into pool", hash.short());

        // Votes may have reached quorum before the block itself arrived.
        if self.commit_pool.has_quorum(&hash) {
            self.finalize(&hash);
        }
        if self.round_change_pool.has_quorum(&hash) {
            self.commit_batch(&hash);
        }

        let prepare = wallet.create_message(MessageKind::Prepare, hash);
        Ok(vec![
            Emit::Relay(Envelope::PrePrepare(block)),
            Emit::Originate(Envelope::phase(prepare)),
        ])
    }

    fn on_phase(
        &mut self,
        wallet: &Wallet,
        expected: MessageKind,
        msg: PhaseMessage,
    ) -> Result<Vec<Emit>, PbftError> {
        if msg.kind != expected {
            return Err(PbftError::UnexpectedKind {
                expected: expected.to_string(),
                got: msg.kind.to_string(),
            });
        }
        let pool = self.pool_for(expected);
        if pool.exists(&msg) {
            return Err(PbftError::DuplicateVote {
                kind: expected.to_string(),
                block: msg.block_hash.short(),
                validator: msg.public_key.short(),
            });
        }
        msg.verify()?;
        if !self.validators.contains(&msg.public_key) {
            return Err(PbftError::UnknownValidator(msg.public_key.short()));
        }

        let hash = msg.block_hash;
        let pool = self.pool_for_mut(expected);
        let count = pool.add(msg.clone())?;
        let crossed_quorum = count == pool.min_approvals();
        let has_quorum = pool.has_quorum(&hash);

        let mut emits = vec![Emit::Relay(Envelope::phase(msg))];
        match expected {
            MessageKind::Prepare => {
                // Later prepares would only produce a duplicate of our commit.
                if crossed_quorum {
                    info!("Prepare quorum for block [{}]", hash.short());
                    let commit = wallet.create_message(MessageKind::Commit, hash);
                    emits.push(Emit::Originate(Envelope::phase(commit)));
                }
            }
            MessageKind::Commit => {
                if has_quorum {
                    self.finalize(&hash);
                }
                let round_change = wallet.create_message(MessageKind::RoundChange, hash);
                emits.push(Emit::Originate(Envelope::phase(round_change)));
            }
            MessageKind::RoundChange => {
                if has_quorum {
                    self.commit_batch(&hash);
                }
            }
        }
        Ok(emits)
    }

    /// Appends the pooled block unless it is already on the chain. Safe to
    /// call on every vote past quorum.
    fn finalize(&mut self, hash: &Digest) {
        if self.blockchain.contains(hash) {
            return;
        }
        if let Err(e) = self.blockchain.add_updated_block(
            hash,
            &self.block_pool,
            &self.prepare_pool,
            &self.commit_pool,
        ) {
            match e {
                PbftError::BlockNotInPool(_) => {
                    debug!("Commit quorum for [{}] ahead of its block", hash.short())
                }
                e => warn!("Block [{}] not finalized: {}", hash.short(), e),
            }
        }
    }

    /// Moves the block's transactions to committed once. Safe to call on every
    /// vote past quorum.
    fn commit_batch(&mut self, hash: &Digest) {
        let Some(block) = self.block_pool.get(hash) else {
            debug!("Round change quorum for [{}] ahead of its block", hash.short());
            return;
        };
        if block.data.iter().all(|tx| self.tx_pool.is_committed(&tx.id)) {
            return;
        }
        match self.tx_pool.promote_to_committed(&block.data) {
            Ok(()) => info!(
                "Committed {} transactions of block [{}]",
                block.data.len(),
                hash.short()
            ),
            Err(e) => warn!("Batch of block [{}] not committed: {}", hash.short(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_common::PbftConfig;

    fn state(threshold: usize) -> ConsensusState {
        ConsensusState::new(&PbftConfig {
            tx_threshold: threshold,
            num_of_nodes: 3,
        })
        .unwrap()
    }

    fn state_of_four(threshold: usize) -> ConsensusState {
        ConsensusState::new(&PbftConfig {
            tx_threshold: threshold,
            num_of_nodes: 4,
        })
        .unwrap()
    }

    fn node(i: usize) -> Wallet {
        Wallet::new(&format!("NODE-{}", i))
    }

    /// Handles `envelope` and everything it makes `wallet` originate.
    fn route(state: &mut ConsensusState, wallet: &Wallet, envelope: Envelope) {
        let mut queue = vec![envelope];
        while let Some(envelope) = queue.pop() {
            if let Ok(emits) = state.handle(wallet, envelope) {
                for emit in emits {
                    if let Emit::Originate(env) = emit {
                        queue.push(env);
                    }
                }
            }
        }
    }

    fn originated(emits: &[Emit]) -> Vec<&Envelope> {
        emits
            .iter()
            .filter_map(|e| match e {
                Emit::Originate(env) => Some(env),
                Emit::Relay(_) => None,
            })
            .collect()
    }

    fn pooled_block(state: &mut ConsensusState) -> Block {
        let block = state.blockchain.create_block(&node(0), vec![]).unwrap();
        state
            .handle(&node(1), Envelope::PrePrepare(block.clone()))
            .unwrap();
        block
    }

    fn vote(i: usize, kind: MessageKind, hash: Digest) -> Envelope {
        Envelope::phase(node(i).create_message(kind, hash))
    }

    #[test]
    fn transaction_is_relayed() {
        let mut state = state(5);
        let tx = node(1).create_transaction("a").unwrap();
        let emits = state.handle(&node(0), Envelope::Tx(tx.clone())).unwrap();
        assert_eq!(emits, vec![Emit::Relay(Envelope::Tx(tx.clone()))]);
        assert!(matches!(
            state.handle(&node(0), Envelope::Tx(tx)),
            Err(PbftError::DuplicateTransaction(_))
        ));
    }

    #[test]
    fn transaction_from_outsider_is_dropped() {
        let mut state = state(5);
        let tx = Wallet::new("mallory").create_transaction("a").unwrap();
        assert!(matches!(
            state.handle(&node(0), Envelope::Tx(tx)),
            Err(PbftError::UnknownValidator(_))
        ));
        assert_eq!(state.tx_pool.waiting_len(), 0);
    }

    #[test]
    fn tampered_transaction_is_dropped() {
        let mut state = state(5);
        let mut tx = node(1).create_transaction("a").unwrap();
        tx.payload.data = "b".into();
        assert!(state.handle(&node(0), Envelope::Tx(tx)).is_err());
        assert_eq!(state.tx_pool.waiting_len(), 0);
    }

    #[test]
    fn only_expected_proposer_builds_block() {
        let mut leader = state(2);
        let mut follower = state(2);
        let txs: Vec<_> = (0..2)
            .map(|i| node(2).create_transaction(format!("t{}", i)).unwrap())
            .collect();

        for tx in &txs {
            let emits = follower.handle(&node(1), Envelope::Tx(tx.clone())).unwrap();
            assert!(originated(&emits).is_empty());
        }

        leader.handle(&node(0), Envelope::Tx(txs[0].clone())).unwrap();
        let emits = leader.handle(&node(0), Envelope::Tx(txs[1].clone())).unwrap();
        let out = originated(&emits);
        assert_eq!(out.len(), 1);
        match out[0] {
            Envelope::PrePrepare(block) => {
                assert_eq!(block.proposer, node(0).public_key());
                assert_eq!(block.data, txs);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pre_prepare_triggers_own_prepare() {
        let mut state = state(5);
        let block = state.blockchain.create_block(&node(0), vec![]).unwrap();
        let emits = state
            .handle(&node(2), Envelope::PrePrepare(block.clone()))
            .unwrap();
        assert_eq!(emits[0], Emit::Relay(Envelope::PrePrepare(block.clone())));
        assert_eq!(
            originated(&emits),
            vec![&Envelope::phase(node(2).create_message(MessageKind::Prepare, block.hash))]
        );
        assert!(matches!(
            state.handle(&node(2), Envelope::PrePrepare(block)),
            Err(PbftError::DuplicateBlock(_))
        ));
    }

    #[test]
    fn pre_prepare_from_wrong_leader_is_dropped() {
        let mut state = state(5);
        let block = state.blockchain.create_block(&node(1), vec![]).unwrap();
        assert!(matches!(
            state.handle(&node(2), Envelope::PrePrepare(block)),
            Err(PbftError::UnexpectedProposer { .. })
        ));
        assert!(state.block_pool.is_empty());
    }

    #[test]
    fn commit_emitted_once_on_prepare_quorum() {
        let mut state = state(5);
        let block = pooled_block(&mut state);
        let me = node(1);

        for i in 0..2 {
            let emits = state.handle(&me, vote(i, MessageKind::Prepare, block.hash)).unwrap();
            assert!(originated(&emits).is_empty());
        }
        let emits = state.handle(&me, vote(2, MessageKind::Prepare, block.hash)).unwrap();
        assert_eq!(
            originated(&emits),
            vec![&Envelope::phase(me.create_message(MessageKind::Commit, block.hash))]
        );
        assert!(matches!(
            state.handle(&me, vote(2, MessageKind::Prepare, block.hash)),
            Err(PbftError::DuplicateVote { .. })
        ));
        assert_eq!(state.prepare_pool.count(&block.hash), 3);
    }

    #[test]
    fn commit_quorum_finalizes_block() {
        let mut state = state(5);
        let block = pooled_block(&mut state);
        let me = node(1);
        for i in 0..3 {
            state.handle(&me, vote(i, MessageKind::Prepare, block.hash)).unwrap();
        }
        for i in 0..3 {
            let emits = state.handle(&me, vote(i, MessageKind::Commit, block.hash)).unwrap();
            assert_eq!(
                originated(&emits),
                vec![&Envelope::phase(me.create_message(MessageKind::RoundChange, block.hash))]
            );
        }
        assert_eq!(state.blockchain.len(), 2);
        let head = state.blockchain.head();
        assert_eq!(head.hash, block.hash);
        assert_eq!(head.prepare_votes.len(), 3);
        assert_eq!(head.commit_votes.len(), 3);
    }

    #[test]
    fn round_change_quorum_commits_batch() {
        let mut state = state(2);
        let txs: Vec<_> = (0..2)
            .map(|i| node(0).create_transaction(format!("t{}", i)).unwrap())
            .collect();
        let me = node(0);
        let mut block = None;
        for tx in &txs {
            for emit in state.handle(&me, Envelope::Tx(tx.clone())).unwrap() {
                if let Emit::Originate(Envelope::PrePrepare(b)) = emit {
                    block = Some(b);
                }
            }
        }
        let block = block.unwrap();
        state.handle(&me, Envelope::PrePrepare(block.clone())).unwrap();
        assert_eq!(state.tx_pool.in_progress_len(), 2);

        for i in 0..3 {
            state.handle(&me, vote(i, MessageKind::RoundChange, block.hash)).unwrap();
        }
        assert_eq!(state.tx_pool.in_progress_len(), 0);
        assert_eq!(state.tx_pool.committed_len(), 2);
    }

    #[test]
    fn commit_past_quorum_finalizes_late_block() {
        let mut state = state_of_four(5);
        let me = node(3);
        let block = state.blockchain.create_block(&node(0), vec![]).unwrap();

        for i in 0..3 {
            state.handle(&me, vote(i, MessageKind::Commit, block.hash)).unwrap();
        }
        assert!(state.commit_pool.has_quorum(&block.hash));
        assert_eq!(state.blockchain.len(), 1);

        // The block shows up only after quorum; the fourth commit must still finalize it.
        state.block_pool.add(block.clone()).unwrap();
        state.handle(&me, vote(3, MessageKind::Commit, block.hash)).unwrap();
        assert_eq!(state.commit_pool.count(&block.hash), 4);
        assert_eq!(state.blockchain.len(), 2);
        assert_eq!(state.blockchain.head().hash, block.hash);
    }

    #[test]
    fn round_change_past_quorum_commits_late_batch() {
        let mut state = state_of_four(1);
        let me = node(3);
        let tx = node(1).create_transaction("late").unwrap();
        state.handle(&me, Envelope::Tx(tx.clone())).unwrap();
        let block = state.blockchain.create_block(&node(0), vec![tx.clone()]).unwrap();

        for i in 0..3 {
            state.handle(&me, vote(i, MessageKind::RoundChange, block.hash)).unwrap();
        }
        assert_eq!(state.tx_pool.committed_len(), 0);

        state.block_pool.add(block.clone()).unwrap();
        state.handle(&me, vote(3, MessageKind::RoundChange, block.hash)).unwrap();
        assert!(state.tx_pool.is_committed(&tx.id));
        assert_eq!(state.tx_pool.in_progress_len(), 0);
    }

    #[test]
    fn block_arriving_after_all_votes_is_finalized_and_committed() {
        let mut state = state_of_four(1);
        let me = node(3);
        let tx = node(2).create_transaction("slow").unwrap();
        route(&mut state, &me, Envelope::Tx(tx.clone()));
        let block = state.blockchain.create_block(&node(0), vec![tx.clone()]).unwrap();

        for kind in [MessageKind::Prepare, MessageKind::Commit, MessageKind::RoundChange] {
            for i in 0..3 {
                route(&mut state, &me, vote(i, kind, block.hash));
            }
        }
        assert_eq!(state.blockchain.len(), 1);

        route(&mut state, &me, Envelope::PrePrepare(block.clone()));
        assert_eq!(state.blockchain.len(), 2);
        assert_eq!(state.blockchain.head().hash, block.hash);
        assert!(state.tx_pool.is_committed(&tx.id));
        assert_eq!(state.prepare_pool.count(&block.hash), 4);
    }

    #[test]
    fn votes_after_finalization_change_nothing() {
        let mut state = state_of_four(5);
        let me = node(3);
        let block = pooled_block(&mut state);
        for i in 0..3 {
            state.handle(&me, vote(i, MessageKind::Commit, block.hash)).unwrap();
        }
        assert_eq!(state.blockchain.len(), 2);
        state.handle(&me, vote(3, MessageKind::Commit, block.hash)).unwrap();
        assert_eq!(state.blockchain.len(), 2);
        assert_eq!(state.blockchain.head().commit_votes.len(), 3);
    }

    #[test]
    fn forged_vote_is_dropped() {
        let mut state = state(5);
        let hash = pbft_common::crypto::hash(b"block");
        let mut msg = node(0).create_message(MessageKind::Prepare, hash);
        msg.public_key = node(1).public_key();
        assert!(matches!(
            state.handle(&node(2), Envelope::Prepare(msg)),
            Err(PbftError::InvalidSignature)
        ));

        let outsider = Wallet::new("mallory").create_message(MessageKind::Prepare, hash);
        assert!(matches!(
            state.handle(&node(2), Envelope::Prepare(outsider)),
            Err(PbftError::UnknownValidator(_))
        ));
        assert_eq!(state.prepare_pool.count(&hash), 0);
    }

    #[test]
    fn mismatched_envelope_kind_is_dropped() {
        let mut state = state(5);
        let msg = node(0).create_message(MessageKind::Prepare, Digest::ZERO);
        assert!(matches!(
            state.handle(&node(1), Envelope::Commit(msg)),
            Err(PbftError::UnexpectedKind { .. })
        ));
        assert_eq!(state.commit_pool.count(&Digest::ZERO), 0);
    }
}
