use pbft_common::{PbftError, Transaction};
use std::collections::HashMap;
use tracing::info;

/// Transactions move `waiting -> in_progress -> committed`; an id lives in at
/// most one of the three at any time.
#[derive(Debug)]
pub struct TxPool {
    waiting: Vec<Transaction>,
    in_progress: HashMap<String, Transaction>,
    committed: HashMap<String, Transaction>,
    threshold: usize,
}

impl TxPool {
    pub fn new(threshold: usize) -> Self {
        TxPool {
            waiting: Vec::new(),
            in_progress: HashMap::new(),
            committed: HashMap::new(),
            threshold,
        }
    }

    pub fn exists(&self, tx: &Transaction) -> bool {
        self.in_progress.contains_key(&tx.id)
            || self.committed.contains_key(&tx.id)
            || self.waiting.iter().any(|w| w.id == tx.id)
    }

    /// Appends `tx` to the waiting set. Once the waiting set reaches the
    /// threshold the whole set moves to in-progress and is returned as a batch.
    pub fn admit(&mut self, tx: Transaction) -> Result<Option<Vec<Transaction>>, PbftError> {
        if self.exists(&tx) {
            return Err(PbftError::DuplicateTransaction(tx.id));
        }
        self.waiting.push(tx);

        if self.waiting.len() < self.threshold {
            return Ok(None);
        }

        let batch = std::mem::take(&mut self.waiting);
        for tx in &batch {
            self.in_progress.insert(tx.id.clone(), tx.clone());
        }
        info!("Threshold reached, {} transactions in progress", batch.len());
        Ok(Some(batch))
    }

    /// All or nothing: every transaction must currently be in progress.
    pub fn promote_to_committed(&mut self, batch: &[Transaction]) -> Result<(), PbftError> {
        if let Some(missing) = batch.iter().find(|tx| !self.in_progress.contains_key(&tx.id)) {
            return Err(PbftError::NotInProgress(missing.id.clone()));
        }
        for tx in batch {
            if let Some(tx) = self.in_progress.remove(&tx.id) {
                self.committed.insert(tx.id.clone(), tx);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
        self.in_progress.clear();
        self.committed.clear();
    }

    pub fn waiting(&self) -> &[Transaction] {
        &self.waiting
    }

    pub fn in_progress(&self) -> impl Iterator<Item = &Transaction> {
        self.in_progress.values()
    }

    pub fn committed(&self) -> impl Iterator<Item = &Transaction> {
        self.committed.values()
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_progress_len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_committed(&self, id: &str) -> bool {
        self.committed.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbft_common::Wallet;

    fn txs(n: usize) -> Vec<Transaction> {
        let wallet = Wallet::new("NODE-0");
        (0..n)
            .map(|i| wallet.create_transaction(format!("tx-{}", i)).unwrap())
            .collect()
    }

    #[test]
    fn batch_extracted_at_threshold() {
        let mut pool = TxPool::new(5);
        let all = txs(5);
        for tx in &all[..4] {
            assert!(pool.admit(tx.clone()).unwrap().is_none());
        }
        assert_eq!(pool.waiting_len(), 4);

        let batch = pool.admit(all[4].clone()).unwrap().unwrap();
        assert_eq!(batch, all);
        assert_eq!(pool.waiting_len(), 0);
        assert_eq!(pool.in_progress_len(), 5);
    }

    #[test]
    fn duplicates_rejected_in_every_state() {
        let mut pool = TxPool::new(2);
        let all = txs(2);

        pool.admit(all[0].clone()).unwrap();
        assert!(matches!(
            pool.admit(all[0].clone()),
            Err(PbftError::DuplicateTransaction(_))
        ));

        let batch = pool.admit(all[1].clone()).unwrap().unwrap();
        assert!(pool.admit(all[1].clone()).is_err());

        pool.promote_to_committed(&batch).unwrap();
        assert!(pool.admit(all[0].clone()).is_err());
        assert_eq!(pool.committed_len(), 2);
    }

    #[test]
    fn promotion_is_all_or_nothing() {
        let mut pool = TxPool::new(2);
        let all = txs(3);
        pool.admit(all[0].clone()).unwrap();
        let batch = pool.admit(all[1].clone()).unwrap().unwrap();

        let mut bogus = batch.clone();
        bogus.push(all[2].clone());
        assert!(matches!(
            pool.promote_to_committed(&bogus),
            Err(PbftError::NotInProgress(_))
        ));
        assert_eq!(pool.in_progress_len(), 2);
        assert_eq!(pool.committed_len(), 0);

        pool.promote_to_committed(&batch).unwrap();
        assert_eq!(pool.in_progress_len(), 0);
        assert!(batch.iter().all(|tx| pool.is_committed(&tx.id)));

        assert!(pool.promote_to_committed(&batch).is_err());
    }

    #[test]
    fn states_stay_disjoint() {
        let mut pool = TxPool::new(3);
        let all = txs(7);
        let mut batches = Vec::new();
        for tx in all.clone() {
            if let Some(batch) = pool.admit(tx).unwrap() {
                batches.push(batch);
            }
        }
        pool.promote_to_committed(&batches[0]).unwrap();

        for tx in &all {
            let hits = pool.waiting().iter().filter(|w| w.id == tx.id).count()
                + pool.in_progress().filter(|w| w.id == tx.id).count()
                + pool.committed().filter(|w| w.id == tx.id).count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn clear_resets_everything() {
        let mut pool = TxPool::new(1);
        let batch = pool.admit(txs(1).remove(0)).unwrap().unwrap();
        pool.promote_to_committed(&batch).unwrap();
        pool.clear();
        assert_eq!(pool.waiting_len() + pool.in_progress_len() + pool.committed_len(), 0);
        assert!(pool.admit(batch[0].clone()).is_ok());
    }
}
