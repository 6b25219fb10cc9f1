use crate::state::ConsensusState;
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Once;
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CHAIN_HEIGHT: IntGauge =
        IntGauge::new("pbft_chain_height", "Number of blocks in the chain, genesis included")
            .expect("metric can be created");
    pub static ref TX_WAITING: IntGauge =
        IntGauge::new("pbft_tx_waiting", "Transactions waiting for a batch")
            .expect("metric can be created");
    pub static ref TX_IN_PROGRESS: IntGauge =
        IntGauge::new("pbft_tx_in_progress", "Transactions in a proposed batch")
            .expect("metric can be created");
    pub static ref TX_COMMITTED: IntGauge =
        IntGauge::new("pbft_tx_committed", "Committed transactions")
            .expect("metric can be created");
    pub static ref BLOCK_POOL_SIZE: IntGauge =
        IntGauge::new("pbft_block_pool_size", "Proposed blocks held in the pool")
            .expect("metric can be created");
    pub static ref MESSAGES_DROPPED: IntCounter =
        IntCounter::new("pbft_messages_dropped_total", "Inbound messages dropped")
            .expect("metric can be created");
}

static INIT: Once = Once::new();

/// Registers every metric once per process.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(CHAIN_HEIGHT.clone()),
            Box::new(TX_WAITING.clone()),
            Box::new(TX_IN_PROGRESS.clone()),
            Box::new(TX_COMMITTED.clone()),
            Box::new(BLOCK_POOL_SIZE.clone()),
            Box::new(MESSAGES_DROPPED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }
    });
}

pub fn observe(state: &ConsensusState) {
    CHAIN_HEIGHT.set(state.blockchain.len() as i64);
    TX_WAITING.set(state.tx_pool.waiting_len() as i64);
    TX_IN_PROGRESS.set(state.tx_pool.in_progress_len() as i64);
    TX_COMMITTED.set(state.tx_pool.committed_len() as i64);
    BLOCK_POOL_SIZE.set(state.block_pool.len() as i64);
}

/// Prometheus text exposition of `REGISTRY`.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
