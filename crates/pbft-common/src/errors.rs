#[derive(thiserror::Error, Debug)]
pub enum PbftError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Invalid transaction {0}: payload hash mismatch")]
    InvalidTransaction(String),
    #[error("Invalid block {0}: {1}")]
    InvalidBlock(String, String),
    #[error("Unknown validator: {0}")]
    UnknownValidator(String),
    #[error("Duplicate transaction with ID: {0}")]
    DuplicateTransaction(String),
    #[error("Duplicate block: {0}")]
    DuplicateBlock(String),
    #[error("Duplicate {kind} vote from {validator} for block {block}")]
    DuplicateVote {
        kind: String,
        block: String,
        validator: String,
    },
    #[error("Unexpected message kind: expected {expected}, got {got}")]
    UnexpectedKind { expected: String, got: String },
    #[error("Block not in pool: {0}")]
    BlockNotInPool(String),
    #[error("Last hash mismatch: chain head is {expected}, block extends {got}")]
    LastHashMismatch { expected: String, got: String },
    #[error("Unexpected proposer: expected {expected}, got {got}")]
    UnexpectedProposer { expected: String, got: String },
    #[error("Transaction not in progress: {0}")]
    NotInProgress(String),
}

impl PbftError {
    /// Duplicates are the normal echo of the rebroadcast mesh, not misbehaviour.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            PbftError::DuplicateTransaction(_)
                | PbftError::DuplicateBlock(_)
                | PbftError::DuplicateVote { .. }
        )
    }
}
