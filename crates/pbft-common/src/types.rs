use crate::crypto::{self, Digest, Keypair, PublicKey, Signature, SIGNATURE_LEN};
use crate::errors::PbftError;
use bincode::Encode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client data carried by a transaction; the part covered by `Transaction::hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub data: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode)]
pub struct Transaction {
    pub id: String,
    pub from: PublicKey,
    pub payload: Payload,
    pub hash: Digest,
    pub signature: Signature,
}

impl Transaction {
    pub fn new(keypair: &Keypair, data: impl Into<String>) -> Result<Self, PbftError> {
        let payload = Payload {
            data: data.into(),
            created_at: crypto::now_millis(),
        };
        let hash = crypto::hash_encoded(&payload)?;
        Ok(Transaction {
            id: crypto::new_id(),
            from: keypair.public_key(),
            payload,
            hash,
            signature: keypair.sign(&hash),
        })
    }

    /// Checks payload -> hash, then hash -> signature under `from`.
    pub fn verify(&self) -> Result<(), PbftError> {
        if crypto::hash_encoded(&self.payload)? != self.hash {
            return Err(PbftError::InvalidTransaction(self.id.clone()));
        }
        crypto::verify(&self.from, &self.hash, &self.signature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "PREPARE")]
    Prepare,
    #[serde(rename = "COMMIT")]
    Commit,
    #[serde(rename = "ROUND-CHANGE")]
    RoundChange,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Prepare => "PREPARE",
            MessageKind::Commit => "COMMIT",
            MessageKind::RoundChange => "ROUND-CHANGE",
        };
        f.write_str(name)
    }
}

/// A validator's vote for one block hash in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseMessage {
    pub kind: MessageKind,
    pub block_hash: Digest,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl PhaseMessage {
    pub fn new(keypair: &Keypair, kind: MessageKind, block_hash: Digest) -> Self {
        PhaseMessage {
            kind,
            block_hash,
            public_key: keypair.public_key(),
            signature: keypair.sign(&block_hash),
        }
    }

    /// Signature check only; `kind` and `block_hash` are plaintext.
    pub fn verify(&self) -> Result<(), PbftError> {
        crypto::verify(&self.public_key, &self.block_hash, &self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub timestamp: u64,
    pub last_hash: Digest,
    pub hash: Digest,
    pub data: Vec<Transaction>,
    pub proposer: PublicKey,
    pub signature: Signature,
    pub nonce: u64,
    #[serde(default)]
    pub prepare_votes: Vec<PhaseMessage>,
    #[serde(default)]
    pub commit_votes: Vec<PhaseMessage>,
    #[serde(default)]
    pub round_change_votes: Vec<PhaseMessage>,
}

impl Block {
    /// Fixed first block; every field is a constant so all nodes start identically.
    pub fn genesis() -> Self {
        Block {
            timestamp: 0,
            last_hash: Digest::ZERO,
            hash: Digest::ZERO,
            data: Vec::new(),
            proposer: PublicKey::new([0u8; 32]),
            signature: Signature::new([0u8; SIGNATURE_LEN]),
            nonce: 0,
            prepare_votes: Vec::new(),
            commit_votes: Vec::new(),
            round_change_votes: Vec::new(),
        }
    }

    /// Builds and signs a block on top of `last`.
    pub fn new(keypair: &Keypair, last: &Block, data: Vec<Transaction>) -> Result<Self, PbftError> {
        let timestamp = crypto::now_millis();
        let nonce = last.nonce + 1;
        let hash = Self::compute_hash(timestamp, &last.hash, &data, nonce)?;
        Ok(Block {
            timestamp,
            last_hash: last.hash,
            hash,
            data,
            proposer: keypair.public_key(),
            signature: keypair.sign(&hash),
            nonce,
            prepare_votes: Vec::new(),
            commit_votes: Vec::new(),
            round_change_votes: Vec::new(),
        })
    }

    /// Consensus-critical: `Hash(timestamp ++ last_hash ++ data ++ nonce)` over
    /// the canonical encoding. Vote fields are never part of the hash.
    pub fn compute_hash(
        timestamp: u64,
        last_hash: &Digest,
        data: &[Transaction],
        nonce: u64,
    ) -> Result<Digest, PbftError> {
        crypto::hash_encoded(&(timestamp, last_hash, data, nonce))
    }

    /// Internal integrity only: recomputed hash and proposer signature.
    pub fn verify(&self) -> Result<(), PbftError> {
        let expected = Self::compute_hash(self.timestamp, &self.last_hash, &self.data, self.nonce)?;
        if expected != self.hash {
            return Err(PbftError::InvalidBlock(
                self.hash.short(),
                "hash does not match contents".to_string(),
            ));
        }
        crypto::verify(&self.proposer, &self.hash, &self.signature)
    }
}

/// Everything that crosses the wire, discriminated by `msgType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msgType")]
pub enum Envelope {
    #[serde(rename = "TX")]
    Tx(Transaction),
    #[serde(rename = "PRE-PREPARE")]
    PrePrepare(Block),
    #[serde(rename = "PREPARE")]
    Prepare(PhaseMessage),
    #[serde(rename = "COMMIT")]
    Commit(PhaseMessage),
    #[serde(rename = "ROUND-CHANGE")]
    RoundChange(PhaseMessage),
}

impl Envelope {
    /// Wraps a phase message in the variant matching its kind.
    pub fn phase(message: PhaseMessage) -> Self {
        match message.kind {
            MessageKind::Prepare => Envelope::Prepare(message),
            MessageKind::Commit => Envelope::Commit(message),
            MessageKind::RoundChange => Envelope::RoundChange(message),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Envelope::Tx(_) => "TX",
            Envelope::PrePrepare(_) => "PRE-PREPARE",
            Envelope::Prepare(_) => "PREPARE",
            Envelope::Commit(_) => "COMMIT",
            Envelope::RoundChange(_) => "ROUND-CHANGE",
        }
    }

    pub fn encode(&self) -> Result<String, PbftError> {
        serde_json::to_string(self).map_err(|e| PbftError::SerializationError(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Self, PbftError> {
        serde_json::from_str(payload).map_err(|e| PbftError::MalformedMessage(e.to_string()))
    }
}
