use crate::{errors::PbftError, serde_helpers::hex_array};
use bincode::Encode;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DIGEST_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Number of hex characters used when a key or hash is shown in logs.
const SHORT_HEX_LEN: usize = 6;

/// SHA-256 output. Raw bytes internally, lowercase hex on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode)]
pub struct Digest(#[serde(with = "hex_array")] [u8; DIGEST_LEN]);

/// Ed25519 verifying key bytes; the identity of a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode)]
pub struct PublicKey(#[serde(with = "hex_array")] [u8; PUBLIC_KEY_LEN]);

/// Ed25519 signature bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode)]
pub struct Signature(#[serde(with = "hex_array")] [u8; SIGNATURE_LEN]);

impl Digest {
    /// Sentinel used by the genesis block for both its own and its parent hash.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        short_hex(&self.0)
    }
}

impl PublicKey {
    pub fn new(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short(&self) -> String {
        short_hex(&self.0)
    }

    fn verifying_key(&self) -> Result<VerifyingKey, PbftError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| PbftError::InvalidSignature)
    }
}

impl Signature {
    pub fn new(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn short_hex(bytes: &[u8]) -> String {
    let mut s = hex::encode(bytes);
    s.truncate(SHORT_HEX_LEN);
    s
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], PbftError> {
    let bytes = hex::decode(s).map_err(|e| PbftError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| PbftError::InvalidHex(format!("expected {} bytes, got {}", N, v.len())))
}

impl FromStr for Digest {
    type Err = PbftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Digest)
    }
}

impl FromStr for PublicKey {
    type Err = PbftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(PublicKey)
    }
}

impl FromStr for Signature {
    type Err = PbftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed(s).map(Signature)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.short())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", short_hex(&self.0))
    }
}

/// Ed25519 keypair derived deterministically from a seed.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    public_key: PublicKey,
}

impl Keypair {
    /// Derives the 32-byte seed as `SHA-256(secret)`, so `"NODE-0"` always maps
    /// to the same identity on every machine.
    pub fn from_secret(secret: &str) -> Self {
        Self::from_seed(hash(secret.as_bytes()).as_bytes())
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public_key = PublicKey(signing_key.verifying_key().to_bytes());
        Keypair {
            signing_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn sign(&self, digest: &Digest) -> Signature {
        Signature(self.signing_key.sign(digest.as_bytes()).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

pub fn hash(data: &[u8]) -> Digest {
    Digest(Sha256::digest(data).into())
}

/// Hashes the canonical bincode encoding of `value`.
///
/// Every node must derive the same digest from the same logical value, so the
/// encoding is the fixed `bincode::config::standard()` rather than the JSON
/// wire form, whose field order and whitespace are not part of the contract.
pub fn hash_encoded<T: Encode>(value: &T) -> Result<Digest, PbftError> {
    let bytes = bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| PbftError::SerializationError(e.to_string()))?;
    Ok(hash(&bytes))
}

pub fn verify(
    public_key: &PublicKey,
    digest: &Digest,
    signature: &Signature,
) -> Result<(), PbftError> {
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    public_key
        .verifying_key()?
        .verify(digest.as_bytes(), &signature)
        .map_err(|_| PbftError::InvalidSignature)
}

/// Time-ordered unique id, used only as a transaction dedup key.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
