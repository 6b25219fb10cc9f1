use pbft_common::{min_approvals, Digest, Keypair, PbftError, PublicKey};

/// The fixed, ordered set of public keys allowed to vote and propose.
///
/// Keys are derived from the secrets `NODE-0 .. NODE-{n-1}`. That stands in for
/// out-of-band validator provisioning: anyone who knows the naming scheme can
/// derive every validator's private key.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    keys: Vec<PublicKey>,
}

impl ValidatorSet {
    pub fn new(n: usize) -> Result<Self, PbftError> {
        let keys = (0..n)
            .map(|i| Keypair::from_secret(&format!("NODE-{}", i)).public_key())
            .collect();
        Self::from_keys(keys)
    }

    pub fn from_keys(keys: Vec<PublicKey>) -> Result<Self, PbftError> {
        if keys.is_empty() {
            return Err(PbftError::ConfigError(
                "validator set must not be empty".to_string(),
            ));
        }
        Ok(ValidatorSet { keys })
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn size(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn min_approvals(&self) -> usize {
        min_approvals(self.keys.len())
    }

    /// Leader election: `validators[hash[0] mod n]`. Every node computes it from
    /// its own chain head with no communication.
    pub fn proposer_for(&self, head_hash: &Digest) -> PublicKey {
        let index = head_hash.as_bytes()[0] as usize % self.keys.len();
        self.keys[index]
    }
}
