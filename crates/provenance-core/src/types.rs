//! Strong type definitions shared across the provenance crates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{SchnorrPublicKey, Sha256Hash};

/// Number of digest bytes kept in an identity address.
const ADDRESS_BYTES: usize = 20;

/// A short, stable identifier derived from a public key.
///
/// Lowercase hex of the first 20 bytes of SHA-256(x-only public key).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityAddress(String);

impl IdentityAddress {
    /// Derive the address of a public key.
    pub fn derive(public_key: &SchnorrPublicKey) -> Self {
        let digest = Sha256Hash::hash(public_key.as_bytes());
        Self(hex::encode(&digest.as_bytes()[..ADDRESS_BYTES]))
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdentityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityAddress({})", self.0)
    }
}

impl fmt::Display for IdentityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Current time in Unix seconds (wire events use seconds).
pub fn now_seconds() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_address_is_stable() {
        let keypair = Keypair::generate();
        let a1 = IdentityAddress::derive(&keypair.public_key());
        let a2 = IdentityAddress::derive(&keypair.public_key());
        assert_eq!(a1, a2);
        assert_eq!(a1.as_str().len(), 40);
    }

    #[test]
    fn test_address_differs_per_key() {
        let a = IdentityAddress::derive(&Keypair::generate().public_key());
        let b = IdentityAddress::derive(&Keypair::generate().public_key());
        assert_ne!(a, b);
    }
}
