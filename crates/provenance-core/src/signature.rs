//! Detached content signatures and the strategies that produce them.
//!
//! Signing needs key material and lives in `provenance-identity`; the
//! signature record itself is plain data so that log events can carry one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::crypto::{SchnorrPublicKey, SchnorrSignature, Sha256Hash};

/// Identifier of the strategy that produced a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "schnorr-secp256k1")]
    SchnorrSecp256k1,
    #[serde(rename = "insecure-hmac-sha256")]
    InsecureHmacSha256,
}

impl SignatureAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::SchnorrSecp256k1 => "schnorr-secp256k1",
            SignatureAlgorithm::InsecureHmacSha256 => "insecure-hmac-sha256",
        }
    }

    /// Whether signatures from this strategy are only checkable by the key holder.
    pub fn is_insecure(self) -> bool {
        matches!(self, SignatureAlgorithm::InsecureHmacSha256)
    }
}

impl Default for SignatureAlgorithm {
    fn default() -> Self {
        SignatureAlgorithm::SchnorrSecp256k1
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "schnorr-secp256k1" => Ok(SignatureAlgorithm::SchnorrSecp256k1),
            "insecure-hmac-sha256" => Ok(SignatureAlgorithm::InsecureHmacSha256),
            other => Err(format!("unknown signature algorithm: {}", other)),
        }
    }
}

/// A detached signature over some content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSignature {
    /// SHA-256 of the signed content. Informational: verifiers recompute it.
    pub content_hash: Sha256Hash,
    /// Signature bytes, lowercase hex.
    pub signature: String,
    pub signer_pubkey: SchnorrPublicKey,
    pub algorithm: SignatureAlgorithm,
    /// Unix milliseconds (UTC).
    pub signed_at: i64,
}

impl ContentSignature {
    /// Verify a Schnorr signature without holding any key.
    ///
    /// Always `false` for the insecure HMAC strategy, which has no public check.
    pub fn verify_public(&self, content: &[u8]) -> bool {
        if self.algorithm != SignatureAlgorithm::SchnorrSecp256k1 {
            return false;
        }
        let digest = Sha256Hash::hash(content);
        if digest != self.content_hash {
            return false;
        }
        match SchnorrSignature::from_hex(&self.signature) {
            Ok(sig) => self.signer_pubkey.verify(digest.as_bytes(), &sig).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;

    #[test]
    fn test_algorithm_names() {
        for alg in [
            SignatureAlgorithm::SchnorrSecp256k1,
            SignatureAlgorithm::InsecureHmacSha256,
        ] {
            assert_eq!(alg.as_str().parse::<SignatureAlgorithm>().unwrap(), alg);
            let json = serde_json::to_string(&alg).unwrap();
            assert_eq!(json, format!("\"{}\"", alg.as_str()));
        }
        assert!("rsa".parse::<SignatureAlgorithm>().is_err());
    }

    #[test]
    fn test_verify_public() {
        let keypair = Keypair::generate();
        let digest = Sha256Hash::hash(b"content");
        let sig = ContentSignature {
            content_hash: digest,
            signature: keypair.sign(digest.as_bytes()).unwrap().to_hex(),
            signer_pubkey: keypair.public_key(),
            algorithm: SignatureAlgorithm::SchnorrSecp256k1,
            signed_at: 0,
        };
        assert!(sig.verify_public(b"content"));
        assert!(!sig.verify_public(b"Content"));

        let relabelled = ContentSignature {
            algorithm: SignatureAlgorithm::InsecureHmacSha256,
            ..sig
        };
        assert!(!relabelled.verify_public(b"content"));
    }
}
