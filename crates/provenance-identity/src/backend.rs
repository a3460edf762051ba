//! Signing strategies.
//!
//! Two implementations sit behind [`SigningBackend`]: BIP-340 Schnorr over
//! secp256k1 for production and an HMAC-SHA256 fallback that is only
//! verifiable by the key holder. Verification picks the backend named in the
//! signature, never the one that happens to be active.

use provenance_core::{Keypair, SchnorrPublicKey, SchnorrSignature, Sha256Hash};

use crate::error::Result;

pub use provenance_core::SignatureAlgorithm;

/// A strategy for signing and verifying 32-byte digests.
pub trait SigningBackend: Send + Sync {
    fn algorithm(&self) -> SignatureAlgorithm;

    /// Sign a digest with the holder's key.
    fn sign(&self, keypair: &Keypair, digest: &Sha256Hash) -> Result<Vec<u8>>;

    /// Check a signature by `signer` over `digest`.
    ///
    /// `holder` is the local key; only strategies without public
    /// verification need it.
    fn verify(
        &self,
        holder: &Keypair,
        signer: &SchnorrPublicKey,
        digest: &Sha256Hash,
        signature: &[u8],
    ) -> bool;
}

/// BIP-340 Schnorr signatures over secp256k1.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchnorrBackend;

impl SigningBackend for SchnorrBackend {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::SchnorrSecp256k1
    }

    fn sign(&self, keypair: &Keypair, digest: &Sha256Hash) -> Result<Vec<u8>> {
        Ok(keypair.sign(digest.as_bytes())?.as_bytes().to_vec())
    }

    fn verify(
        &self,
        _holder: &Keypair,
        signer: &SchnorrPublicKey,
        digest: &Sha256Hash,
        signature: &[u8],
    ) -> bool {
        let sig: [u8; 64] = match signature.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        signer
            .verify(digest.as_bytes(), &SchnorrSignature::from_bytes(sig))
            .is_ok()
    }
}

/// HMAC-SHA256 keyed with the secret scalar.
///
/// Not a signature: anyone who can verify can also forge. Only for
/// environments without a working secp256k1 backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsecureHmacBackend;

impl SigningBackend for InsecureHmacBackend {
    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::InsecureHmacSha256
    }

    fn sign(&self, keypair: &Keypair, digest: &Sha256Hash) -> Result<Vec<u8>> {
        Ok(keypair.mac(digest.as_bytes())?.to_vec())
    }

    fn verify(
        &self,
        holder: &Keypair,
        signer: &SchnorrPublicKey,
        digest: &Sha256Hash,
        signature: &[u8],
    ) -> bool {
        holder.public_key() == *signer && holder.verify_mac(digest.as_bytes(), signature)
    }
}

/// The backend implementing `algorithm`.
pub fn backend_for(algorithm: SignatureAlgorithm) -> &'static dyn SigningBackend {
    match algorithm {
        SignatureAlgorithm::SchnorrSecp256k1 => &SchnorrBackend,
        SignatureAlgorithm::InsecureHmacSha256 => &InsecureHmacBackend,
    }
}
