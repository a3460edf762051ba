//! Cryptographic primitives: BIP-340 Schnorr over secp256k1 and SHA-256.
//!
//! Hashes, keys and signatures are strong types. They serialize as lowercase
//! hex strings so log lines, descriptors and wire events stay human-readable.

use hmac::{Hmac, Mac};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidHex(format!("expected {} bytes", N)))
}

/// A 32-byte SHA-256 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sha256Hash(pub [u8; 32]);

impl Sha256Hash {
    /// Compute the SHA-256 hash of data.
    pub fn hash(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Hash a domain-separated message: `domain || data`.
    pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash the concatenation of two hashes (Merkle node combine).
    pub fn combine(left: &Sha256Hash, right: &Sha256Hash) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        Self(hasher.finalize().into())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<32>(s).map(Self)
    }

    /// The zero hash. Predecessor link of the first log event.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Sha256Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Sha256Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Sha256Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Sha256Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 32-byte x-only secp256k1 public key (BIP-340).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrPublicKey(pub [u8; 32]);

impl SchnorrPublicKey {
    /// Create from raw bytes. The bytes are not checked to be a curve point.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<32>(s).map(Self)
    }

    /// Verify a BIP-340 signature over a message.
    pub fn verify(&self, message: &[u8], signature: &SchnorrSignature) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::try_from(signature.0.as_slice())
            .map_err(|_| CoreError::InvalidSignature)?;
        verifying_key
            .verify_raw(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for SchnorrPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchnorrPub({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SchnorrPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for SchnorrPublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for SchnorrPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SchnorrPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A 64-byte BIP-340 Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature(pub [u8; 64]);

impl SchnorrSignature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<64>(s).map(Self)
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchnorrSig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for SchnorrSignature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 64]> for SchnorrSignature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

/// A secp256k1 keypair for BIP-340 signing.
///
/// The secret scalar never leaves this type except through
/// [`Keypair::secret_bytes`], which exists for key persistence.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Load from 32 raw secret bytes.
    ///
    /// Fails if the bytes are not a valid non-zero scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_bytes(bytes).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    /// Get the x-only public key.
    pub fn public_key(&self) -> SchnorrPublicKey {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.verifying_key().to_bytes());
        SchnorrPublicKey(out)
    }

    /// Sign a message with fresh auxiliary randomness.
    pub fn sign(&self, message: &[u8]) -> Result<SchnorrSignature> {
        let mut aux = [0u8; 32];
        OsRng.fill_bytes(&mut aux);
        self.sign_with_aux(message, &aux)
    }

    /// Sign a message with caller-supplied auxiliary randomness.
    ///
    /// Deterministic for a fixed `aux`, which is what BIP-340 test vectors need.
    pub fn sign_with_aux(&self, message: &[u8], aux: &[u8; 32]) -> Result<SchnorrSignature> {
        let sig = self
            .signing_key
            .sign_raw(message, aux)
            .map_err(|_| CoreError::InvalidSignature)?;
        Ok(SchnorrSignature(sig.to_bytes()))
    }

    /// HMAC-SHA256 of a message keyed with the secret scalar.
    pub fn mac(&self, message: &[u8]) -> Result<[u8; 32]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret_bytes())
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().into())
    }

    /// Check an HMAC-SHA256 tag in constant time.
    pub fn verify_mac(&self, message: &[u8], tag: &[u8]) -> bool {
        match <HmacSha256 as Mac>::new_from_slice(&self.secret_bytes()) {
            Ok(mut mac) => {
                mac.update(message);
                mac.verify_slice(tag).is_ok()
            }
            Err(_) => false,
        }
    }

    /// Get the raw secret bytes (for key persistence only).
    pub fn secret_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-340 test vector 0.
    const BIP340_SECRET: &str = "0000000000000000000000000000000000000000000000000000000000000003";
    const BIP340_PUBKEY: &str = "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9";
    const BIP340_SIG: &str = "e907831f80848d1069a5371b402410364bdf1c5f8307b0084c55f1ce2dca821525f66a4a85ea8b71e482a74f382d2ce5ebeee8fdb2172f477df4900d310536c0";

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = Sha256Hash::hash(b"hello world");
        let signature = keypair.sign(message.as_bytes()).unwrap();

        keypair
            .public_key()
            .verify(message.as_bytes(), &signature)
            .expect("valid signature should verify");

        let tampered = Sha256Hash::hash(b"hello worlD");
        assert!(keypair.public_key().verify(tampered.as_bytes(), &signature).is_err());
    }

    #[test]
    fn test_bip340_vector_zero() {
        let secret = hex::decode(BIP340_SECRET).unwrap();
        let keypair = Keypair::from_secret_bytes(&secret).unwrap();
        assert_eq!(keypair.public_key().to_hex(), BIP340_PUBKEY);

        let sig = keypair.sign_with_aux(&[0u8; 32], &[0u8; 32]).unwrap();
        assert_eq!(sig.to_hex(), BIP340_SIG);
        keypair.public_key().verify(&[0u8; 32], &sig).unwrap();
    }

    #[test]
    fn test_secret_bytes_roundtrip() {
        let keypair = Keypair::generate();
        let restored = Keypair::from_secret_bytes(&keypair.secret_bytes()).unwrap();
        assert_eq!(keypair.public_key(), restored.public_key());
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(matches!(
            Keypair::from_secret_bytes(&[0u8; 32]),
            Err(CoreError::InvalidSecretKey)
        ));
        assert!(Keypair::from_secret_bytes(&[1u8; 7]).is_err());
    }

    #[test]
    fn test_mac_depends_on_key() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let tag = a.mac(b"payload").unwrap();
        assert!(a.verify_mac(b"payload", &tag));
        assert!(!b.verify_mac(b"payload", &tag));
        assert!(!a.verify_mac(b"payloaD", &tag));
    }

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            Sha256Hash::hash(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_serializes_as_hex() {
        let h = Sha256Hash::hash(b"x");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: Sha256Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        assert!(serde_json::from_str::<Sha256Hash>("\"abcd\"").is_err());
    }
}
