//! KeyStore: generates, persists and loads a secp256k1 identity.
//!
//! On-disk layout for identity `<name>` inside the key directory:
//!
//! ```text
//! <name>.key   32 raw secret bytes, mode 0600
//! <name>.pub   x-only public key, lowercase hex
//! <name>.json  descriptor {name, public_key, address, created_at, algorithm}
//! ```
//!
//! The public key and descriptor are always derived from the secret. If they
//! disagree with it on load they are rewritten, never trusted.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use provenance_core::{now_millis, IdentityAddress, Keypair, SchnorrPublicKey, SchnorrSignature, Sha256Hash};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{backend_for, SignatureAlgorithm};
use crate::error::{IdentityError, Result};

/// The public description of an identity, persisted next to its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    pub name: String,
    pub public_key: SchnorrPublicKey,
    pub address: IdentityAddress,
    /// Unix milliseconds of key generation.
    pub created_at: i64,
    pub algorithm: SignatureAlgorithm,
}

impl IdentityDescriptor {
    fn new(name: &str, keypair: &Keypair, created_at: i64, algorithm: SignatureAlgorithm) -> Self {
        let public_key = keypair.public_key();
        Self {
            name: name.to_string(),
            public_key,
            address: IdentityAddress::derive(&public_key),
            created_at,
            algorithm,
        }
    }
}

struct KeyPaths {
    dir: PathBuf,
    key: PathBuf,
    public: PathBuf,
    descriptor: PathBuf,
}

impl KeyPaths {
    fn new(dir: &Path, name: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            key: dir.join(format!("{}.key", name)),
            public: dir.join(format!("{}.pub", name)),
            descriptor: dir.join(format!("{}.json", name)),
        }
    }
}

/// Exclusive owner of an identity's private key.
///
/// Other components hold an `Arc<KeyStore>` and sign through it; the secret
/// scalar is never handed out.
pub struct KeyStore {
    keypair: Keypair,
    algorithm: SignatureAlgorithm,
    descriptor: IdentityDescriptor,
    key_path: Option<PathBuf>,
}

impl KeyStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Load identity `name` from `dir`, generating and persisting it first if
    /// no private key exists yet.
    ///
    /// Idempotent: a second call returns the same key and never rewrites
    /// existing files. Fails with
    /// [`IdentityError::KeyUnavailable`] if the persisted key is corrupt or
    /// unreadable.
    pub fn generate_or_load(
        dir: impl AsRef<Path>,
        name: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        validate_name(name)?;
        let paths = KeyPaths::new(dir.as_ref(), name);

        let (keypair, descriptor) = if paths.key.exists() {
            let keypair = read_secret(&paths.key)?;
            let descriptor = reconcile_public_files(&paths, name, &keypair, algorithm)?;
            info!(identity = name, public_key = %keypair.public_key(), "loaded identity");
            (keypair, descriptor)
        } else {
            if paths.public.exists() || paths.descriptor.exists() {
                warn!(
                    identity = name,
                    "public files exist without a private key; generating a new identity"
                );
            }
            create_private_dir(&paths.dir)?;
            let keypair = Keypair::generate();
            write_atomic(&paths.key, &keypair.secret_bytes(), true)?;

            let descriptor = IdentityDescriptor::new(name, &keypair, now_millis(), algorithm);
            write_public_files(&paths, &descriptor)?;
            info!(identity = name, public_key = %keypair.public_key(), "generated identity");
            (keypair, descriptor)
        };

        Ok(Self::assemble(keypair, algorithm, descriptor, Some(paths.key)))
    }

    /// A fresh identity that is never written to disk.
    pub fn ephemeral(name: &str, algorithm: SignatureAlgorithm) -> Self {
        let keypair = Keypair::generate();
        let descriptor = IdentityDescriptor::new(name, &keypair, now_millis(), algorithm);
        Self::assemble(keypair, algorithm, descriptor, None)
    }

    /// An in-memory identity from known secret bytes.
    pub fn from_secret_bytes(
        name: &str,
        secret: &[u8],
        algorithm: SignatureAlgorithm,
    ) -> Result<Self> {
        let keypair = Keypair::from_secret_bytes(secret)?;
        let descriptor = IdentityDescriptor::new(name, &keypair, now_millis(), algorithm);
        Ok(Self::assemble(keypair, algorithm, descriptor, None))
    }

    fn assemble(
        keypair: Keypair,
        algorithm: SignatureAlgorithm,
        descriptor: IdentityDescriptor,
        key_path: Option<PathBuf>,
    ) -> Self {
        if algorithm.is_insecure() {
            warn!(
                identity = %descriptor.name,
                algorithm = %algorithm,
                "insecure signing strategy selected; signatures are not publicly verifiable"
            );
        }
        Self {
            keypair,
            algorithm,
            descriptor,
            key_path,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn public_key(&self) -> SchnorrPublicKey {
        self.descriptor.public_key
    }

    pub fn address(&self) -> &IdentityAddress {
        &self.descriptor.address
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &IdentityDescriptor {
        &self.descriptor
    }

    /// The active signing strategy.
    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Path of the private key file, if persisted.
    pub fn key_path(&self) -> Option<&Path> {
        self.key_path.as_deref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signing
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign a digest with the active strategy.
    pub fn sign_digest(&self, digest: &Sha256Hash) -> Result<Vec<u8>> {
        backend_for(self.algorithm).sign(&self.keypair, digest)
    }

    /// Verify a digest signature with the strategy named by `algorithm`.
    pub fn verify_digest(
        &self,
        algorithm: SignatureAlgorithm,
        signer: &SchnorrPublicKey,
        digest: &Sha256Hash,
        signature: &[u8],
    ) -> bool {
        backend_for(algorithm).verify(&self.keypair, signer, digest, signature)
    }

    /// BIP-340 signature over a 32-byte message, for protocols that demand it.
    pub fn sign_schnorr(&self, message: &Sha256Hash) -> Result<SchnorrSignature> {
        if self.algorithm != SignatureAlgorithm::SchnorrSecp256k1 {
            return Err(IdentityError::UnsupportedAlgorithm {
                algorithm: self.algorithm,
                operation: "schnorr signing",
            });
        }
        Ok(self.keypair.sign(message.as_bytes())?)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("name", &self.descriptor.name)
            .field("public_key", &self.descriptor.public_key)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File helpers
// ─────────────────────────────────────────────────────────────────────────────

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(IdentityError::InvalidIdentityName(name.to_string()))
    }
}

fn unavailable(path: &Path, reason: impl Into<String>) -> IdentityError {
    IdentityError::KeyUnavailable {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn read_secret(path: &Path) -> Result<Keypair> {
    let bytes = fs::read(path).map_err(|e| unavailable(path, e.to_string()))?;
    if bytes.len() != 32 {
        return Err(unavailable(
            path,
            format!("expected 32 secret bytes, found {}", bytes.len()),
        ));
    }
    Keypair::from_secret_bytes(&bytes)
        .map_err(|_| unavailable(path, "not a valid secp256k1 secret key"))
}

/// Check `.pub` and `.json` against the loaded secret.
///
/// Files that disagree are logged and left untouched; missing ones are written.
fn reconcile_public_files(
    paths: &KeyPaths,
    name: &str,
    keypair: &Keypair,
    algorithm: SignatureAlgorithm,
) -> Result<IdentityDescriptor> {
    let public_hex = keypair.public_key().to_hex();

    match fs::read_to_string(&paths.public) {
        Ok(stored) if stored.trim() == public_hex => {}
        Ok(_) => warn!(identity = name, "public key file does not match private key; leaving it"),
        Err(_) => {
            debug!(identity = name, "restoring missing public key file");
            write_atomic(&paths.public, public_hex.as_bytes(), false)?;
        }
    }

    let stored: Option<IdentityDescriptor> = fs::read(&paths.descriptor)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    let created_at = stored.as_ref().map_or_else(now_millis, |d| d.created_at);
    let expected = IdentityDescriptor::new(name, keypair, created_at, algorithm);

    match &stored {
        Some(descriptor) if descriptor == &expected => {}
        Some(_) => warn!(
            identity = name,
            algorithm = %algorithm,
            "identity descriptor differs from the loaded key; leaving it"
        ),
        None => {
            debug!(identity = name, "restoring missing identity descriptor");
            write_descriptor(&paths.descriptor, &expected)?;
        }
    }
    Ok(expected)
}

fn write_public_files(paths: &KeyPaths, descriptor: &IdentityDescriptor) -> Result<()> {
    write_atomic(&paths.public, descriptor.public_key.to_hex().as_bytes(), false)?;
    write_descriptor(&paths.descriptor, descriptor)
}

fn write_descriptor(path: &Path, descriptor: &IdentityDescriptor) -> Result<()> {
    let json = serde_json::to_vec_pretty(descriptor)
        .map_err(|e| IdentityError::Serialization(e.to_string()))?;
    write_atomic(path, &json, false)
}

fn create_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)?;
    }
    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Write to a sibling temp file, flush, then rename over `path`.
///
/// With `private`, the file is created owner read/write only.
fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if private { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(&tmp)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCHNORR: SignatureAlgorithm = SignatureAlgorithm::SchnorrSecp256k1;

    #[test]
    fn test_generate_creates_files() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();

        let key_bytes = fs::read(dir.path().join("alice.key")).unwrap();
        assert_eq!(key_bytes.len(), 32);

        let public = fs::read_to_string(dir.path().join("alice.pub")).unwrap();
        assert_eq!(public, keys.public_key().to_hex());

        let descriptor: IdentityDescriptor =
            serde_json::from_slice(&fs::read(dir.path().join("alice.json")).unwrap()).unwrap();
        assert_eq!(&descriptor, keys.descriptor());
        assert_eq!(descriptor.algorithm, SCHNORR);
        assert_eq!(keys.key_path(), Some(dir.path().join("alice.key").as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        let mode = fs::metadata(dir.path().join("alice.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let first = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        let second = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        assert_eq!(first.public_key(), second.public_key());
        assert_eq!(first.descriptor(), second.descriptor());
    }

    #[test]
    fn test_identities_are_independent() {
        let dir = TempDir::new().unwrap();
        let alice = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        let bob = KeyStore::generate_or_load(dir.path(), "bob", SCHNORR).unwrap();
        assert_ne!(alice.public_key(), bob.public_key());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        KeyStore::generate_or_load(&nested, "alice", SCHNORR).unwrap();
        assert!(nested.join("alice.key").exists());
    }

    #[test]
    fn test_corrupt_key_is_unavailable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("alice.key"), b"short").unwrap();
        let err = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap_err();
        assert!(matches!(err, IdentityError::KeyUnavailable { .. }));

        fs::write(dir.path().join("alice.key"), [0u8; 32]).unwrap();
        let err = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap_err();
        assert!(matches!(err, IdentityError::KeyUnavailable { .. }));
    }

    #[test]
    fn test_load_leaves_mismatched_public_file_alone() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        fs::write(dir.path().join("alice.pub"), "00".repeat(32)).unwrap();

        let reloaded = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        assert_eq!(reloaded.public_key(), keys.public_key());
        let public = fs::read_to_string(dir.path().join("alice.pub")).unwrap();
        assert_eq!(public, "00".repeat(32));
    }

    #[test]
    fn test_load_restores_missing_public_files() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        fs::remove_file(dir.path().join("alice.pub")).unwrap();
        fs::remove_file(dir.path().join("alice.json")).unwrap();

        KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        let public = fs::read_to_string(dir.path().join("alice.pub")).unwrap();
        assert_eq!(public, keys.public_key().to_hex());
        assert!(dir.path().join("alice.json").exists());
    }

    #[test]
    fn test_descriptor_keeps_created_at_and_tracks_algorithm() {
        let dir = TempDir::new().unwrap();
        let keys = KeyStore::generate_or_load(dir.path(), "alice", SCHNORR).unwrap();
        let descriptor_path = dir.path().join("alice.json");
        let on_disk = fs::read(&descriptor_path).unwrap();
        let reloaded = KeyStore::generate_or_load(
            dir.path(),
            "alice",
            SignatureAlgorithm::InsecureHmacSha256,
        )
        .unwrap();
        assert_eq!(reloaded.descriptor().created_at, keys.descriptor().created_at);
        assert_eq!(
            reloaded.descriptor().algorithm,
            SignatureAlgorithm::InsecureHmacSha256
        );
        assert_eq!(fs::read(&descriptor_path).unwrap(), on_disk);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let dir = TempDir::new().unwrap();
        for name in ["", "../evil", ".hidden", "a/b", "sp ace"] {
            assert!(matches!(
                KeyStore::generate_or_load(dir.path(), name, SCHNORR),
                Err(IdentityError::InvalidIdentityName(_))
            ));
        }
    }

    #[test]
    fn test_schnorr_signing_requires_schnorr_strategy() {
        let keys = KeyStore::ephemeral("x", SignatureAlgorithm::InsecureHmacSha256);
        assert!(matches!(
            keys.sign_schnorr(&Sha256Hash::ZERO),
            Err(IdentityError::UnsupportedAlgorithm { .. })
        ));

        let keys = KeyStore::ephemeral("x", SCHNORR);
        let sig = keys.sign_schnorr(&Sha256Hash::ZERO).unwrap();
        keys.public_key().verify(Sha256Hash::ZERO.as_bytes(), &sig).unwrap();
    }

    #[test]
    fn test_from_secret_bytes_is_deterministic() {
        let a = KeyStore::from_secret_bytes("a", &[7u8; 32], SCHNORR).unwrap();
        let b = KeyStore::from_secret_bytes("b", &[7u8; 32], SCHNORR).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.address(), b.address());
    }
}
