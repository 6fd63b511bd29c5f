//! RSA-PSS key lifecycle: load-or-generate, register, rotate.

use crate::error::{CirisError, Result};
use crate::models::SigningKey;
use crate::repositories::AuditRepository;
use chrono::Utc;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::pss::{BlindedSigningKey, Signature, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const KEY_SIZE_BITS: usize = 2048;
pub const ALGORITHM: &str = "RSA-PSS-SHA256";
pub const PRIVATE_KEY_FILE: &str = "audit_private.pem";
pub const PUBLIC_KEY_FILE: &str = "audit_public.pem";

/// Loads the process's active signing key from disk (or generates one), and
/// exposes sign/verify against entry hashes. The key directory holds only
/// the ACTIVE keypair under fixed names; rotated-out public keys stay
/// resolvable through the `audit_signing_keys` table, and their private
/// halves are not needed again.
pub struct KeyManager {
    key_dir: PathBuf,
    key_id: String,
    private_key: RsaPrivateKey,
}

impl KeyManager {
    fn private_key_path(key_dir: &Path) -> PathBuf {
        key_dir.join(PRIVATE_KEY_FILE)
    }

    fn public_key_path(key_dir: &Path) -> PathBuf {
        key_dir.join(PUBLIC_KEY_FILE)
    }

    /// Load the existing active key registered in the repository, or
    /// generate a fresh 2048-bit keypair and register it.
    pub async fn load_or_generate(key_dir: impl AsRef<Path>, repo: &AuditRepository) -> Result<Self> {
        let key_dir = key_dir.as_ref().to_path_buf();
        fs::create_dir_all(&key_dir)
            .map_err(|e| CirisError::Crypto(format!("failed to create key dir: {}", e)))?;

        if let Some(active) = repo.active_signing_key().await? {
            let path = Self::private_key_path(&key_dir);
            if path.exists() {
                let pem = fs::read_to_string(&path)
                    .map_err(|e| CirisError::Crypto(format!("failed to read private key: {}", e)))?;
                let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
                    .map_err(|e| CirisError::Crypto(format!("failed to parse private key: {}", e)))?;
                return Ok(Self {
                    key_dir,
                    key_id: active.key_id,
                    private_key,
                });
            }
        }

        Self::generate(key_dir, repo).await
    }

    async fn generate(key_dir: PathBuf, repo: &AuditRepository) -> Result<Self> {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, KEY_SIZE_BITS)
            .map_err(|e| CirisError::Crypto(format!("failed to generate RSA key: {}", e)))?;
        let public_key = RsaPublicKey::from(&private_key);

        let key_id = Uuid::new_v4().to_string();
        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CirisError::Crypto(format!("failed to encode private key: {}", e)))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CirisError::Crypto(format!("failed to encode public key: {}", e)))?;

        let path = Self::private_key_path(&key_dir);
        fs::write(&path, private_pem.as_bytes())
            .map_err(|e| CirisError::Crypto(format!("failed to write private key: {}", e)))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| CirisError::Crypto(format!("failed to set private key permissions: {}", e)))?;
        fs::write(Self::public_key_path(&key_dir), public_pem.as_bytes())
            .map_err(|e| CirisError::Crypto(format!("failed to write public key: {}", e)))?;

        repo.register_signing_key(&SigningKey {
            key_id: key_id.clone(),
            public_key_pem: public_pem,
            algorithm: ALGORITHM.to_string(),
            key_size: KEY_SIZE_BITS as i64,
            created_at: Utc::now().to_rfc3339(),
            revoked_at: None,
        })
        .await?;

        Ok(Self {
            key_dir,
            key_id,
            private_key,
        })
    }

    /// Generate a fresh key, revoke the previous one, and switch to it. The
    /// previous key stays on disk and registered so old entries still verify.
    pub async fn rotate(&mut self, repo: &AuditRepository) -> Result<()> {
        repo.revoke_signing_key(&self.key_id, &Utc::now().to_rfc3339()).await?;
        let fresh = Self::generate(self.key_dir.clone(), repo).await?;
        *self = fresh;
        Ok(())
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn sign(&self, entry_hash_hex: &str) -> Result<String> {
        let signing_key = BlindedSigningKey::<Sha256>::new(self.private_key.clone());
        let mut rng = OsRng;
        let signature = signing_key.sign_with_rng(&mut rng, entry_hash_hex.as_bytes());
        Ok(hex::encode(signature.to_bytes()))
    }

    pub fn verify(public_key_pem: &str, entry_hash_hex: &str, signature_hex: &str) -> Result<bool> {
        let public_key = RsaPublicKey::from_public_key_pem(public_key_pem)
            .map_err(|e| CirisError::Crypto(format!("failed to parse public key: {}", e)))?;
        let verifying_key = VerifyingKey::<Sha256>::new(public_key);
        let signature_bytes = hex::decode(signature_hex)
            .map_err(|e| CirisError::Crypto(format!("invalid signature encoding: {}", e)))?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|e| CirisError::Crypto(format!("invalid signature: {}", e)))?;
        Ok(verifying_key.verify(entry_hash_hex.as_bytes(), &signature).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn generated_key_signs_and_verifies() {
        let db = Database::test_in_memory().await.unwrap();
        let repo = AuditRepository::new(Arc::new(db));
        let dir = TempDir::new().unwrap();

        let manager = KeyManager::load_or_generate(dir.path(), &repo).await.unwrap();
        let registered = repo.find_signing_key(manager.key_id()).await.unwrap().unwrap();

        let signature = manager.sign("deadbeef").unwrap();
        assert!(KeyManager::verify(&registered.public_key_pem, "deadbeef", &signature).unwrap());
        assert!(!KeyManager::verify(&registered.public_key_pem, "tampered", &signature).unwrap());
    }

    #[tokio::test]
    async fn load_or_generate_reuses_existing_key_on_disk() {
        let db = Database::test_in_memory().await.unwrap();
        let repo = AuditRepository::new(Arc::new(db));
        let dir = TempDir::new().unwrap();

        let first = KeyManager::load_or_generate(dir.path(), &repo).await.unwrap();
        let first_id = first.key_id().to_string();
        drop(first);

        let second = KeyManager::load_or_generate(dir.path(), &repo).await.unwrap();
        assert_eq!(second.key_id(), first_id);
    }

    #[tokio::test]
    async fn keypair_lands_on_disk_with_restricted_private_permissions() {
        let db = Database::test_in_memory().await.unwrap();
        let repo = AuditRepository::new(Arc::new(db));
        let dir = TempDir::new().unwrap();

        KeyManager::load_or_generate(dir.path(), &repo).await.unwrap();

        let private = dir.path().join(PRIVATE_KEY_FILE);
        let public = dir.path().join(PUBLIC_KEY_FILE);
        assert!(private.exists());
        assert!(public.exists());

        let mode = std::fs::metadata(&private).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn signatures_are_randomized_but_both_verify() {
        let db = Database::test_in_memory().await.unwrap();
        let repo = AuditRepository::new(Arc::new(db));
        let dir = TempDir::new().unwrap();
        let manager = KeyManager::load_or_generate(dir.path(), &repo).await.unwrap();
        let registered = repo.find_signing_key(manager.key_id()).await.unwrap().unwrap();

        let sig_a = manager.sign("cafebabe").unwrap();
        let sig_b = manager.sign("cafebabe").unwrap();
        assert_ne!(sig_a, sig_b);
        assert!(KeyManager::verify(&registered.public_key_pem, "cafebabe", &sig_a).unwrap());
        assert!(KeyManager::verify(&registered.public_key_pem, "cafebabe", &sig_b).unwrap());
    }
}
