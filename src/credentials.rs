//! Per-user provider credentials, encrypted at rest.
//!
//! Stores hand out plaintext through [`CredentialStore::get`], which can
//! fail (bad ciphertext, rotated key, storage error). The finder reads
//! credentials through [`UserCredentials`], which turns every such failure
//! into "not configured" so a broken secret never aborts a search.

use crate::models::{ProviderConfig, ProviderKind};
use async_trait::async_trait;
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

const NONCE_LENGTH: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    ApiKey(ProviderKind),
    /// Client secret paired with the Snov client id.
    SnovSecret,
}

impl CredentialKey {
    /// Stable name used as the storage key.
    pub fn storage_name(&self) -> String {
        match self {
            CredentialKey::ApiKey(provider) => format!("{}_api_key", provider.as_str()),
            CredentialKey::SnovSecret => "snov_client_secret".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Stored value could not be decrypted with the current key.
    Decrypt(String),
    Encrypt(String),
    /// Encryption key material is missing or malformed.
    InvalidKey(String),
    Storage(String),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::Decrypt(msg) => write!(f, "Credential decryption failed: {}", msg),
            CredentialError::Encrypt(msg) => write!(f, "Credential encryption failed: {}", msg),
            CredentialError::InvalidKey(msg) => write!(f, "Invalid encryption key: {}", msg),
            CredentialError::Storage(msg) => write!(f, "Credential storage error: {}", msg),
        }
    }
}

impl std::error::Error for CredentialError {}

/// ChaCha20-Poly1305 sealing for stored secrets.
///
/// Ciphertexts are stored as `hex(nonce):hex(ciphertext)`.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialCipher([REDACTED])")
    }
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Resolves the key from `ENCRYPTION_KEY` (64 hex chars) or, failing
    /// that, the SHA-256 digest of `SECRET_KEY`.
    pub fn from_key_material(
        encryption_key: Option<&str>,
        secret_key: Option<&str>,
    ) -> Result<Self, CredentialError> {
        if let Some(hex_key) = encryption_key.map(str::trim).filter(|k| !k.is_empty()) {
            let bytes = hex::decode(hex_key)
                .map_err(|e| CredentialError::InvalidKey(format!("ENCRYPTION_KEY is not hex: {}", e)))?;
            let key: [u8; 32] = bytes.try_into().map_err(|_| {
                CredentialError::InvalidKey("ENCRYPTION_KEY must be 32 bytes (64 hex chars)".to_string())
            })?;
            return Ok(Self::new(key));
        }

        if let Some(secret) = secret_key.filter(|s| !s.trim().is_empty()) {
            let digest = Sha256::digest(secret.as_bytes());
            let mut key = [0u8; 32];
            key.copy_from_slice(&digest);
            return Ok(Self::new(key));
        }

        Err(CredentialError::InvalidKey(
            "ENCRYPTION_KEY or SECRET_KEY must be set".to_string(),
        ))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| CredentialError::Encrypt(e.to_string()))?;

        Ok(format!("{}:{}", hex::encode(nonce), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CredentialError> {
        let (nonce_hex, ciphertext_hex) = stored
            .split_once(':')
            .ok_or_else(|| CredentialError::Decrypt("missing nonce separator".to_string()))?;

        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| CredentialError::Decrypt(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LENGTH {
            return Err(CredentialError::Decrypt("bad nonce length".to_string()));
        }
        let ciphertext =
            hex::decode(ciphertext_hex).map_err(|e| CredentialError::Decrypt(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new((&self.key).into());
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| CredentialError::Decrypt(e.to_string()))?;

        String::from_utf8(plaintext).map_err(|e| CredentialError::Decrypt(e.to_string()))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user_id: i64, key: CredentialKey) -> Result<Option<String>, CredentialError>;

    /// Stores `value`. Blank values are ignored and leave the old one in place.
    async fn set(&self, user_id: i64, key: CredentialKey, value: &str) -> Result<(), CredentialError>;

    async fn has(&self, user_id: i64, key: CredentialKey) -> bool {
        matches!(self.get(user_id, key).await, Ok(Some(v)) if !v.trim().is_empty())
    }
}

/// Read-only view of one user's credentials, as consumed by the finder.
pub struct UserCredentials<'a> {
    user_id: i64,
    store: &'a dyn CredentialStore,
}

impl<'a> UserCredentials<'a> {
    pub fn new(user_id: i64, store: &'a dyn CredentialStore) -> Self {
        Self { user_id, store }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    async fn read(&self, key: CredentialKey) -> Option<String> {
        match self.store.get(self.user_id, key).await {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                tracing::warn!(
                    "Treating {} for user {} as not configured: {}",
                    key.storage_name(),
                    self.user_id,
                    e
                );
                None
            }
        }
    }

    pub async fn get_api_key(&self, provider: ProviderKind) -> Option<String> {
        self.read(CredentialKey::ApiKey(provider)).await
    }

    pub async fn get_snov_secret(&self) -> Option<String> {
        self.read(CredentialKey::SnovSecret).await
    }

    pub async fn has_provider(&self, provider: ProviderKind) -> bool {
        self.get_api_key(provider).await.is_some()
    }

    pub async fn provider_config(&self, provider: ProviderKind) -> ProviderConfig {
        let secret = match provider {
            ProviderKind::Snov => self.get_snov_secret().await,
            _ => None,
        };
        ProviderConfig::new(self.get_api_key(provider).await, secret)
    }
}

/// Encrypted in-process credential store.
#[derive(Clone)]
pub struct MemoryCredentialStore {
    cipher: CredentialCipher,
    rows: Arc<Mutex<HashMap<(i64, CredentialKey), String>>>,
}

impl MemoryCredentialStore {
    pub fn new(cipher: CredentialCipher) -> Self {
        Self {
            cipher,
            rows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Stores an already-encrypted value as-is.
    pub fn insert_raw(&self, user_id: i64, key: CredentialKey, stored: &str) -> Result<(), CredentialError> {
        self.rows
            .lock()
            .map_err(|_| CredentialError::Storage("lock poisoned".to_string()))?
            .insert((user_id, key), stored.to_string());
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, user_id: i64, key: CredentialKey) -> Result<Option<String>, CredentialError> {
        let stored = self
            .rows
            .lock()
            .map_err(|_| CredentialError::Storage("lock poisoned".to_string()))?
            .get(&(user_id, key))
            .cloned();

        stored.map(|s| self.cipher.decrypt(&s)).transpose()
    }

    async fn set(&self, user_id: i64, key: CredentialKey, value: &str) -> Result<(), CredentialError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let sealed = self.cipher.encrypt(value)?;
        self.insert_raw(user_id, key, &sealed)
    }
}
