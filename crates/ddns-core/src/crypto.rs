// # Token Sealing
//
// Secrets cross the trust boundary as AES-256-GCM ciphertext. A sealed value
// is `hex(nonce || ciphertext || tag)` with a fresh 96-bit nonce per seal.
//
// Two independent key handles exist in the system:
//
// - `AgentKey` (this crate): opens the tokens embedded in the configuration
//   document. Only the agent and the publisher's re-encryption step hold it.
// - `OperatorKey` (`ddns-publisher`): protects secrets at rest on the
//   administrative side. The agent never sees it.
//
// Both wrap the same `SymmetricKey` primitive but are distinct types, so a
// token sealed under one can never be handed to the other by accident.
//
// Plaintext only ever exists inside `secrecy::SecretString`, which zeroizes
// on drop and redacts itself from `Debug`.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use secrecy::{ExposeSecret, SecretString, SecretVec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// AES-GCM standard nonce size
const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
const TAG_SIZE: usize = 16;

/// AES-256 key size in bytes
const KEY_SIZE: usize = 32;

/// Raw AES-256-GCM key shared by the typed key handles
#[derive(Clone)]
pub struct SymmetricKey {
    cipher: Aes256Gcm,
}

impl SymmetricKey {
    /// Parse a key from 64 hex characters
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = SecretVec::new(
            hex::decode(key_hex.trim())
                .map_err(|e| Error::invalid_key(format!("invalid hex key: {e}")))?,
        );
        if bytes.expose_secret().len() != KEY_SIZE {
            return Err(Error::invalid_key(format!(
                "key must be {KEY_SIZE} bytes ({} hex chars) long",
                KEY_SIZE * 2
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(bytes.expose_secret())
            .map_err(|e| Error::invalid_key(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Generate a random key, returned in its hex form
    pub fn generate_hex() -> SecretString {
        let key = Aes256Gcm::generate_key(OsRng);
        SecretString::new(hex::encode(key))
    }

    /// Seal a plaintext, returning hex encoded `nonce || ciphertext`
    pub fn seal_hex(&self, plaintext: &SecretString) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.expose_secret().as_bytes())
            .map_err(|e| Error::Other(format!("encryption failed: {e}")))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Open a value produced by [`SymmetricKey::seal_hex`]
    pub fn open_hex(&self, sealed_hex: &str) -> Result<SecretString> {
        let sealed = hex::decode(sealed_hex.trim())
            .map_err(|_| Error::decryption("ciphertext is not valid hex"))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::decryption("ciphertext is too short"));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::decryption("wrong key or corrupt ciphertext"))?;

        String::from_utf8(plaintext)
            .map(SecretString::new)
            .map_err(|_| Error::decryption("plaintext is not valid UTF-8"))
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<REDACTED>)")
    }
}

/// A token sealed under the agent key, as embedded in the configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedToken(String);

impl SealedToken {
    /// Wrap an already sealed hex string
    pub fn new(sealed_hex: impl Into<String>) -> Self {
        Self(sealed_hex.into())
    }

    /// The hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty (never valid)
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Key handle usable only by the update engine
///
/// The publisher uses it for the sealing half of re-encryption; the agent
/// uses it to open tokens right before an update call.
#[derive(Clone)]
pub struct AgentKey(SymmetricKey);

impl AgentKey {
    /// Parse an agent key from 64 hex characters
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        SymmetricKey::from_hex(key_hex).map(Self)
    }

    /// Generate a random agent key
    pub fn generate() -> Self {
        Self(SymmetricKey::generate())
    }

    /// Seal a plaintext token for the configuration document
    pub fn seal(&self, plaintext: &SecretString) -> Result<SealedToken> {
        self.0.seal_hex(plaintext).map(SealedToken)
    }

    /// Open a token from the configuration document
    pub fn open(&self, token: &SealedToken) -> Result<SecretString> {
        self.0.open_hex(token.as_str())
    }
}

impl std::fmt::Debug for AgentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AgentKey(<REDACTED>)")
    }
}
