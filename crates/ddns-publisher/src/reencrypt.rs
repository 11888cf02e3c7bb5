// # Credential Re-encryption
//
// The only place the operator key and the agent key meet. A stored secret is
// opened with the operator key and immediately resealed under the agent key;
// the plaintext lives in a `SecretString` for the duration of one call.
//
// `OperatorKey` is defined here and nowhere else, so code on the agent side
// has no type that could hold it.

use ddns_core::{AgentKey, SealedToken, SymmetricKey};
use secrecy::SecretString;

/// Key protecting secrets at rest on the administrative side
#[derive(Clone)]
pub struct OperatorKey(SymmetricKey);

impl OperatorKey {
    /// Parse an operator key from 64 hex characters
    pub fn from_hex(key_hex: &str) -> ddns_core::Result<Self> {
        SymmetricKey::from_hex(key_hex).map(Self)
    }

    /// Generate a random operator key
    pub fn generate() -> Self {
        Self(SymmetricKey::generate())
    }

    /// Seal a secret for storage on the administrative side
    pub fn seal(&self, plaintext: &SecretString) -> ddns_core::Result<String> {
        self.0.seal_hex(plaintext)
    }

    /// Open a stored secret
    pub fn open(&self, sealed_hex: &str) -> ddns_core::Result<SecretString> {
        self.0.open_hex(sealed_hex)
    }
}

impl std::fmt::Debug for OperatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OperatorKey(<REDACTED>)")
    }
}

/// Moves secrets from operator-key ciphertext to agent-key ciphertext
pub struct Reencryptor {
    operator: OperatorKey,
    agent: AgentKey,
}

impl Reencryptor {
    pub fn new(operator: OperatorKey, agent: AgentKey) -> Self {
        Self { operator, agent }
    }

    /// Reseal one stored secret for the configuration document
    ///
    /// Fails with `DecryptionFailed` when the stored value was not sealed
    /// under this operator key or is corrupt.
    pub fn reencrypt(&self, operator_sealed: &str) -> ddns_core::Result<SealedToken> {
        let plaintext = self.operator.open(operator_sealed)?;
        self.agent.seal(&plaintext)
    }
}

impl std::fmt::Debug for Reencryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reencryptor")
            .field("operator", &self.operator)
            .field("agent", &self.agent)
            .finish()
    }
}
