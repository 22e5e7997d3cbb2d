//! Signing keys and network identity

use crate::error::ValidationError;
use crate::ledger::AccountId;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Passphrase of a private standalone network
pub const STANDALONE_PASSPHRASE: &str = "Standalone Network ; February 2017";

/// Network identity; every signature is scoped to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    passphrase: String,
}

impl Network {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    pub fn standalone() -> Self {
        Self::new(STANDALONE_PASSPHRASE)
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }

    /// SHA3-256 of the passphrase
    pub fn network_id(&self) -> [u8; 32] {
        let digest = Sha3_256::digest(self.passphrase.as_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&digest);
        id
    }
}

/// An account key: public only, or able to sign
#[derive(Clone)]
pub struct KeyHandle {
    public: VerifyingKey,
    secret: Option<SigningKey>,
}

impl KeyHandle {
    /// Generate a fresh signing key
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(&seed))
    }

    /// Parse a hex encoded 32 byte secret seed
    pub fn from_secret_hex(secret: &str) -> Result<Self, ValidationError> {
        let bytes = hex::decode(secret.trim())
            .map_err(|e| ValidationError::InvalidKey(format!("secret is not hex: {}", e)))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ValidationError::InvalidKey("secret must be 32 bytes".to_string()))?;
        Ok(Self::from_seed(seed))
    }

    /// Public-only handle for an account
    pub fn from_account_id(account_id: &AccountId) -> Result<Self, ValidationError> {
        Ok(Self {
            public: parse_public_key(account_id)?,
            secret: None,
        })
    }

    fn from_signing_key(secret: SigningKey) -> Self {
        Self {
            public: secret.verifying_key(),
            secret: Some(secret),
        }
    }

    pub fn account_id(&self) -> AccountId {
        AccountId::new(hex::encode(self.public.as_bytes()))
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.public
    }

    pub fn can_sign(&self) -> bool {
        self.secret.is_some()
    }

    /// Same key with the private half dropped
    pub fn to_public(&self) -> Self {
        Self {
            public: self.public,
            secret: None,
        }
    }

    /// Last four bytes of the public key, used to match signatures to signers
    pub fn hint(&self) -> [u8; 4] {
        let bytes = self.public.as_bytes();
        [bytes[28], bytes[29], bytes[30], bytes[31]]
    }

    pub fn validate_can_sign(&self) -> Result<(), ValidationError> {
        if self.can_sign() {
            Ok(())
        } else {
            Err(ValidationError::MissingPrivateKey(self.account_id()))
        }
    }

    pub fn sign(&self, payload: &[u8]) -> Result<Signature, ValidationError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| ValidationError::MissingPrivateKey(self.account_id()))?;
        Ok(secret.sign(payload))
    }

    pub fn verify(&self, payload: &[u8], signature: &Signature) -> bool {
        self.public.verify_strict(payload, signature).is_ok()
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("account_id", &self.account_id())
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

/// Decode an account id back into its public key
pub fn parse_public_key(account_id: &AccountId) -> Result<VerifyingKey, ValidationError> {
    let bytes = hex::decode(account_id.as_str())
        .map_err(|e| ValidationError::InvalidKey(format!("account id is not hex: {}", e)))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ValidationError::InvalidKey("account id must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| ValidationError::InvalidKey(e.to_string()))
}
