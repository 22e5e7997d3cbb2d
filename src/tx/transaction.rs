//! Transaction bodies, fees, and signing

use super::keys::{KeyHandle, Network};
use crate::amount::{AssetId, FixedAmount, Price};
use crate::error::ValidationError;
use crate::ledger::AccountId;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::time::Duration;

/// Maximum size of a text memo in UTF-8 bytes
pub const MAX_MEMO_BYTES: usize = 28;

/// Domain separator mixed into every transaction hash
const ENVELOPE_TYPE_TX: &[u8] = b"envelope_tx";

/// Text memo attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Memo(String);

impl Memo {
    pub fn text(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.len() > MAX_MEMO_BYTES {
            return Err(ValidationError::MemoTooLong {
                len: text.len(),
                limit: MAX_MEMO_BYTES,
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ledger operation carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    CreateAccount {
        destination: AccountId,
        starting_balance: FixedAmount,
    },
    Payment {
        destination: AccountId,
        amount: FixedAmount,
    },
    ChangeTrust {
        asset: AssetId,
        limit: FixedAmount,
    },
    ManageOffer {
        selling: AssetId,
        buying: AssetId,
        amount: FixedAmount,
        price: Price,
        offer_id: u64,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateAccount { .. } => "create_account",
            Operation::Payment { .. } => "payment",
            Operation::ChangeTrust { .. } => "change_trust",
            Operation::ManageOffer { .. } => "manage_offer",
        }
    }
}

/// Total fee for a transaction: base fee per operation
pub fn compute_fee(base_fee: u32, operations: usize) -> Result<u64, ValidationError> {
    (base_fee as u64)
        .checked_mul(operations as u64)
        .ok_or(ValidationError::FeeOverflow {
            base_fee,
            operations,
        })
}

/// Expiry of a transaction built now with a per-attempt `timeout`
pub fn expiry_after(timeout: Duration) -> Result<DateTime<Utc>, ValidationError> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| Utc::now().checked_add_signed(timeout))
        .ok_or(ValidationError::TimeoutOutOfRange(timeout))
}

/// Unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub source_account: AccountId,
    pub sequence_number: u64,
    pub fee: u64,
    pub valid_until: DateTime<Utc>,
    pub memo: Option<Memo>,
    pub operations: Vec<Operation>,
}

impl TransactionBody {
    pub fn new(
        source_account: AccountId,
        sequence_number: u64,
        base_fee: u32,
        timeout: Duration,
        memo: Option<Memo>,
        operations: Vec<Operation>,
    ) -> Result<Self, ValidationError> {
        if operations.is_empty() {
            return Err(ValidationError::NoOperations);
        }
        let fee = compute_fee(base_fee, operations.len())?;
        let valid_until = expiry_after(timeout)?;

        Ok(Self {
            source_account,
            sequence_number,
            fee,
            valid_until,
            memo,
            operations,
        })
    }

    /// Network-scoped hash that signers commit to
    pub fn hash(&self, network: &Network) -> Result<[u8; 32], ValidationError> {
        let encoded =
            serde_json::to_vec(self).map_err(|e| ValidationError::Encoding(e.to_string()))?;

        let mut hasher = Sha3_256::new();
        hasher.update(network.network_id());
        hasher.update(ENVELOPE_TYPE_TX);
        hasher.update(&encoded);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());
        Ok(hash)
    }

    /// Sign with every signer.
    ///
    /// Every signer must hold a private key; this is checked for all of them
    /// before any signature is produced.
    pub fn sign(
        self,
        network: &Network,
        signers: &[KeyHandle],
    ) -> Result<SignedTransaction, ValidationError> {
        if signers.is_empty() {
            return Err(ValidationError::NoSigners);
        }
        for signer in signers {
            signer.validate_can_sign()?;
        }

        let hash = self.hash(network)?;
        let signatures = signers
            .iter()
            .map(|signer| {
                Ok(DecoratedSignature {
                    hint: hex::encode(signer.hint()),
                    signature: hex::encode(signer.sign(&hash)?.to_bytes()),
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(SignedTransaction {
            hash: hex::encode(hash),
            body: self,
            signatures,
        })
    }
}

/// Signature with a hint identifying the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: String,
    pub signature: String,
}

/// Signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub hash: String,
    pub body: TransactionBody,
    pub signatures: Vec<DecoratedSignature>,
}

impl SignedTransaction {
    pub fn sequence_number(&self) -> u64 {
        self.body.sequence_number
    }

    /// Check whether `key` produced one of the signatures for this network
    pub fn is_signed_by(&self, network: &Network, key: &VerifyingKey) -> bool {
        let hash = match self.body.hash(network) {
            Ok(hash) => hash,
            Err(_) => return false,
        };
        if hex::encode(hash) != self.hash {
            return false;
        }

        self.signatures.iter().any(|decorated| {
            let bytes = match hex::decode(&decorated.signature) {
                Ok(bytes) => bytes,
                Err(_) => return false,
            };
            let bytes: [u8; 64] = match bytes.try_into() {
                Ok(bytes) => bytes,
                Err(_) => return false,
            };
            key.verify_strict(&hash, &Signature::from_bytes(&bytes)).is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(to: &KeyHandle) -> Operation {
        Operation::Payment {
            destination: to.account_id(),
            amount: FixedAmount::new(5, 0, Some(AssetId::Native)).unwrap(),
        }
    }

    fn body(source: &KeyHandle, operations: Vec<Operation>) -> TransactionBody {
        TransactionBody::new(
            source.account_id(),
            42,
            100,
            Duration::from_secs(30),
            None,
            operations,
        )
        .unwrap()
    }

    #[test]
    fn test_memo_byte_limit() {
        assert!(Memo::text("a".repeat(28)).is_ok());
        assert_eq!(
            Memo::text("a".repeat(29)),
            Err(ValidationError::MemoTooLong { len: 29, limit: 28 })
        );
        // 14 two-byte characters is exactly 28 bytes
        assert!(Memo::text("é".repeat(14)).is_ok());
        assert!(Memo::text(format!("{}a", "é".repeat(14))).is_err());
    }

    #[test]
    fn test_fee_scales_with_operations() {
        assert_eq!(compute_fee(100, 3).unwrap(), 300);
        assert_eq!(compute_fee(0, 3).unwrap(), 0);
        assert!(compute_fee(u32::MAX, usize::MAX).is_err());
    }

    #[test]
    fn test_empty_operations_rejected() {
        let source = KeyHandle::random();
        let result = TransactionBody::new(
            source.account_id(),
            1,
            100,
            Duration::from_secs(30),
            None,
            vec![],
        );
        assert_eq!(result, Err(ValidationError::NoOperations));
    }

    #[test]
    fn test_huge_timeout_rejected() {
        let source = KeyHandle::random();
        let timeout = Duration::from_secs(10_000_000_000_000);
        let result = TransactionBody::new(
            source.account_id(),
            1,
            100,
            timeout,
            None,
            vec![payment(&KeyHandle::random())],
        );
        assert_eq!(result, Err(ValidationError::TimeoutOutOfRange(timeout)));
        assert_eq!(
            expiry_after(Duration::MAX),
            Err(ValidationError::TimeoutOutOfRange(Duration::MAX))
        );
        assert!(expiry_after(Duration::from_secs(30)).unwrap() > Utc::now());
    }

    #[test]
    fn test_sign_requires_private_keys() {
        let source = KeyHandle::random();
        let other = KeyHandle::random();
        let tx = body(&source, vec![payment(&other)]);

        let err = tx
            .clone()
            .sign(&Network::standalone(), &[source.clone(), other.to_public()])
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingPrivateKey(other.account_id()));

        assert_eq!(
            tx.sign(&Network::standalone(), &[]),
            Err(ValidationError::NoSigners)
        );
    }

    #[test]
    fn test_signatures_are_network_scoped() {
        let source = KeyHandle::random();
        let dest = KeyHandle::random();
        let network = Network::standalone();

        let signed = body(&source, vec![payment(&dest)])
            .sign(&network, &[source.clone()])
            .unwrap();

        assert_eq!(signed.sequence_number(), 42);
        assert_eq!(signed.body.fee, 100);
        assert!(signed.is_signed_by(&network, source.verifying_key()));
        assert!(!signed.is_signed_by(&network, dest.verifying_key()));
        assert!(!signed.is_signed_by(&Network::new("Other Network"), source.verifying_key()));
    }

    #[test]
    fn test_tampered_body_fails_verification() {
        let source = KeyHandle::random();
        let network = Network::standalone();
        let mut signed = body(&source, vec![payment(&KeyHandle::random())])
            .sign(&network, &[source.clone()])
            .unwrap();

        signed.body.sequence_number += 1;
        assert!(!signed.is_signed_by(&network, source.verifying_key()));
    }
}
