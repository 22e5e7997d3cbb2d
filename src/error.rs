//! Error types for transaction construction and submission

use crate::amount::{AmountError, FixedAmount};
use crate::ledger::{AccountId, TransactionResultCode};

use thiserror::Error;

/// Local precondition failures; no network call has been made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No signers supplied")]
    NoSigners,

    #[error("No operations supplied")]
    NoOperations,

    #[error("Memo is {len} bytes, limit is {limit}")]
    MemoTooLong { len: usize, limit: usize },

    #[error("Signer {0} has no private key")]
    MissingPrivateKey(AccountId),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error("Fee overflow: base fee {base_fee} x {operations} operations")]
    FeeOverflow { base_fee: u32, operations: usize },

    #[error("Sequence number overflow for account {0}")]
    SequenceOverflow(AccountId),

    #[error("Per-attempt timeout must be positive")]
    ZeroTimeout,

    #[error("Per-attempt timeout of {0:?} is out of range")]
    TimeoutOutOfRange(std::time::Duration),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Failures reported by a `LedgerClient` query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Reasons a payment cannot succeed, detected before submitting it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("No asset specified on amount {0}")]
    UntaggedAmount(FixedAmount),

    #[error("Sender {0} does not exist")]
    SenderMissing(AccountId),

    #[error("Receiver {0} does not exist")]
    ReceiverMissing(AccountId),

    #[error("Sender {account} does not hold any {asset}")]
    NoBalance { account: AccountId, asset: String },

    #[error("Sender {account} does not have enough {asset} to transfer {amount}; current balance {balance}")]
    InsufficientBalance {
        account: AccountId,
        asset: String,
        amount: String,
        balance: String,
    },

    #[error("Receiver {account} does not have a trust line for {asset}")]
    NoTrustLine { account: AccountId, asset: String },

    #[error("Receiver {account} trust line limit of {limit} is not enough to receive {amount}")]
    TrustLimitExceeded {
        account: AccountId,
        limit: String,
        amount: String,
    },

    #[error("Starting balance {amount} is below the minimum of {minimum}")]
    BelowMinimumBalance { amount: String, minimum: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// How a failed submission should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected locally, nothing reached the ledger
    Validation,
    /// The ledger (or transport) gave a definite answer
    Fatal,
    /// The transaction may or may not have been applied
    Ambiguous,
}

/// Terminal failure of a logical submission
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Payment not possible: {0}")]
    Preflight(#[from] PreflightError),

    #[error("Account {account_id} not found")]
    AccountNotFound { account_id: AccountId },

    #[error("Transaction failed after {tries} retries: {result_code} [{}]", .operation_codes.join(", "))]
    Rejected {
        tries: u32,
        result_code: TransactionResultCode,
        operation_codes: Vec<String>,
    },

    #[error("Sequence conflict persisted after {tries} retries: {result_code} [{}]", .operation_codes.join(", "))]
    ConflictExhausted {
        tries: u32,
        result_code: TransactionResultCode,
        operation_codes: Vec<String>,
    },

    #[error("Rate limited {throttled} times after {tries} retries")]
    RateLimited { tries: u32, throttled: u32 },

    #[error("Submission timed out after {tries} retries; sequence still {sequence}")]
    TimedOut { tries: u32, sequence: u64 },

    #[error(
        "Ambiguous outcome after {tries} retries: submission timed out and sequence of {account_id} moved from {sequence_before} to {}; skipping retry to avoid a duplicate transaction",
        describe_sequence(.sequence_after)
    )]
    Ambiguous {
        tries: u32,
        account_id: AccountId,
        sequence_before: u64,
        sequence_after: Option<u64>,
    },

    #[error("Transport error after {tries} retries: {message}")]
    Transport { tries: u32, message: String },
}

fn describe_sequence(sequence: &Option<u64>) -> String {
    match sequence {
        Some(sequence) => sequence.to_string(),
        None => "unknown".to_string(),
    }
}

impl SubmitError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SubmitError::Validation(_) | SubmitError::Preflight(_) => FailureKind::Validation,
            SubmitError::Ambiguous { .. } => FailureKind::Ambiguous,
            _ => FailureKind::Fatal,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == FailureKind::Validation
    }

    pub fn is_ambiguous(&self) -> bool {
        self.kind() == FailureKind::Ambiguous
    }

    /// Retries made before the failure, for remote failures
    pub fn tries(&self) -> Option<u32> {
        match self {
            SubmitError::Rejected { tries, .. }
            | SubmitError::ConflictExhausted { tries, .. }
            | SubmitError::RateLimited { tries, .. }
            | SubmitError::TimedOut { tries, .. }
            | SubmitError::Ambiguous { tries, .. }
            | SubmitError::Transport { tries, .. } => Some(*tries),
            _ => None,
        }
    }

    /// Last ledger result codes, if the ledger gave a verdict
    pub fn result_codes(&self) -> Option<(&TransactionResultCode, &[String])> {
        match self {
            SubmitError::Rejected {
                result_code,
                operation_codes,
                ..
            }
            | SubmitError::ConflictExhausted {
                result_code,
                operation_codes,
                ..
            } => Some((result_code, operation_codes.as_slice())),
            _ => None,
        }
    }

    /// Check if error needs an operator to look at it
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            SubmitError::Ambiguous { .. } | SubmitError::Transport { .. }
        )
    }
}

/// Result type for submission operations
pub type SubmitterResult<T> = Result<T, SubmitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let validation = SubmitError::from(ValidationError::NoSigners);
        assert!(validation.is_validation());
        assert_eq!(validation.tries(), None);

        let ambiguous = SubmitError::Ambiguous {
            tries: 2,
            account_id: AccountId::new("acct"),
            sequence_before: 10,
            sequence_after: Some(11),
        };
        assert!(ambiguous.is_ambiguous());
        assert!(ambiguous.should_alert());
        assert_eq!(ambiguous.tries(), Some(2));

        let rejected = SubmitError::Rejected {
            tries: 0,
            result_code: TransactionResultCode::Failed,
            operation_codes: vec!["op_no_trust".to_string()],
        };
        assert_eq!(rejected.kind(), FailureKind::Fatal);
        let (code, ops) = rejected.result_codes().unwrap();
        assert_eq!(code, &TransactionResultCode::Failed);
        assert_eq!(ops, ["op_no_trust".to_string()]);
    }

    #[test]
    fn test_messages_carry_codes() {
        let err = SubmitError::ConflictExhausted {
            tries: 3,
            result_code: TransactionResultCode::BadSeq,
            operation_codes: vec![],
        };
        assert_eq!(
            err.to_string(),
            "Sequence conflict persisted after 3 retries: tx_bad_seq []"
        );

        let err = SubmitError::Ambiguous {
            tries: 0,
            account_id: AccountId::new("acct"),
            sequence_before: 4,
            sequence_after: None,
        };
        assert!(err.to_string().contains("from 4 to unknown"));
    }
}
