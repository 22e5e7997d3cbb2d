//! Transaction construction, signing, and reliable submission

mod backoff;
mod keys;
mod preflight;
mod sequence;
mod submitter;
mod transaction;

pub use backoff::{BackoffPolicy, FixedBackoff, RandomizedBackoff};
pub use keys::{parse_public_key, KeyHandle, Network, STANDALONE_PASSPHRASE};
pub use preflight::{check_payment, check_starting_balance};
pub use sequence::{next_sequence, reconcile, SequenceVerdict};
pub use submitter::{SubmitReceipt, SubmitRequest, TransactionAttempt, TransactionSubmitter};
pub use transaction::{
    compute_fee, expiry_after, DecoratedSignature, Memo, Operation, SignedTransaction,
    TransactionBody, MAX_MEMO_BYTES,
};
