//! Ledger Submitter - fixed-point ledger amounts and reliable transaction submission
//!
//! Builds, signs, and submits transactions to a ledger that orders each
//! account's transactions by sequence number. Sequence conflicts between
//! concurrent writers are retried with randomized backoff, and timed out
//! submissions are only retried when they provably did not apply.

pub mod amount;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod tx;

pub use amount::{AmountError, AssetId, FixedAmount, Price};
pub use error::{FailureKind, SubmitError, SubmitterResult, ValidationError};
pub use ledger::{LedgerClient, MemoryLedger};
pub use tx::{KeyHandle, Network, SubmitReceipt, SubmitRequest, TransactionSubmitter};
