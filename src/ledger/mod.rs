//! Ledger collaborator boundary
//!
//! This module provides:
//! - The `LedgerClient` trait the submitter drives
//! - Account state and balance views returned by the ledger
//! - Submission verdicts and result codes
//! - An in-memory ledger for tests and simulations

pub mod memory;

pub use memory::{Fault, MemoryLedger};

use crate::amount::{AssetId, FixedAmount};
use crate::error::ClientError;
use crate::tx::SignedTransaction;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ledger account identifier (hex encoded master public key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held asset, with the trust line limit for issued assets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: AssetId,
    pub amount: FixedAmount,
    pub limit: Option<FixedAmount>,
}

impl Balance {
    pub fn native(amount: FixedAmount) -> Self {
        Self {
            amount: amount.with_asset(Some(AssetId::Native)),
            asset: AssetId::Native,
            limit: None,
        }
    }

    pub fn trust_line(asset: AssetId, amount: FixedAmount, limit: FixedAmount) -> Self {
        Self {
            amount: amount.with_asset(Some(asset.clone())),
            limit: Some(limit.with_asset(Some(asset.clone()))),
            asset,
        }
    }
}

/// Account snapshot as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub account_id: AccountId,
    pub sequence_number: u64,
    pub balances: Vec<Balance>,
}

impl AccountState {
    /// Balance record for an asset, if the account holds it
    pub fn trust_line(&self, asset: &AssetId) -> Option<&Balance> {
        self.balances.iter().find(|b| &b.asset == asset)
    }

    /// Held amount of an asset, zero when the account does not hold it
    pub fn balance_for(&self, asset: &AssetId) -> FixedAmount {
        self.trust_line(asset)
            .map(|b| b.amount.with_asset(Some(asset.clone())))
            .unwrap_or_else(|| FixedAmount::zero(Some(asset.clone())))
    }

    /// Multi line report of the account and its balances
    pub fn describe(&self) -> String {
        let mut out = format!(
            "account: {} sequence: {}\nbalances:",
            self.account_id, self.sequence_number
        );
        for balance in &self.balances {
            out.push_str(&format!(
                "\n  {} {}",
                balance.asset.describe(),
                balance.amount.amount_string()
            ));
            if let Some(limit) = &balance.limit {
                out.push_str(&format!(" (limit {})", limit.amount_string()));
            }
        }
        out
    }
}

/// Transaction-level result codes reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransactionResultCode {
    BadSeq,
    BadAuth,
    InsufficientFee,
    NoSourceAccount,
    TooLate,
    Failed,
    Other(String),
}

impl TransactionResultCode {
    pub fn is_bad_sequence(&self) -> bool {
        matches!(self, TransactionResultCode::BadSeq)
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionResultCode::BadSeq => "tx_bad_seq",
            TransactionResultCode::BadAuth => "tx_bad_auth",
            TransactionResultCode::InsufficientFee => "tx_insufficient_fee",
            TransactionResultCode::NoSourceAccount => "tx_no_source_account",
            TransactionResultCode::TooLate => "tx_too_late",
            TransactionResultCode::Failed => "tx_failed",
            TransactionResultCode::Other(code) => code,
        }
    }
}

impl fmt::Display for TransactionResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionResultCode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "tx_bad_seq" => TransactionResultCode::BadSeq,
            "tx_bad_auth" => TransactionResultCode::BadAuth,
            "tx_insufficient_fee" => TransactionResultCode::InsufficientFee,
            "tx_no_source_account" => TransactionResultCode::NoSourceAccount,
            "tx_too_late" => TransactionResultCode::TooLate,
            "tx_failed" => TransactionResultCode::Failed,
            other => TransactionResultCode::Other(other.to_string()),
        })
    }
}

/// Ledger acknowledgement of an applied transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub hash: String,
    pub ledger: u64,
    pub fee_charged: u64,
    pub operation_codes: Vec<String>,
}

impl TransactionResponse {
    /// One line summary for logs
    pub fn describe(&self) -> String {
        format!(
            "ledger {} tx {} fee:{} {}",
            self.ledger,
            self.hash,
            self.fee_charged,
            self.operation_codes.join(",")
        )
    }
}

/// Verdict of a single submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    Success(TransactionResponse),
    Rejected {
        transaction_result_code: TransactionResultCode,
        per_operation_codes: Vec<String>,
    },
    RateLimited,
    TimedOut,
    TransportError(String),
}

impl SubmitResult {
    /// Short label used for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            SubmitResult::Success(_) => "success",
            SubmitResult::Rejected { .. } => "rejected",
            SubmitResult::RateLimited => "rate_limited",
            SubmitResult::TimedOut => "timed_out",
            SubmitResult::TransportError(_) => "transport_error",
        }
    }
}

/// Query and submit API of the remote ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current state of an account, including its sequence number
    async fn get_account(&self, account_id: &AccountId) -> Result<AccountState, ClientError>;

    /// Submit a signed transaction and report the ledger's verdict
    async fn submit(&self, transaction: &SignedTransaction) -> SubmitResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bpt() -> AssetId {
        AssetId::credit("BPT", "issuer").unwrap()
    }

    #[test]
    fn test_result_code_round_trip() {
        for code in ["tx_bad_seq", "tx_bad_auth", "tx_failed", "tx_too_late", "tx_weird"] {
            let parsed: TransactionResultCode = code.parse().unwrap();
            assert_eq!(parsed.to_string(), code);
        }
        assert!("tx_bad_seq".parse::<TransactionResultCode>().unwrap().is_bad_sequence());
        assert!(!"tx_failed".parse::<TransactionResultCode>().unwrap().is_bad_sequence());
    }

    #[test]
    fn test_balance_for() {
        let state = AccountState {
            account_id: AccountId::new("a1"),
            sequence_number: 7,
            balances: vec![
                Balance::native(FixedAmount::parse("100").unwrap()),
                Balance::trust_line(
                    bpt(),
                    FixedAmount::parse("2.5").unwrap(),
                    FixedAmount::parse("1000").unwrap(),
                ),
            ],
        };

        assert_eq!(state.balance_for(&bpt()).to_string(), "2.5000000 BPT");
        assert_eq!(state.balance_for(&AssetId::Native).to_string(), "100.0000000 XLM");

        let other = AssetId::credit("EUR", "issuer").unwrap();
        assert!(state.balance_for(&other).is_zero());
        assert!(state.trust_line(&other).is_none());
        assert!(state.describe().contains("BPT (issuer) 2.5000000 (limit 1000.0000000)"));
    }
}
