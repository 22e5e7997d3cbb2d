//! Sequence number handling for reliable transaction submission
//!
//! Handles:
//! - Deriving the next sequence number from the account's current one
//! - Deciding whether a timed out submission could have been applied

use crate::error::{SubmitError, ValidationError};
use crate::ledger::{AccountId, LedgerClient};

use tracing::debug;

/// Sequence number a transaction must carry given the account's current one
pub fn next_sequence(account_id: &AccountId, current: u64) -> Result<u64, ValidationError> {
    current
        .checked_add(1)
        .ok_or_else(|| ValidationError::SequenceOverflow(account_id.clone()))
}

/// What the account's sequence number says about a timed out submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    /// Nothing was applied; retrying with the same sequence number is safe
    Unchanged,
    /// Something consumed the sequence number; it may have been our transaction
    Changed { from: u64, to: u64 },
}

impl SequenceVerdict {
    pub fn label(&self) -> &'static str {
        match self {
            SequenceVerdict::Unchanged => "unchanged",
            SequenceVerdict::Changed { .. } => "changed",
        }
    }
}

/// Compare the sequence observed before a submission with the one after it
pub fn reconcile(before: u64, after: u64) -> SequenceVerdict {
    if before == after {
        SequenceVerdict::Unchanged
    } else {
        SequenceVerdict::Changed {
            from: before,
            to: after,
        }
    }
}

/// Fetch the account's current sequence number
pub async fn fetch_sequence<C>(
    client: &C,
    account_id: &AccountId,
    tries: u32,
) -> Result<u64, SubmitError>
where
    C: LedgerClient + ?Sized,
{
    let state = client
        .get_account(account_id)
        .await
        .map_err(|e| super::submitter::client_failure(e, tries))?;

    debug!(
        "Fetched sequence {} for account {}",
        state.sequence_number, account_id
    );
    Ok(state.sequence_number)
}
