//! Local feasibility checks run before a payment is submitted

use crate::amount::{AssetId, FixedAmount};
use crate::error::PreflightError;
use crate::ledger::AccountState;

use std::cmp::Ordering;

/// Check that `sender` can pay `amount` to `receiver`.
///
/// The amount must carry its asset. The issuer of a credit asset can always
/// send it, and can always receive it back; native payments need no trust line.
pub fn check_payment(
    sender: &AccountState,
    receiver: &AccountState,
    amount: &FixedAmount,
) -> Result<(), PreflightError> {
    let asset = amount
        .asset()
        .ok_or_else(|| PreflightError::UntaggedAmount(amount.clone()))?;

    if !is_issuer(sender, asset) {
        check_sender_funds(sender, asset, amount)?;
    }
    if !asset.is_native() && !is_issuer(receiver, asset) {
        check_receiver_trust(receiver, asset, amount)?;
    }
    Ok(())
}

fn is_issuer(account: &AccountState, asset: &AssetId) -> bool {
    asset.issuer() == Some(account.account_id.as_str())
}

fn check_sender_funds(
    sender: &AccountState,
    asset: &AssetId,
    amount: &FixedAmount,
) -> Result<(), PreflightError> {
    let balance = sender
        .trust_line(asset)
        .ok_or_else(|| PreflightError::NoBalance {
            account: sender.account_id.clone(),
            asset: asset.describe(),
        })?;

    if balance.amount.cmp_quantity(amount) == Ordering::Less {
        return Err(PreflightError::InsufficientBalance {
            account: sender.account_id.clone(),
            asset: asset.describe(),
            amount: amount.amount_string(),
            balance: balance.amount.amount_string(),
        });
    }
    Ok(())
}

fn check_receiver_trust(
    receiver: &AccountState,
    asset: &AssetId,
    amount: &FixedAmount,
) -> Result<(), PreflightError> {
    let line = receiver
        .trust_line(asset)
        .ok_or_else(|| PreflightError::NoTrustLine {
            account: receiver.account_id.clone(),
            asset: asset.describe(),
        })?;

    let Some(limit) = &line.limit else {
        return Ok(());
    };

    // room left under the limit; a balance already above it leaves none
    let headroom = limit
        .sub(&line.amount)
        .unwrap_or_else(|_| FixedAmount::zero(Some(asset.clone())));

    if headroom.cmp_quantity(amount) == Ordering::Less {
        return Err(PreflightError::TrustLimitExceeded {
            account: receiver.account_id.clone(),
            limit: limit.amount_string(),
            amount: amount.amount_string(),
        });
    }
    Ok(())
}

/// Check a new account's starting balance against the ledger minimum
pub fn check_starting_balance(
    amount: &FixedAmount,
    minimum: &FixedAmount,
) -> Result<(), PreflightError> {
    if amount.cmp_quantity(minimum) == Ordering::Less {
        return Err(PreflightError::BelowMinimumBalance {
            amount: amount.amount_string(),
            minimum: minimum.amount_string(),
        });
    }
    Ok(())
}
