//! In-process ledger enforcing sequence numbers, signatures, and balances
//!
//! Used by tests and by the contention simulation. Transactions are applied one
//! at a time; queries and submissions from many tasks may interleave freely.

use super::{
    AccountId, AccountState, Balance, LedgerClient, SubmitResult, TransactionResponse,
    TransactionResultCode,
};
use crate::amount::{AssetId, FixedAmount, FRACTION_UNITS_PER_UNIT};
use crate::error::ClientError;
use crate::tx::{
    check_starting_balance, parse_public_key, KeyHandle, Network, Operation, SignedTransaction,
};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use ed25519_dalek::VerifyingKey;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fee per operation the ledger requires
pub const DEFAULT_BASE_FEE: u32 = 100;

/// Smallest native balance a new account may start with, in whole units
pub const MINIMUM_STARTING_UNITS: u64 = 1;

/// Scripted outcome for an upcoming submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Throttle without looking at the transaction
    RateLimited,
    /// Report a timeout without applying
    TimedOut,
    /// Apply normally, then report a timeout
    TimedOutAfterApply,
    /// Fail at the transport level without applying
    Transport(String),
    /// Wait before handling the submission normally
    Stall(Duration),
}

#[derive(Debug, Clone)]
struct AccountRecord {
    master_key: VerifyingKey,
    sequence: u64,
    balances: Vec<Balance>,
}

impl AccountRecord {
    fn state(&self, account_id: &AccountId) -> AccountState {
        AccountState {
            account_id: account_id.clone(),
            sequence_number: self.sequence,
            balances: self.balances.clone(),
        }
    }

    fn balance_mut(&mut self, asset: &AssetId) -> Option<&mut Balance> {
        self.balances.iter_mut().find(|b| &b.asset == asset)
    }
}

/// Per-operation failure code
type OpResult = Result<(), &'static str>;

/// Ledger held entirely in memory
pub struct MemoryLedger {
    network: Network,
    base_fee: u32,
    accounts: DashMap<AccountId, AccountRecord>,
    history: DashMap<String, TransactionResponse>,
    faults: Mutex<VecDeque<Fault>>,
    /// Serializes application of transactions
    apply_lock: Mutex<()>,
    ledger_seq: AtomicU64,
    submissions: AtomicU64,
}

impl MemoryLedger {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            base_fee: DEFAULT_BASE_FEE,
            accounts: DashMap::new(),
            history: DashMap::new(),
            faults: Mutex::new(VecDeque::new()),
            apply_lock: Mutex::new(()),
            ledger_seq: AtomicU64::new(1),
            submissions: AtomicU64::new(0),
        }
    }

    pub fn with_base_fee(mut self, base_fee: u32) -> Self {
        self.base_fee = base_fee;
        self
    }

    /// Create (or replace) an account holding `native` with sequence zero
    pub fn create_account(&self, key: &KeyHandle, native: FixedAmount) -> AccountId {
        let account_id = key.account_id();
        self.accounts.insert(
            account_id.clone(),
            AccountRecord {
                master_key: *key.verifying_key(),
                sequence: 0,
                balances: vec![Balance::native(native)],
            },
        );
        debug!("Created account {}", account_id);
        account_id
    }

    /// Insert or replace a balance record
    pub fn set_balance(&self, account_id: &AccountId, balance: Balance) -> Result<(), ClientError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ClientError::NotFound(account_id.clone()))?;

        match record.balance_mut(&balance.asset) {
            Some(existing) => *existing = balance,
            None => record.balances.push(balance),
        }
        Ok(())
    }

    /// Queue a fault for the next submission
    pub fn inject(&self, fault: Fault) {
        self.lock_faults().push_back(fault);
    }

    /// Simulate a writer outside this process consuming sequence numbers
    pub fn advance_sequence(&self, account_id: &AccountId, by: u64) -> Result<u64, ClientError> {
        let mut record = self
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| ClientError::NotFound(account_id.clone()))?;
        record.sequence = record.sequence.saturating_add(by);
        Ok(record.sequence)
    }

    pub fn sequence_of(&self, account_id: &AccountId) -> Option<u64> {
        self.accounts.get(account_id).map(|r| r.sequence)
    }

    pub fn balance_of(&self, account_id: &AccountId, asset: &AssetId) -> Option<FixedAmount> {
        self.accounts
            .get(account_id)
            .map(|r| r.state(account_id).balance_for(asset))
    }

    /// Number of `submit` calls received, faulted ones included
    pub fn submissions(&self) -> u64 {
        self.submissions.load(AtomicOrdering::SeqCst)
    }

    /// Number of transactions applied successfully
    pub fn applied(&self) -> usize {
        self.history.len()
    }

    /// Response of an applied transaction
    pub fn transaction(&self, hash: &str) -> Option<TransactionResponse> {
        self.history.get(hash).map(|r| r.clone())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, VecDeque<Fault>> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, tx: &SignedTransaction) -> SubmitResult {
        let _guard = self
            .apply_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let body = &tx.body;
        let source = match self.accounts.get(&body.source_account) {
            Some(record) => record.clone(),
            None => return rejected(TransactionResultCode::NoSourceAccount, vec![]),
        };

        if body.sequence_number != source.sequence.saturating_add(1) {
            return rejected(TransactionResultCode::BadSeq, vec![]);
        }
        if !tx.is_signed_by(&self.network, &source.master_key) {
            return rejected(TransactionResultCode::BadAuth, vec![]);
        }
        let minimum_fee = self.base_fee as u64 * body.operations.len() as u64;
        if body.fee < minimum_fee {
            return rejected(TransactionResultCode::InsufficientFee, vec![]);
        }
        if body.valid_until < Utc::now() {
            return rejected(TransactionResultCode::TooLate, vec![]);
        }

        // operations run against a staged copy and commit all or nothing
        let mut staged: HashMap<AccountId, AccountRecord> = HashMap::new();
        staged.insert(body.source_account.clone(), source);

        let mut codes = Vec::with_capacity(body.operations.len());
        let mut failed = false;
        for operation in &body.operations {
            match self.apply_operation(&mut staged, &body.source_account, operation) {
                Ok(()) => codes.push("op_success".to_string()),
                Err(code) => {
                    failed = true;
                    codes.push(code.to_string());
                }
            }
        }

        // a failed transaction still consumes its sequence number
        if failed {
            if let Some(mut record) = self.accounts.get_mut(&body.source_account) {
                record.sequence = body.sequence_number;
            }
            return rejected(TransactionResultCode::Failed, codes);
        }

        for (account_id, mut record) in staged {
            if account_id == body.source_account {
                record.sequence = body.sequence_number;
            }
            self.accounts.insert(account_id, record);
        }

        let response = TransactionResponse {
            hash: tx.hash.clone(),
            ledger: self.ledger_seq.fetch_add(1, AtomicOrdering::SeqCst),
            fee_charged: body.fee,
            operation_codes: codes,
        };
        self.history.insert(tx.hash.clone(), response.clone());
        info!("Applied {}", response.describe());

        SubmitResult::Success(response)
    }

    fn apply_operation(
        &self,
        staged: &mut HashMap<AccountId, AccountRecord>,
        source: &AccountId,
        operation: &Operation,
    ) -> OpResult {
        match operation {
            Operation::Payment {
                destination,
                amount,
            } => {
                let asset = amount.asset().cloned().unwrap_or(AssetId::Native);
                self.stage(staged, destination).ok_or("op_no_destination")?;
                debit(staged, source, &asset, amount)?;
                credit(staged, destination, &asset, amount)
            }
            Operation::CreateAccount {
                destination,
                starting_balance,
            } => {
                if self.stage(staged, destination).is_some() {
                    return Err("op_already_exists");
                }
                let minimum = FixedAmount::from_fraction_units(
                    MINIMUM_STARTING_UNITS * FRACTION_UNITS_PER_UNIT,
                    Some(AssetId::Native),
                );
                check_starting_balance(starting_balance, &minimum).map_err(|_| "op_low_reserve")?;
                let master_key = parse_public_key(destination).map_err(|_| "op_malformed")?;
                debit(staged, source, &AssetId::Native, starting_balance)?;
                staged.insert(
                    destination.clone(),
                    AccountRecord {
                        master_key,
                        sequence: 0,
                        balances: vec![Balance::native(starting_balance.clone())],
                    },
                );
                Ok(())
            }
            Operation::ChangeTrust { asset, limit } => {
                if asset.is_native() || asset.issuer() == Some(source.as_str()) {
                    return Err("op_malformed");
                }
                let record = staged.get_mut(source).ok_or("op_no_source")?;
                match record.balance_mut(asset) {
                    Some(line) => {
                        if line.amount.cmp_quantity(limit) == Ordering::Greater {
                            return Err("op_invalid_limit");
                        }
                        line.limit = Some(limit.with_asset(Some(asset.clone())));
                    }
                    None => record.balances.push(Balance::trust_line(
                        asset.clone(),
                        FixedAmount::zero(None),
                        limit.clone(),
                    )),
                }
                Ok(())
            }
            Operation::ManageOffer { .. } => Err("op_not_supported"),
        }
    }

    /// Copy an account into the staging area; `None` if it does not exist
    fn stage(
        &self,
        staged: &mut HashMap<AccountId, AccountRecord>,
        account_id: &AccountId,
    ) -> Option<()> {
        if !staged.contains_key(account_id) {
            let record = self.accounts.get(account_id)?.clone();
            staged.insert(account_id.clone(), record);
        }
        Some(())
    }
}

fn rejected(code: TransactionResultCode, per_operation_codes: Vec<String>) -> SubmitResult {
    debug!("Rejecting transaction: {}", code);
    SubmitResult::Rejected {
        transaction_result_code: code,
        per_operation_codes,
    }
}

fn debit(
    staged: &mut HashMap<AccountId, AccountRecord>,
    account_id: &AccountId,
    asset: &AssetId,
    amount: &FixedAmount,
) -> OpResult {
    // issuers mint their own asset
    if asset.issuer() == Some(account_id.as_str()) {
        return Ok(());
    }
    let record = staged.get_mut(account_id).ok_or("op_no_source")?;
    let line = record.balance_mut(asset).ok_or("op_src_no_trust")?;
    line.amount = line.amount.sub(amount).map_err(|_| "op_underfunded")?;
    line.amount = line.amount.with_asset(Some(asset.clone()));
    Ok(())
}

fn credit(
    staged: &mut HashMap<AccountId, AccountRecord>,
    account_id: &AccountId,
    asset: &AssetId,
    amount: &FixedAmount,
) -> OpResult {
    // payments back to the issuer are burned
    if asset.issuer() == Some(account_id.as_str()) {
        return Ok(());
    }
    let record = staged.get_mut(account_id).ok_or("op_no_destination")?;
    if asset.is_native() && record.balance_mut(asset).is_none() {
        record.balances.push(Balance::native(FixedAmount::zero(None)));
    }
    let line = record.balance_mut(asset).ok_or("op_no_trust")?;

    let updated = line.amount.add(amount).map_err(|_| "op_line_full")?;
    if let Some(limit) = &line.limit {
        if updated.cmp_quantity(limit) == Ordering::Greater {
            return Err("op_line_full");
        }
    }
    line.amount = updated.with_asset(Some(asset.clone()));
    Ok(())
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_account(&self, account_id: &AccountId) -> Result<AccountState, ClientError> {
        tokio::task::yield_now().await;
        self.accounts
            .get(account_id)
            .map(|record| record.state(account_id))
            .ok_or_else(|| ClientError::NotFound(account_id.clone()))
    }

    async fn submit(&self, transaction: &SignedTransaction) -> SubmitResult {
        self.submissions.fetch_add(1, AtomicOrdering::SeqCst);
        tokio::task::yield_now().await;

        let fault = self.lock_faults().pop_front();
        match fault {
            Some(Fault::RateLimited) => {
                warn!("Throttling {}", transaction.hash);
                SubmitResult::RateLimited
            }
            Some(Fault::TimedOut) => {
                warn!("Dropping {} without applying it", transaction.hash);
                SubmitResult::TimedOut
            }
            Some(Fault::TimedOutAfterApply) => {
                let result = self.apply(transaction);
                warn!(
                    "Reporting timeout for {} after {}",
                    transaction.hash,
                    result.label()
                );
                SubmitResult::TimedOut
            }
            Some(Fault::Transport(message)) => SubmitResult::TransportError(message),
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                self.apply(transaction)
            }
            None => self.apply(transaction),
        }
    }
}
