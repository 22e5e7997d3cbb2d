//! Transaction submitter with sequence conflict retry and timeout reconciliation
//!
//! A logical submission fetches the source account's sequence number, builds
//! and signs a transaction for the next one, and submits it. Concurrent writers
//! to the same account race for sequence numbers; the ledger arbitrates, and a
//! loser sees a bad sequence rejection and retries after a randomized backoff.
//!
//! A timed out submission is only retried when the account's sequence number
//! shows it was not applied.

use super::backoff::{BackoffPolicy, RandomizedBackoff};
use super::keys::{KeyHandle, Network};
use super::preflight;
use super::sequence::{fetch_sequence, next_sequence, reconcile, SequenceVerdict};
use super::transaction::{
    compute_fee, expiry_after, Memo, Operation, SignedTransaction, TransactionBody,
};
use crate::amount::FixedAmount;
use crate::config::SubmitterConfig;
use crate::error::{ClientError, PreflightError, SubmitError, SubmitterResult, ValidationError};
use crate::ledger::{AccountId, LedgerClient, SubmitResult, TransactionResponse};
use crate::metrics;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Caller intent for one logical submission.
///
/// Unset fields fall back to the submitter's `SubmitterConfig`.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    account_id: AccountId,
    signers: Vec<KeyHandle>,
    operations: Vec<Operation>,
    memo: Option<String>,
    base_fee: Option<u32>,
    timeout: Option<Duration>,
    max_tries: Option<u32>,
    sequence_override: Option<u64>,
}

impl SubmitRequest {
    /// Request sourced from and signed by `source`
    pub fn new(source: &KeyHandle) -> Self {
        Self {
            signers: vec![source.clone()],
            ..Self::for_account(source.account_id())
        }
    }

    /// Request for an account with no signers yet
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            signers: Vec::new(),
            operations: Vec::new(),
            memo: None,
            base_fee: None,
            timeout: None,
            max_tries: None,
            sequence_override: None,
        }
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Replace the signer set
    pub fn with_signers(mut self, signers: Vec<KeyHandle>) -> Self {
        self.signers = signers;
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn base_fee(mut self, base_fee: u32) -> Self {
        self.base_fee = Some(base_fee);
        self
    }

    /// Deadline for each individual submission
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Build the first attempt on this sequence number instead of fetching it.
    ///
    /// Timeout reconciliation compares against this value, so a stale override
    /// turns a timed out first attempt into an ambiguous failure even when
    /// nothing was applied.
    pub fn sequence_override(mut self, sequence: u64) -> Self {
        self.sequence_override = Some(sequence);
        self
    }
}

/// State of one logical submission, replaced by `retry` on every retry
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub account_id: AccountId,
    pub signers: Vec<KeyHandle>,
    pub operations: Vec<Operation>,
    pub memo: Option<Memo>,
    pub base_fee: u32,
    pub timeout: Duration,
    pub max_tries: u32,
    pub tries_so_far: u32,
    pub throttled_so_far: u32,
    pub sequence_override: Option<u64>,
}

impl TransactionAttempt {
    /// Validate a request and resolve its defaults
    pub fn from_request(
        request: SubmitRequest,
        defaults: &SubmitterConfig,
    ) -> Result<Self, ValidationError> {
        if request.signers.is_empty() {
            return Err(ValidationError::NoSigners);
        }
        if request.operations.is_empty() {
            return Err(ValidationError::NoOperations);
        }
        for signer in &request.signers {
            signer.validate_can_sign()?;
        }

        let memo = request.memo.map(Memo::text).transpose()?;
        let base_fee = request.base_fee.unwrap_or(defaults.base_fee);
        compute_fee(base_fee, request.operations.len())?;

        let timeout = request.timeout.unwrap_or_else(|| defaults.timeout());
        if timeout.is_zero() {
            return Err(ValidationError::ZeroTimeout);
        }
        expiry_after(timeout)?;

        Ok(Self {
            account_id: request.account_id,
            signers: request.signers,
            operations: request.operations,
            memo,
            base_fee,
            timeout,
            max_tries: request.max_tries.unwrap_or(defaults.max_tries),
            tries_so_far: 0,
            throttled_so_far: 0,
            sequence_override: request.sequence_override,
        })
    }

    pub fn can_retry(&self) -> bool {
        self.tries_so_far < self.max_tries
    }

    /// Next attempt; `sequence_override` skips the fetch
    pub fn retry(self, sequence_override: Option<u64>) -> Self {
        Self {
            tries_so_far: self.tries_so_far + 1,
            sequence_override,
            ..self
        }
    }

    fn build(
        &self,
        network: &Network,
        current_sequence: u64,
    ) -> Result<SignedTransaction, ValidationError> {
        let sequence = next_sequence(&self.account_id, current_sequence)?;
        TransactionBody::new(
            self.account_id.clone(),
            sequence,
            self.base_fee,
            self.timeout,
            self.memo.clone(),
            self.operations.clone(),
        )?
        .sign(network, &self.signers)
    }
}

/// Successful outcome of a logical submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub response: TransactionResponse,
    /// Retries made before the success
    pub tries_so_far: u32,
    /// Sequence number the applied transaction carried
    pub sequence_number: u64,
    /// Calls made to `LedgerClient::submit`, throttled ones included
    pub submissions: u32,
}

/// Drives transactions to a terminal ledger outcome
pub struct TransactionSubmitter<C: LedgerClient> {
    /// Ledger collaborator
    client: Arc<C>,
    /// Network every signature is scoped to
    network: Network,
    /// Retry delays
    backoff: Arc<dyn BackoffPolicy>,
    /// Per-call defaults
    config: SubmitterConfig,
}

impl<C: LedgerClient> TransactionSubmitter<C> {
    /// Create a submitter with randomized backoff
    pub fn new(client: Arc<C>, network: Network, config: SubmitterConfig) -> Self {
        Self {
            backoff: Arc::new(RandomizedBackoff::from_config(&config)),
            client,
            network,
            config,
        }
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    /// Submit a transaction, retrying sequence conflicts, throttling, and
    /// timeouts that provably did not apply
    pub async fn submit(&self, request: SubmitRequest) -> SubmitterResult<SubmitReceipt> {
        let attempt = TransactionAttempt::from_request(request, &self.config)?;
        let result = self.run(attempt).await;

        match &result {
            Ok(receipt) => metrics::record_success(receipt.tries_so_far),
            Err(e) => metrics::record_outcome(outcome_label(e)),
        }
        result
    }

    async fn run(&self, mut attempt: TransactionAttempt) -> SubmitterResult<SubmitReceipt> {
        let mut submissions = 0u32;

        loop {
            let current = match attempt.sequence_override {
                Some(sequence) => sequence,
                None => {
                    fetch_sequence(self.client.as_ref(), &attempt.account_id, attempt.tries_so_far)
                        .await?
                }
            };

            let signed = attempt.build(&self.network, current)?;
            debug!(
                "Submitting {} from {} with sequence {} (try {})",
                signed.hash,
                attempt.account_id,
                signed.sequence_number(),
                attempt.tries_so_far
            );

            match self.submit_signed(&mut attempt, &signed, &mut submissions).await {
                SubmitResult::Success(response) => {
                    let log = format!(
                        "Transaction {} applied after {} retries: {}",
                        signed.hash,
                        attempt.tries_so_far,
                        response.describe()
                    );
                    if attempt.tries_so_far > 0 {
                        info!("{}", log);
                    } else {
                        debug!("{}", log);
                    }

                    return Ok(SubmitReceipt {
                        response,
                        tries_so_far: attempt.tries_so_far,
                        sequence_number: signed.sequence_number(),
                        submissions,
                    });
                }
                SubmitResult::Rejected {
                    transaction_result_code,
                    per_operation_codes,
                } if transaction_result_code.is_bad_sequence() => {
                    metrics::record_conflict();
                    if !attempt.can_retry() {
                        error!(
                            "Sequence conflict on {} persisted after {} retries",
                            attempt.account_id, attempt.tries_so_far
                        );
                        return Err(SubmitError::ConflictExhausted {
                            tries: attempt.tries_so_far,
                            result_code: transaction_result_code,
                            operation_codes: per_operation_codes,
                        });
                    }

                    let delay = self.backoff.conflict_delay(attempt.tries_so_far);
                    warn!(
                        "Bad sequence {} on {}, retrying in {:?} ({}/{})",
                        signed.sequence_number(),
                        attempt.account_id,
                        delay,
                        attempt.tries_so_far + 1,
                        attempt.max_tries
                    );
                    sleep(delay).await;
                    attempt = attempt.retry(None);
                }
                SubmitResult::Rejected {
                    transaction_result_code,
                    per_operation_codes,
                } => {
                    error!(
                        "Transaction {} rejected: {} [{}]",
                        signed.hash,
                        transaction_result_code,
                        per_operation_codes.join(", ")
                    );
                    return Err(SubmitError::Rejected {
                        tries: attempt.tries_so_far,
                        result_code: transaction_result_code,
                        operation_codes: per_operation_codes,
                    });
                }
                SubmitResult::TimedOut => {
                    self.reconcile_timeout(&attempt, current).await?;
                    attempt = attempt.retry(Some(current));
                }
                SubmitResult::RateLimited => {
                    return Err(SubmitError::RateLimited {
                        tries: attempt.tries_so_far,
                        throttled: attempt.throttled_so_far,
                    });
                }
                SubmitResult::TransportError(message) => {
                    error!("Transport error submitting {}: {}", signed.hash, message);
                    return Err(SubmitError::Transport {
                        tries: attempt.tries_so_far,
                        message,
                    });
                }
            }
        }
    }

    /// Submit one signed transaction under the attempt's deadline.
    ///
    /// Throttled submissions are resent unchanged after a cooldown; throttling
    /// has its own budget of `max_tries` and never consumes a retry.
    async fn submit_signed(
        &self,
        attempt: &mut TransactionAttempt,
        signed: &SignedTransaction,
        submissions: &mut u32,
    ) -> SubmitResult {
        loop {
            *submissions += 1;
            let result = match timeout(attempt.timeout, self.client.submit(signed)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Submission of {} exceeded {:?} deadline",
                        signed.hash, attempt.timeout
                    );
                    SubmitResult::TimedOut
                }
            };

            if result != SubmitResult::RateLimited {
                return result;
            }

            metrics::record_rate_limited();
            if attempt.throttled_so_far >= attempt.max_tries {
                error!(
                    "Still rate limited after {} cooldowns, giving up on {}",
                    attempt.throttled_so_far, signed.hash
                );
                return result;
            }

            attempt.throttled_so_far += 1;
            let cooldown = self.backoff.rate_limit_cooldown();
            warn!(
                "Too many requests, retrying {} in {:?} ({}/{})",
                signed.hash, cooldown, attempt.throttled_so_far, attempt.max_tries
            );
            sleep(cooldown).await;
        }
    }

    /// Decide whether a timed out submission may be retried.
    ///
    /// Returns `Ok` only when the sequence number is unchanged and the retry
    /// budget allows another attempt on the same sequence.
    async fn reconcile_timeout(
        &self,
        attempt: &TransactionAttempt,
        sequence_before: u64,
    ) -> SubmitterResult<()> {
        let settle = self.backoff.timeout_settle_delay();
        warn!(
            "Submission from {} timed out, checking sequence in {:?}",
            attempt.account_id, settle
        );
        sleep(settle).await;

        let sequence_after = match self.client.get_account(&attempt.account_id).await {
            Ok(state) => state.sequence_number,
            Err(e) => {
                metrics::record_timeout("unknown");
                error!(
                    "Could not re-read {} after timeout ({}); skipping retry to avoid a duplicate transaction",
                    attempt.account_id, e
                );
                return Err(SubmitError::Ambiguous {
                    tries: attempt.tries_so_far,
                    account_id: attempt.account_id.clone(),
                    sequence_before,
                    sequence_after: None,
                });
            }
        };

        let verdict = reconcile(sequence_before, sequence_after);
        metrics::record_timeout(verdict.label());

        match verdict {
            SequenceVerdict::Changed { from, to } => {
                error!(
                    "Sequence of {} changed from {} to {} after timeout; skipping retry to avoid a duplicate transaction",
                    attempt.account_id, from, to
                );
                Err(SubmitError::Ambiguous {
                    tries: attempt.tries_so_far,
                    account_id: attempt.account_id.clone(),
                    sequence_before: from,
                    sequence_after: Some(to),
                })
            }
            SequenceVerdict::Unchanged if !attempt.can_retry() => Err(SubmitError::TimedOut {
                tries: attempt.tries_so_far,
                sequence: sequence_before,
            }),
            SequenceVerdict::Unchanged => {
                info!(
                    "Sequence of {} still {} after timeout, retrying on the same sequence",
                    attempt.account_id, sequence_before
                );
                Ok(())
            }
        }
    }

    /// Check locally that `source` can pay `amount` to `destination`
    pub async fn check_payment(
        &self,
        source: &AccountId,
        destination: &AccountId,
        amount: &FixedAmount,
    ) -> Result<(), PreflightError> {
        let sender = self.client.get_account(source).await.map_err(|e| match e {
            ClientError::NotFound(id) => PreflightError::SenderMissing(id),
            other => PreflightError::Client(other),
        })?;
        let receiver = self
            .client
            .get_account(destination)
            .await
            .map_err(|e| match e {
                ClientError::NotFound(id) => PreflightError::ReceiverMissing(id),
                other => PreflightError::Client(other),
            })?;

        preflight::check_payment(&sender, &receiver, amount)
    }

    /// Check and submit a single payment from `source`
    pub async fn pay(
        &self,
        source: &KeyHandle,
        destination: &AccountId,
        amount: FixedAmount,
        memo: Option<&str>,
    ) -> SubmitterResult<SubmitReceipt> {
        self.check_payment(&source.account_id(), destination, &amount)
            .await?;

        let mut request = SubmitRequest::new(source).operation(Operation::Payment {
            destination: destination.clone(),
            amount,
        });
        if let Some(memo) = memo {
            request = request.memo(memo);
        }
        self.submit(request).await
    }
}

/// Map a failed account query during submission
pub(crate) fn client_failure(error: ClientError, tries: u32) -> SubmitError {
    match error {
        ClientError::NotFound(account_id) => SubmitError::AccountNotFound { account_id },
        ClientError::Transport(message) => SubmitError::Transport { tries, message },
    }
}

fn outcome_label(error: &SubmitError) -> &'static str {
    match error {
        SubmitError::Validation(_) | SubmitError::Preflight(_) => "validation",
        SubmitError::AccountNotFound { .. } => "account_not_found",
        SubmitError::Rejected { .. } => "rejected",
        SubmitError::ConflictExhausted { .. } => "conflict_exhausted",
        SubmitError::RateLimited { .. } => "rate_limited",
        SubmitError::TimedOut { .. } => "timed_out",
        SubmitError::Ambiguous { .. } => "ambiguous",
        SubmitError::Transport { .. } => "transport",
    }
}
