//! Ledger Submitter - contention simulation
//!
//! Runs several writers that pay out of one shared account against an
//! in-memory ledger, with throttling and timeouts injected, and reports how
//! each submission ended.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};

use ledger_submitter::config::Settings;
use ledger_submitter::ledger::{Fault, MemoryLedger};
use ledger_submitter::metrics;
use ledger_submitter::tx::{Operation, RandomizedBackoff};
use ledger_submitter::{
    AssetId, FixedAmount, KeyHandle, Network, SubmitError, SubmitRequest, TransactionSubmitter,
};

#[derive(Debug, Default)]
struct WriterReport {
    applied: usize,
    retries: u32,
    ambiguous: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Ledger Submitter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load().context("Failed to load settings")?;
    let simulation = settings.simulation.clone();
    info!(
        "Simulating {} writers with {} payments each",
        simulation.writers, simulation.payments_per_writer
    );

    let network = Network::new(settings.network.passphrase.clone());
    let ledger = Arc::new(MemoryLedger::new(network.clone()));

    let source = KeyHandle::random();
    let destination = KeyHandle::random();
    let source_id = ledger.create_account(&source, FixedAmount::new(1_000_000, 0, None)?);
    let destination_id = ledger.create_account(&destination, FixedAmount::new(1, 0, None)?);

    let total = (simulation.writers * simulation.payments_per_writer) as u64;
    inject_faults(&ledger, total, &settings);

    let backoff = match simulation.seed {
        Some(seed) => RandomizedBackoff::seeded(seed, &settings.submitter),
        None => RandomizedBackoff::from_config(&settings.submitter),
    };
    let submitter = Arc::new(
        TransactionSubmitter::new(ledger.clone(), network, settings.submitter.clone())
            .with_backoff(Arc::new(backoff)),
    );

    let amount = FixedAmount::parse_with_asset("1.5", Some(AssetId::Native))?;
    let writers = (0..simulation.writers).map(|writer| {
        let submitter = submitter.clone();
        let source = source.clone();
        let destination_id = destination_id.clone();
        let amount = amount.clone();
        let payments = simulation.payments_per_writer;

        tokio::spawn(async move {
            let mut report = WriterReport::default();
            for payment in 0..payments {
                let request = SubmitRequest::new(&source)
                    .operation(Operation::Payment {
                        destination: destination_id.clone(),
                        amount: amount.clone(),
                    })
                    .memo(format!("writer {} payment {}", writer, payment));

                match submitter.submit(request).await {
                    Ok(receipt) => {
                        report.applied += 1;
                        report.retries += receipt.tries_so_far;
                    }
                    Err(e @ SubmitError::Ambiguous { .. }) => {
                        warn!("Writer {}: {}", writer, e);
                        report.ambiguous += 1;
                    }
                    Err(e) => {
                        error!("Writer {}: {}", writer, e);
                        report.failed += 1;
                    }
                }
            }
            (writer, report)
        })
    });

    for joined in join_all(writers).await {
        let (writer, report) = joined.context("Writer task panicked")?;
        info!(
            "Writer {}: {} applied, {} retries, {} ambiguous, {} failed",
            writer, report.applied, report.retries, report.ambiguous, report.failed
        );
    }

    info!(
        "Final sequence {} after {} submissions, {} transactions applied",
        ledger.sequence_of(&source_id).unwrap_or_default(),
        ledger.submissions(),
        ledger.applied()
    );
    if let Some(balance) = ledger.balance_of(&destination_id, &AssetId::Native) {
        info!("Destination balance {}", balance);
    }

    println!("{}", metrics::render());

    info!("Ledger Submitter stopped");
    Ok(())
}

/// Queue throttling and timeout faults spread over the expected submissions
fn inject_faults(ledger: &MemoryLedger, total: u64, settings: &Settings) {
    let simulation = &settings.simulation;
    for n in 1..=total {
        if simulation.fault_rate_limit_every > 0 && n % simulation.fault_rate_limit_every == 0 {
            ledger.inject(Fault::RateLimited);
        } else if simulation.fault_timeout_every > 0 && n % simulation.fault_timeout_every == 0 {
            // alternate between timeouts that are safe to retry and ones that are not
            if (n / simulation.fault_timeout_every) % 2 == 0 {
                ledger.inject(Fault::TimedOutAfterApply);
            } else {
                ledger.inject(Fault::TimedOut);
            }
        } else {
            ledger.inject(Fault::Stall(std::time::Duration::ZERO));
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ledger_submitter=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}
