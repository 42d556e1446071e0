//! Background pre-expansion worker.
//!
//! The worker drains the engine's deferred queue on the blocking thread
//! pool. It wakes when a write defers a value set or when the refresh
//! interval elapses, and stops between value sets once shutdown is
//! requested.

use std::time::Duration;

use terminology_engine::PreExpansionReport;
use tracing::{debug, error, info};

use crate::TerminologyServer;

/// Runs the pre-expansion loop until [`TerminologyServer::shutdown`] is
/// called. Returns the totals over every pass.
pub async fn run_pre_expansion_worker(
    server: TerminologyServer,
    refresh_interval: Duration,
) -> PreExpansionReport {
    let mut totals = PreExpansionReport::default();
    info!(refresh_secs = refresh_interval.as_secs(), "Pre-expansion worker started");

    while !server.is_shutting_down() {
        let engine = server.engine_handle();
        let shutdown = server.shutdown_flag();

        match tokio::task::spawn_blocking(move || engine.run_deferred_pre_expansions_until(&shutdown)).await {
            Ok(report) => {
                if !report.is_empty() {
                    debug!(
                        processed = report.processed,
                        failed = report.failed,
                        remaining = report.remaining,
                        "Pre-expansion pass finished"
                    );
                }
                totals.processed += report.processed;
                totals.failed += report.failed;
                totals.skipped += report.skipped;
                totals.remaining = report.remaining;
            }
            Err(e) => error!(error = %e, "Pre-expansion pass panicked"),
        }

        if server.is_shutting_down() {
            break;
        }

        tokio::select! {
            _ = server.wake_signal().notified() => {}
            _ = tokio::time::sleep(refresh_interval) => {}
        }
    }

    info!(
        processed = totals.processed,
        failed = totals.failed,
        "Pre-expansion worker stopped"
    );
    totals
}
