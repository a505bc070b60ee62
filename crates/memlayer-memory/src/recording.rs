// SPDX-FileCopyrightText: 2026 memlayer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; nothing is collected unless the host process
//! installs a recorder.

use memlayer_core::MemoryAction;
use metrics::describe_counter;

/// Register all memlayer metric descriptions.
///
/// Call once at startup after a recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "memlayer_reconcile_actions_total",
        "Reconciliation mutations applied, by action"
    );
    describe_counter!(
        "memlayer_reconcile_failures_total",
        "Facts skipped because their decision or mutation failed"
    );
    describe_counter!(
        "memlayer_embedding_retries_total",
        "Embedding calls retried after a timeout"
    );
}

pub(crate) fn record_action(action: MemoryAction) {
    metrics::counter!("memlayer_reconcile_actions_total", "action" => action.as_str()).increment(1);
}

pub(crate) fn record_failure() {
    metrics::counter!("memlayer_reconcile_failures_total").increment(1);
}

pub(crate) fn record_embedding_retry() {
    metrics::counter!("memlayer_embedding_retries_total").increment(1);
}
