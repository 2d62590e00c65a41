//! Metrics collector (C9, §4.7/§3.5): the per-tick timeseries and the
//! final run summary, including the rates and the audit-completeness
//! invariant check.

use std::collections::BTreeMap;

use stigmergy_types::{FileStatus, Role, RunSummary, StopReason, TickRow};

use crate::store::PheromoneStore;

/// Accumulates per-tick rows and produces the final summary once the run
/// stops.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    rows: Vec<TickRow>,
    cumulative_tokens: u64,
    cumulative_cost_usd: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tick's outcome. `acted` must report every role exactly
    /// once, even if it didn't act (§3.5: "per-role acted bool").
    pub fn record_tick(
        &mut self,
        tick: u64,
        acted: BTreeMap<Role, bool>,
        tokens_spent: u64,
        cost_spent: f64,
        store: &PheromoneStore,
    ) {
        self.cumulative_tokens += tokens_spent;
        self.cumulative_cost_usd += cost_spent;

        let mut status_counts: BTreeMap<FileStatus, u32> = BTreeMap::new();
        for (_, entry) in store.all_status() {
            *status_counts.entry(entry.status).or_insert(0) += 1;
        }

        self.rows.push(TickRow {
            tick,
            acted,
            cumulative_tokens: self.cumulative_tokens,
            cumulative_cost_usd: self.cumulative_cost_usd,
            status_counts,
        });
    }

    pub fn rows(&self) -> &[TickRow] {
        &self.rows
    }

    pub fn cumulative_tokens(&self) -> u64 {
        self.cumulative_tokens
    }

    pub fn cumulative_cost_usd(&self) -> f64 {
        self.cumulative_cost_usd
    }

    /// Count of ticks in which every role was idle — used for the
    /// `idle_cycles` stop condition and the summary's `starvation_count`
    /// (§4.6 step 5, §4.7).
    pub fn idle_tick_count(&self) -> u64 {
        self.rows
            .iter()
            .filter(|row| row.acted.values().all(|acted| !*acted))
            .count() as u64
    }

    /// Consecutive idle ticks ending at the most recent tick, used by the
    /// orchestrator to decide when `max_idle_cycles` has been reached.
    pub fn trailing_idle_streak(&self) -> u64 {
        self.rows
            .iter()
            .rev()
            .take_while(|row| row.acted.values().all(|acted| !*acted))
            .count() as u64
    }

    /// Build the final run summary. `stop_reason` is supplied by the
    /// orchestrator, which is the only place that knows why the loop
    /// actually ended.
    pub fn summarize(&self, store: &PheromoneStore, stop_reason: StopReason) -> RunSummary {
        let files_total = store.file_ids().count() as u64;
        let mut validated = 0u64;
        let mut failed = 0u64;
        let mut needs_review = 0u64;
        let mut skipped = 0u64;
        let mut retried_at_least_once = 0u64;
        let mut resolved_after_retry = 0u64;

        for (_, entry) in store.all_status() {
            match entry.status {
                FileStatus::Validated => validated += 1,
                FileStatus::Failed => failed += 1,
                FileStatus::NeedsReview => needs_review += 1,
                FileStatus::Skipped => skipped += 1,
                _ => {}
            }
            if entry.retry_count > 0 {
                retried_at_least_once += 1;
                if entry.status == FileStatus::Validated {
                    resolved_after_retry += 1;
                }
            }
        }

        let success_rate = ratio(validated, files_total);
        let rollback_rate = ratio(skipped, files_total);
        let human_escalation_rate = ratio(needs_review, files_total);
        let retry_resolution_rate = ratio(resolved_after_retry, retried_at_least_once);

        RunSummary {
            files_total,
            files_validated: validated,
            files_failed: failed,
            files_needs_review: needs_review,
            files_skipped: skipped,
            success_rate,
            rollback_rate,
            human_escalation_rate,
            retry_resolution_rate,
            starvation_count: self.idle_tick_count(),
            audit_completeness: store.audit_log().completeness(),
            total_tokens: self.cumulative_tokens,
            total_cost_usd: self.cumulative_cost_usd,
            total_ticks: self.rows.len() as u64,
            stop_reason,
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
