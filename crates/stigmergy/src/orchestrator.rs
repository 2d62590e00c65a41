//! Tick orchestrator (C8, §4.6): the fixed per-tick algorithm that drives
//! every role to completion or to one of the stop conditions.
//!
//! Per tick: advance the clock, release zombie scope locks, promote
//! `retry` files back to `pending`, apply one tick of decay, activate the
//! four roles in the fixed order Discover -> Transform -> Test ->
//! Validate, record the tick's metrics, persist the store, then evaluate
//! stop conditions.

use std::collections::BTreeMap;

use chrono::Utc;
use stigmergy_types::{Budgets, Role, RunManifest, RunSummary, StopReason};

use crate::clock::TickCounter;
use crate::config::Config;
use crate::decay;
use crate::guardrails;
use crate::metrics::MetricsCollector;
use crate::roles::{ExecutionCost, RoleRuntime};
use crate::store::{schema_version_for, PheromoneStore};

pub struct Orchestrator<Disc, Trans, Tst, Val> {
    pub store: PheromoneStore,
    pub config: Config,
    pub discover: Disc,
    pub transform: Trans,
    pub test: Tst,
    pub validate: Val,
    run_id: String,
    clock: TickCounter,
    metrics: MetricsCollector,
}

impl<Disc, Trans, Tst, Val> Orchestrator<Disc, Trans, Tst, Val>
where
    Disc: RoleRuntime,
    Trans: RoleRuntime,
    Tst: RoleRuntime,
    Val: RoleRuntime,
{
    /// Build the orchestrator and write the immutable run manifest (§3.5)
    /// before the first tick runs.
    pub fn new(
        store: PheromoneStore,
        config: Config,
        discover: Disc,
        transform: Trans,
        test: Tst,
        validate: Val,
    ) -> anyhow::Result<Self> {
        let run_id = config.run_id();
        store.write_manifest(&RunManifest {
            schema_version: schema_version_for("manifest"),
            run_id: run_id.clone(),
            timestamp_utc: Utc::now(),
            target_repo_commit: None,
            config_hash: config.config_hash(),
            seed: config.seed,
            model_id: config.model_id.clone(),
            budgets: Budgets {
                max_tokens_total: config.budgets.max_tokens_total,
                max_budget_usd: config.budgets.max_budget_usd,
            },
            runtime_versions: BTreeMap::from([(
                "stigmergy".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            )]),
        })?;

        Ok(Self {
            store,
            config,
            discover,
            transform,
            test,
            validate,
            run_id,
            clock: TickCounter::new(),
            metrics: MetricsCollector::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run ticks until a stop condition is reached, returning the final
    /// summary.
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        loop {
            if let Some(reason) = self.run_tick()? {
                return self.finalize(reason);
            }
        }
    }

    /// Summarize the run so far and persist it as the final summary
    /// artifact (§3.5). Called once a stop condition is reached, whether
    /// from `run` or directly by a caller driving ticks itself (e.g. the
    /// CLI's `--dry-run` path).
    pub fn finalize(&mut self, reason: StopReason) -> anyhow::Result<RunSummary> {
        let summary = self.metrics.summarize(&self.store, reason);
        self.store.write_summary(&self.run_id, &summary)?;
        Ok(summary)
    }

    /// Run exactly one tick, returning `Some(reason)` if this tick reached
    /// a stop condition.
    pub fn run_tick(&mut self) -> anyhow::Result<Option<StopReason>> {
        let tick = self.clock.advance();

        guardrails::release_zombie_locks(&mut self.store, &self.config.guardrails, tick)?;
        guardrails::promote_retries(&mut self.store)?;
        decay::apply_tick(&mut self.store, &self.config.decay)?;

        let mut acted = BTreeMap::new();
        let mut tokens_spent = 0u64;
        let mut cost_spent = 0.0f64;

        for (role, (did_act, cost)) in [
            (Role::Discover, self.discover.run_cycle(&mut self.store, &self.clock)?),
            (Role::Transform, self.transform.run_cycle(&mut self.store, &self.clock)?),
            (Role::Test, self.test.run_cycle(&mut self.store, &self.clock)?),
            (Role::Validate, self.validate.run_cycle(&mut self.store, &self.clock)?),
        ] {
            acted.insert(role, did_act);
            tokens_spent += cost.tokens_used;
            cost_spent += cost.cost_usd;
        }

        self.metrics.record_tick(tick, acted, tokens_spent, cost_spent, &self.store);
        if let Some(row) = self.metrics.rows().last() {
            self.store.append_tick_row(&self.run_id, row)?;
        }
        self.store.persist()?;

        Ok(self.check_stop(tick))
    }

    fn check_stop(&self, tick: u64) -> Option<StopReason> {
        let files_total = self.store.file_ids().count();
        let all_terminal = files_total > 0
            && self.store.all_status().all(|(_, entry)| entry.status.is_loop_terminal());
        if all_terminal {
            return Some(StopReason::AllTerminal);
        }

        if guardrails::budget_exhausted(
            self.metrics.cumulative_tokens(),
            self.metrics.cumulative_cost_usd(),
            &self.config.budgets,
        ) {
            return Some(StopReason::BudgetExhausted);
        }

        if tick >= self.config.stop.max_ticks {
            return Some(StopReason::MaxTicks);
        }

        if self.metrics.trailing_idle_streak() >= self.config.stop.max_idle_cycles {
            return Some(StopReason::IdleCycles);
        }

        None
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn current_tick(&self) -> u64 {
        self.clock.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effectors::{NullLlmEffector, NullPatternDetector, NullTestRunner, NullVcsEffector};
    use crate::roles::discover::{DiscoverRole, InMemoryFileSource};
    use crate::roles::test::TestRole;
    use crate::roles::transform::{ContentSource, TransformRole};
    use crate::roles::validate::ValidateRole;
    use stigmergy_types::FileStatus;

    struct StaticContent;
    impl ContentSource for StaticContent {
        fn load(&self, _file_id: &str) -> anyhow::Result<String> {
            Ok("legacy code".to_string())
        }
    }

    fn build_orchestrator(
        files: Vec<(String, String)>,
        state_dir: &std::path::Path,
    ) -> Orchestrator<
        DiscoverRole<InMemoryFileSource, NullPatternDetector>,
        TransformRole<StaticContent, NullLlmEffector>,
        TestRole<NullTestRunner>,
        ValidateRole<NullVcsEffector>,
    > {
        let store = PheromoneStore::open(state_dir).expect("open");
        let config = Config::default();

        Orchestrator::new(
            store,
            config.clone(),
            DiscoverRole::new(InMemoryFileSource { files }, NullPatternDetector),
            TransformRole {
                content: StaticContent,
                llm: NullLlmEffector,
                guardrails: config.guardrails.clone(),
                max_claims_per_tick: 10,
            },
            TestRole { runner: NullTestRunner },
            ValidateRole { vcs: NullVcsEffector, guardrails: config.guardrails },
        )
        .expect("new orchestrator writes its manifest")
    }

    #[test]
    fn empty_store_does_not_immediately_report_all_terminal() {
        let td = tempfile::tempdir().expect("tempdir");
        let orchestrator = build_orchestrator(vec![], td.path());
        assert!(orchestrator.check_stop(1).is_none());
    }

    #[test]
    fn single_file_runs_to_validated_via_null_effectors() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut orchestrator =
            build_orchestrator(vec![("a.x".to_string(), "legacy code".to_string())], td.path());

        let summary = orchestrator.run().expect("run");

        assert_eq!(summary.stop_reason, stigmergy_types::StopReason::AllTerminal);
        assert_eq!(summary.files_validated, 1);
        assert_eq!(orchestrator.store.get_status("a.x").unwrap().status, FileStatus::Validated);
    }

    #[test]
    fn run_tick_persists_and_advances_clock() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut orchestrator = build_orchestrator(vec![], td.path());
        orchestrator.run_tick().expect("tick");
        assert_eq!(orchestrator.current_tick(), 1);
    }

    #[test]
    fn run_writes_manifest_ticks_and_summary_artifacts() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut orchestrator =
            build_orchestrator(vec![("a.x".to_string(), "legacy code".to_string())], td.path());
        let run_id = orchestrator.run_id().to_string();

        orchestrator.run().expect("run");

        let state_dir = td.path();
        assert!(state_dir.join(format!("run_{run_id}_manifest.json")).exists());
        assert!(state_dir.join(format!("run_{run_id}_ticks.jsonl")).exists());
        assert!(state_dir.join(format!("run_{run_id}_summary.json")).exists());
    }

    #[test]
    fn max_ticks_stops_an_otherwise_idle_run() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut orchestrator = build_orchestrator(vec![], td.path());
        orchestrator.config.stop.max_ticks = 2;
        orchestrator.config.stop.max_idle_cycles = 1000;

        let summary = orchestrator.run().expect("run");
        assert_eq!(summary.stop_reason, stigmergy_types::StopReason::MaxTicks);
        assert_eq!(summary.total_ticks, 2);
    }
}
