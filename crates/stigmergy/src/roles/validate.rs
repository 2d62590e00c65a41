//! Validate (§4.7d): the final gate. Reads a `tested` file's quality
//! pheromone, routes it by confidence band — commit and mark `validated`,
//! send to `needs_review`, or loop back through `retry`/`skipped` — and is
//! the only role that touches version control.

use stigmergy_types::{FileId, FileStatus, Role};

use crate::clock::TickCounter;
use crate::config::GuardrailConfig;
use crate::effectors::VcsEffector;
use crate::guardrails::{classify_confidence, retry_or_skip, try_acquire_scope_lock, ConfidenceBand};
use crate::store::{PheromoneStore, QueryFilter, StoreError};

use super::{ExecutionCost, RoleRuntime};

pub struct ValidateRole<V> {
    pub vcs: V,
    pub guardrails: GuardrailConfig,
}

pub struct ValidateView {
    candidates: Vec<FileId>,
}

pub struct ValidateAction {
    pub file_id: FileId,
    pub confidence: f64,
    pub retry_count: u32,
}

/// What Validate decided to do with a file, carried from `execute` (where
/// the VCS side effect happens) to `deposit` (where the store is
/// updated), since a vote this consequential shouldn't be recomputed
/// twice against two different code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Validated,
    NeedsReview,
    Retry,
    Skipped,
}

impl<V> RoleRuntime for ValidateRole<V>
where
    V: VcsEffector,
{
    type View = ValidateView;
    type Action = ValidateAction;

    fn role(&self) -> Role {
        Role::Validate
    }

    fn perceive(&self, store: &PheromoneStore) -> Self::View {
        let ids = store
            .query_status(&[QueryFilter::eq(
                "status",
                serde_json::json!(FileStatus::Tested.as_str()),
            )])
            .into_iter()
            .map(|(id, _)| id.clone())
            .collect();
        ValidateView { candidates: super::unlocked_candidates(store, Role::Validate, ids) }
    }

    fn should_act(&self, view: &Self::View) -> bool {
        !view.candidates.is_empty()
    }

    fn decide(
        &self,
        store: &mut PheromoneStore,
        clock: &TickCounter,
        view: &Self::View,
    ) -> anyhow::Result<Vec<Self::Action>> {
        let mut actions = Vec::new();
        for file_id in &view.candidates {
            if !try_acquire_scope_lock(store, file_id, Role::Validate, clock.current())? {
                continue;
            }
            let confidence = store.get_quality(file_id).map(|q| q.confidence).unwrap_or(0.0);
            let retry_count = store.get_status(file_id).map(|s| s.retry_count).unwrap_or(0);
            actions.push(ValidateAction { file_id: file_id.clone(), confidence, retry_count });
        }
        Ok(actions)
    }

    fn execute(&self, action: &Self::Action) -> anyhow::Result<ExecutionCost> {
        match verdict_for(action, &self.guardrails) {
            Verdict::Validated => self.vcs.commit(&action.file_id, "migrate legacy pattern")?,
            Verdict::Skipped => self.vcs.rollback(&action.file_id)?,
            Verdict::NeedsReview | Verdict::Retry => {}
        }
        Ok(ExecutionCost::default())
    }

    fn deposit(
        &self,
        store: &mut PheromoneStore,
        _clock: &TickCounter,
        action: &Self::Action,
        _cost: ExecutionCost,
    ) -> Result<(), StoreError> {
        let verdict = verdict_for(action, &self.guardrails);
        let next_status = match verdict {
            Verdict::Validated => FileStatus::Validated,
            Verdict::NeedsReview => FileStatus::NeedsReview,
            Verdict::Retry => FileStatus::Retry,
            Verdict::Skipped => FileStatus::Skipped,
        };

        store.update_status(&action.file_id, Role::Validate, |entry| {
            entry.status = next_status;
            entry.agent = Role::Validate;
            if matches!(verdict, Verdict::Retry) {
                entry.retry_count += 1;
                entry.inhibition += 0.5;
            }
            entry.lock_owner = None;
            entry.lock_acquired_tick = None;
        })
    }
}

/// Pure function of an action's confidence and retry count, so `execute`
/// (which drives the VCS) and `deposit` (which writes the status) always
/// agree on what happened without passing the verdict through
/// `ExecutionCost`.
fn verdict_for(action: &ValidateAction, guardrails: &GuardrailConfig) -> Verdict {
    match classify_confidence(action.confidence, guardrails) {
        ConfidenceBand::High => Verdict::Validated,
        ConfidenceBand::Mid => Verdict::NeedsReview,
        ConfidenceBand::Low => match retry_or_skip(action.retry_count, guardrails) {
            FileStatus::Skipped => Verdict::Skipped,
            _ => Verdict::Retry,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use stigmergy_types::{Classification, QualityEntry, StatusEntry};

    struct StubVcs {
        committed: std::cell::RefCell<Vec<String>>,
        rolled_back: std::cell::RefCell<Vec<String>>,
    }

    impl StubVcs {
        fn new() -> Self {
            Self { committed: Default::default(), rolled_back: Default::default() }
        }
    }

    impl VcsEffector for StubVcs {
        fn commit(&self, file_id: &str, _message: &str) -> anyhow::Result<()> {
            self.committed.borrow_mut().push(file_id.to_string());
            Ok(())
        }

        fn rollback(&self, file_id: &str) -> anyhow::Result<()> {
            self.rolled_back.borrow_mut().push(file_id.to_string());
            Ok(())
        }
    }

    fn seed_tested(store: &mut PheromoneStore, file_id: &str, confidence: f64, retry_count: u32) {
        store
            .create_status(
                file_id,
                StatusEntry {
                    status: FileStatus::Tested,
                    previous_status: Some(FileStatus::Transformed),
                    agent: Role::Test,
                    timestamp: Utc::now(),
                    retry_count,
                    inhibition: 0.0,
                    lock_owner: None,
                    lock_acquired_tick: None,
                    metadata: BTreeMap::new(),
                },
                Role::Test,
            )
            .expect("create status");
        store
            .deposit_quality(
                file_id,
                QualityEntry {
                    confidence,
                    tests_total: 4,
                    tests_passed: 4,
                    tests_failed: 0,
                    coverage: Some(0.9),
                    issues: vec![],
                    classification: Classification::Pass,
                    timestamp: Utc::now(),
                },
                Role::Test,
            )
            .expect("deposit quality");
    }

    #[test]
    fn high_confidence_commits_and_validates() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        seed_tested(&mut store, "a.x", 0.95, 0);

        let role = ValidateRole { vcs: StubVcs::new(), guardrails: GuardrailConfig::default() };
        let clock = TickCounter::new();
        role.run_cycle(&mut store, &clock).expect("cycle");

        assert_eq!(store.get_status("a.x").unwrap().status, FileStatus::Validated);
        assert_eq!(role.vcs.committed.borrow().as_slice(), ["a.x"]);
    }

    #[test]
    fn mid_confidence_escalates_to_needs_review() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        seed_tested(&mut store, "a.x", 0.65, 0);

        let role = ValidateRole { vcs: StubVcs::new(), guardrails: GuardrailConfig::default() };
        let clock = TickCounter::new();
        role.run_cycle(&mut store, &clock).expect("cycle");

        assert_eq!(store.get_status("a.x").unwrap().status, FileStatus::NeedsReview);
    }

    #[test]
    fn low_confidence_retries_at_the_ceiling() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        seed_tested(&mut store, "a.x", 0.2, 3);

        let role = ValidateRole { vcs: StubVcs::new(), guardrails: GuardrailConfig::default() };
        let clock = TickCounter::new();
        role.run_cycle(&mut store, &clock).expect("cycle");

        assert_eq!(store.get_status("a.x").unwrap().status, FileStatus::Retry);
        assert_eq!(store.get_status("a.x").unwrap().retry_count, 4);
        assert_eq!(store.get_status("a.x").unwrap().inhibition, 0.5);
    }

    #[test]
    fn low_confidence_retries_until_ceiling_then_skips() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        seed_tested(&mut store, "a.x", 0.2, 4);

        let role = ValidateRole { vcs: StubVcs::new(), guardrails: GuardrailConfig::default() };
        let clock = TickCounter::new();
        role.run_cycle(&mut store, &clock).expect("cycle");

        assert_eq!(store.get_status("a.x").unwrap().status, FileStatus::Skipped);
        assert_eq!(role.vcs.rolled_back.borrow().as_slice(), ["a.x"]);
    }
}
