//! Discover (§4.7a): finds files not yet tracked by the store, scans them
//! for legacy patterns, and deposits the initial task and status
//! pheromones.

use std::collections::BTreeMap;

use chrono::Utc;
use stigmergy_types::{DetectionSource, FileId, Role, StatusEntry, TaskEntry};

use crate::clock::TickCounter;
use crate::effectors::PatternDetector;
use crate::store::PheromoneStore;

use super::{ExecutionCost, RoleRuntime};

/// Enumerates candidate files under migration. Kept separate from
/// `PatternDetector` since listing a repo and scanning a file's content
/// are different concerns with different natural implementations (a
/// directory walk vs. a regex/AST pass).
pub trait FileSource {
    fn list_files(&self) -> anyhow::Result<Vec<(FileId, String)>>;
}

/// A `FileSource` backed by an in-memory list, for tests and dry runs.
pub struct InMemoryFileSource {
    pub files: Vec<(FileId, String)>,
}

impl FileSource for InMemoryFileSource {
    fn list_files(&self) -> anyhow::Result<Vec<(FileId, String)>> {
        Ok(self.files.clone())
    }
}

pub struct DiscoverRole<S, D> {
    pub source: S,
    pub detector: D,
}

impl<S, D> DiscoverRole<S, D>
where
    S: FileSource,
    D: PatternDetector,
{
    pub fn new(source: S, detector: D) -> Self {
        Self { source, detector }
    }
}

/// A file not yet known to the store, along with its content so `decide`
/// doesn't need to re-read the source.
pub struct DiscoverView {
    pub new_files: Vec<(FileId, String)>,
}

pub struct DiscoverAction {
    pub file_id: FileId,
    pub content: String,
}

impl<S, D> RoleRuntime for DiscoverRole<S, D>
where
    S: FileSource,
    D: PatternDetector,
{
    type View = DiscoverView;
    type Action = DiscoverAction;

    fn role(&self) -> Role {
        Role::Discover
    }

    fn perceive(&self, store: &PheromoneStore) -> Self::View {
        let listed = self.source.list_files().unwrap_or_default();
        let new_files = listed
            .into_iter()
            .filter(|(id, _)| store.get_status(id).is_none())
            .collect();
        DiscoverView { new_files }
    }

    fn should_act(&self, view: &Self::View) -> bool {
        !view.new_files.is_empty()
    }

    fn decide(
        &self,
        _store: &mut PheromoneStore,
        _clock: &TickCounter,
        view: &Self::View,
    ) -> anyhow::Result<Vec<Self::Action>> {
        Ok(view
            .new_files
            .iter()
            .map(|(id, content)| DiscoverAction { file_id: id.clone(), content: content.clone() })
            .collect())
    }

    fn execute(&self, _action: &Self::Action) -> anyhow::Result<ExecutionCost> {
        // Pattern detection is local static analysis, not a metered
        // external call, so it costs nothing against the token/USD
        // budget (§6.3 scopes budgets to the LLM effector only).
        Ok(ExecutionCost::default())
    }

    fn deposit(
        &self,
        store: &mut PheromoneStore,
        _clock: &TickCounter,
        action: &Self::Action,
        _cost: ExecutionCost,
    ) -> Result<(), crate::store::StoreError> {
        let patterns = self
            .detector
            .detect(&action.file_id, &action.content)
            .unwrap_or_default();

        let detection_source = patterns
            .first()
            .map(|p| p.source)
            .unwrap_or(DetectionSource::Structural);

        let task = TaskEntry {
            // Intensity lives in [0.0, 1.0] (§3.1): a bare discovery with no
            // detected pattern still seeds a non-zero signal, and each
            // additional pattern raises it toward the ceiling.
            intensity: (0.25 + patterns.len() as f64 * 0.25).clamp(0.0, 1.0),
            pattern_count: patterns.len() as u32,
            dep_count: 0,
            patterns_found: patterns.iter().map(|p| p.name.clone()).collect(),
            detection_source,
            created_at: Utc::now(),
            created_by: Role::Discover,
        };
        store.deposit_task(&action.file_id, task, Role::Discover)?;

        let status = StatusEntry {
            status: stigmergy_types::FileStatus::Pending,
            previous_status: None,
            agent: Role::Discover,
            timestamp: Utc::now(),
            retry_count: 0,
            inhibition: 0.0,
            lock_owner: None,
            lock_acquired_tick: None,
            metadata: BTreeMap::new(),
        };
        store.create_status(&action.file_id, status, Role::Discover)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effectors::{DetectedPattern, NullPatternDetector};

    struct StubDetector;
    impl PatternDetector for StubDetector {
        fn detect(&self, _file_id: &str, content: &str) -> anyhow::Result<Vec<DetectedPattern>> {
            if content.contains("legacy") {
                Ok(vec![DetectedPattern {
                    name: "legacy_api".to_string(),
                    source: DetectionSource::Textual,
                }])
            } else {
                Ok(vec![])
            }
        }
    }

    #[test]
    fn discovers_new_files_and_deposits_task_and_status() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        let role = DiscoverRole::new(
            InMemoryFileSource {
                files: vec![("a.x".to_string(), "legacy call here".to_string())],
            },
            StubDetector,
        );
        let clock = TickCounter::new();

        let (acted, cost) = role.run_cycle(&mut store, &clock).expect("cycle");
        assert!(acted);
        assert_eq!(cost.tokens_used, 0);
        assert_eq!(store.get_task("a.x").unwrap().pattern_count, 1);
        assert_eq!(
            store.get_status("a.x").unwrap().status,
            stigmergy_types::FileStatus::Pending
        );
    }

    #[test]
    fn already_known_files_are_not_rediscovered() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        let role = DiscoverRole::new(
            InMemoryFileSource { files: vec![("a.x".to_string(), "plain".to_string())] },
            NullPatternDetector,
        );
        let clock = TickCounter::new();

        role.run_cycle(&mut store, &clock).expect("first cycle");
        let (acted_again, _) = role.run_cycle(&mut store, &clock).expect("second cycle");
        assert!(!acted_again);
    }
}
