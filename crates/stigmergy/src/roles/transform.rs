//! Transform (§4.7b): claims the highest-intensity pending file it can get
//! a scope lock on, drives the language-model effector to rewrite it, and
//! deposits the result as `transformed`.

use stigmergy_types::{FileId, FileStatus, Role};

use crate::clock::TickCounter;
use crate::config::GuardrailConfig;
use crate::effectors::{LlmEffector, TransformRequest};
use crate::guardrails::try_acquire_scope_lock;
use crate::store::{PheromoneStore, QueryFilter, StoreError};

use super::{ExecutionCost, RoleRuntime};

/// Supplies the current content of a file so Transform can hand it to the
/// LLM effector. Kept separate from `discover::FileSource` — by the time
/// Transform runs, a file's content may differ from what Discover last
/// saw (a previous failed attempt may have partially rewritten it).
pub trait ContentSource {
    fn load(&self, file_id: &str) -> anyhow::Result<String>;
}

pub struct TransformRole<C, L> {
    pub content: C,
    pub llm: L,
    pub guardrails: GuardrailConfig,
    /// How many files to claim in a single tick; bounds how much of the
    /// token budget one role can commit before the orchestrator checks it
    /// again (§6.3).
    pub max_claims_per_tick: usize,
}

pub struct TransformView {
    candidates: Vec<FileId>,
}

pub struct TransformAction {
    pub file_id: FileId,
    pub content: String,
    pub patterns: Vec<String>,
}

impl<C, L> RoleRuntime for TransformRole<C, L>
where
    C: ContentSource,
    L: LlmEffector,
{
    type View = TransformView;
    type Action = TransformAction;

    fn role(&self) -> Role {
        Role::Transform
    }

    fn perceive(&self, store: &PheromoneStore) -> Self::View {
        let ids = store
            .query_status(&[QueryFilter::eq(
                "status",
                serde_json::json!(FileStatus::Pending.as_str()),
            )])
            .into_iter()
            .filter(|(_, entry)| entry.inhibition < self.guardrails.inhibition_threshold)
            .map(|(id, _)| id.clone())
            .collect();
        let unlocked = super::unlocked_candidates(store, Role::Transform, ids);

        let mut candidates: Vec<(FileId, f64)> = unlocked
            .into_iter()
            .filter_map(|id| store.get_task(&id).map(|task| (id, task.intensity)))
            .filter(|(_, intensity)| *intensity >= self.guardrails.intensity_min)
            .collect();

        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        TransformView { candidates: candidates.into_iter().map(|(id, _)| id).collect() }
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
            if actions.len() >= self.max_claims_per_tick {
                break;
            }
            if !try_acquire_scope_lock(store, file_id, Role::Transform, clock.current())? {
                continue;
            }
            let content = match self.content.load(file_id) {
                Ok(c) => c,
                Err(_) => continue,
            };
            let patterns = store
                .get_task(file_id)
                .map(|t| t.patterns_found.clone())
                .unwrap_or_default();
            actions.push(TransformAction { file_id: file_id.clone(), content, patterns });
        }

        Ok(actions)
    }

    fn execute(&self, action: &Self::Action) -> anyhow::Result<ExecutionCost> {
        let request = TransformRequest {
            file_id: action.file_id.clone(),
            content: action.content.clone(),
            patterns: action.patterns.clone(),
        };
        let response = self.llm.transform(&request)?;
        // The rewritten content itself isn't modeled by the store (§3.3
        // tracks pheromones, not file bodies); a real `ContentSource`
        // would persist `response.content` to the working tree here.
        Ok(ExecutionCost {
            tokens_used: response.tokens_used,
            cost_usd: response.cost_usd,
            confidence: Some(response.confidence),
        })
    }

    fn deposit(
        &self,
        store: &mut PheromoneStore,
        _clock: &TickCounter,
        action: &Self::Action,
        cost: ExecutionCost,
    ) -> Result<(), StoreError> {
        let confidence = cost.confidence.unwrap_or(1.0);
        store.update_status(&action.file_id, Role::Transform, |entry| {
            entry.status = FileStatus::Transformed;
            entry.agent = Role::Transform;
            entry
                .metadata
                .insert("transform_confidence".to_string(), serde_json::json!(confidence));
        })
    }
}
