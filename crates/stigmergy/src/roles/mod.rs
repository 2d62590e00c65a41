//! Role runtimes (C7, §4.7): the shared five-step cycle — perceive,
//! should_act, decide, execute, deposit — that Discover, Transform, Test,
//! and Validate each specialize.
//!
//! No role ever talks to another role directly; every signal a role acts
//! on came from reading the pheromone store, and every effect it produces
//! is a write back to the store. `run_cycle` is the one place that
//! sequence is enforced, so an individual role implementation cannot skip
//! a step.

pub mod discover;
pub mod transform;
pub mod validate;

use stigmergy_types::{FileId, Role};

use crate::clock::TickCounter;
use crate::store::{PheromoneStore, StoreError};

/// Resource spend and any effector-reported confidence from one `execute`
/// call, folded into the run's cumulative budget by the orchestrator
/// (§4.3, §6.3) and, where present, into the deposited status/quality
/// entry by `deposit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionCost {
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub confidence: Option<f64>,
}

/// The shared role lifecycle. `View` is whatever a role reads out of the
/// store to decide whether it has work; `Action` is one file id's worth
/// of planned work.
pub trait RoleRuntime {
    type View;
    type Action;

    fn role(&self) -> Role;

    /// Read the store for everything this role might care about this
    /// tick. Must not mutate.
    fn perceive(&self, store: &PheromoneStore) -> Self::View;

    /// Cheap gate: is there anything in `view` worth planning for?
    fn should_act(&self, view: &Self::View) -> bool;

    /// Turn `view` into concrete per-file actions. May reserve scope locks
    /// via the guardrails module (the one store mutation `decide` is
    /// allowed to make) but otherwise only reads. `clock` is passed through
    /// so a reserved lock is stamped with the real current tick rather than
    /// an arbitrary one, which the TTL zombie sweep depends on.
    fn decide(
        &self,
        store: &mut PheromoneStore,
        clock: &TickCounter,
        view: &Self::View,
    ) -> anyhow::Result<Vec<Self::Action>>;

    /// Run one action against this role's external effector(s).
    fn execute(&self, action: &Self::Action) -> anyhow::Result<ExecutionCost>;

    /// Write the outcome of `action` back into the store.
    fn deposit(
        &self,
        store: &mut PheromoneStore,
        clock: &TickCounter,
        action: &Self::Action,
        cost: ExecutionCost,
    ) -> Result<(), StoreError>;

    /// Run perceive -> should_act -> decide -> execute -> deposit once,
    /// returning the total cost spent and whether any file was acted on.
    fn run_cycle(
        &self,
        store: &mut PheromoneStore,
        clock: &TickCounter,
    ) -> anyhow::Result<(bool, ExecutionCost)> {
        let view = self.perceive(store);
        if !self.should_act(&view) {
            return Ok((false, ExecutionCost::default()));
        }

        let actions = self.decide(store, clock, &view)?;
        let mut total = ExecutionCost::default();
        let mut acted = false;

        for action in &actions {
            let cost = self.execute(action)?;
            self.deposit(store, clock, action, cost)?;
            total.tokens_used += cost.tokens_used;
            total.cost_usd += cost.cost_usd;
            acted = true;
        }

        Ok((acted, total))
    }
}

/// Files currently eligible for a role's attention, already filtered to
/// unlocked-or-self-locked entries. Shared helper used by every role's
/// `perceive`.
pub(crate) fn unlocked_candidates(store: &PheromoneStore, role: Role, ids: Vec<FileId>) -> Vec<FileId> {
    ids.into_iter()
        .filter(|id| {
            store
                .get_status(id)
                .map(|entry| entry.lock_owner.is_none() || entry.lock_owner == Some(role))
                .unwrap_or(false)
        })
        .collect()
}
