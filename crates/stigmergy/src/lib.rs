//! Stigmergic orchestration core for multi-agent legacy-to-modern code
//! migration.
//!
//! Four roles — Discover, Transform, Test, Validate — cooperate on a
//! shared pheromone store with no direct channel between them. Every
//! signal one role acts on came from a deposit another role (or the
//! decay engine, or the guardrails) made to the store; every effect a
//! role produces is a write back to it. The orchestrator's job is just to
//! run that loop to a stop condition and account for what happened along
//! the way.
//!
//! - [`store`]: the three typed pheromone maps plus the audit trail (C3).
//! - [`decay`]: per-tick evaporation of intensity and inhibition (C4).
//! - [`guardrails`]: scope locks, TTL release, retry ceilings, budgets,
//!   confidence bands (C5).
//! - [`state_machine`]: the legal status transition table (C6).
//! - [`roles`]: the shared role lifecycle and the four concrete roles
//!   (C7).
//! - [`orchestrator`]: the tick loop that ties the above together (C8).
//! - [`metrics`]: per-tick timeseries and the final run summary (C9).
//! - [`effectors`]: traits for the external collaborators (LLM, pattern
//!   detector, test runner, VCS) roles drive but don't implement.
//! - [`clock`]: the monotonic tick counter (C1).
//! - [`config`]: layered run configuration.
//! - [`lock`]: the process-level run lock (distinct from the per-file
//!   scope lock).

pub mod clock;
pub mod config;
pub mod decay;
pub mod effectors;
pub mod guardrails;
pub mod lock;
pub mod metrics;
pub mod orchestrator;
pub mod roles;
pub mod state_machine;
pub mod store;

pub use stigmergy_types as types;
