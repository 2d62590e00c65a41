//! Domain types for the stigmergic migration orchestrator.
//!
//! This crate defines the shapes persisted by the pheromone store — the
//! three typed maps (tasks, status, quality), the audit event record, and
//! the per-run artifacts (manifest, tick rows, summary) — with no behavior
//! attached. The orchestration logic that reads and writes these shapes
//! lives in the `stigmergy` crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a file under migration, typically a repo-relative path.
pub type FileId = String;

/// The four coordinating roles, plus the orchestrator itself acting on a
/// file's behalf (TTL release, retry promotion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Discover,
    Transform,
    Test,
    Validate,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Discover => "discover",
            Role::Transform => "transform",
            Role::Test => "test",
            Role::Validate => "validate",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which pattern-detection strategy produced a task entry's findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    Structural,
    Textual,
    Semantic,
}

/// Per-file lifecycle status. Terminal: `Validated`, `Skipped`. Pause:
/// `NeedsReview`. The allowed transition table lives in
/// `stigmergy::state_machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    InProgress,
    Transformed,
    Tested,
    Validated,
    NeedsReview,
    Failed,
    Retry,
    Skipped,
}

impl FileStatus {
    /// Terminal states never transition again within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Validated | FileStatus::Skipped)
    }

    /// Working states are actively being moved through the pipeline and do
    /// not decay and do not count as "still open" for starvation purposes.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            FileStatus::InProgress | FileStatus::Transformed | FileStatus::Tested
        )
    }

    /// `needs_review` is a pause state but counts as loop-terminal for the
    /// `all_terminal` stop condition: a run with every file parked at
    /// `needs_review` has nothing left to act on and should not spin.
    pub fn is_loop_terminal(&self) -> bool {
        self.is_terminal() || matches!(self, FileStatus::NeedsReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::InProgress => "in_progress",
            FileStatus::Transformed => "transformed",
            FileStatus::Tested => "tested",
            FileStatus::Validated => "validated",
            FileStatus::NeedsReview => "needs_review",
            FileStatus::Failed => "failed",
            FileStatus::Retry => "retry",
            FileStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Test/compile outcome classification produced by the Test role (§4.7c).
/// Ordering is meaningful: `compile_fail < fail_related < fail_inconclusive
/// ≤ pass` in confidence terms, though this enum itself carries no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Pass,
    FailRelated,
    FailInconclusive,
    CompileFail,
    NoTests,
}

/// A task pheromone: priority signal for Transform, deposited by Discover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub intensity: f64,
    pub pattern_count: u32,
    pub dep_count: u32,
    pub patterns_found: Vec<String>,
    pub detection_source: DetectionSource,
    pub created_at: DateTime<Utc>,
    pub created_by: Role,
}

/// A status pheromone: the file's current lifecycle state plus guardrail
/// bookkeeping (lock ownership, retry count, inhibition field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: FileStatus,
    pub previous_status: Option<FileStatus>,
    pub agent: Role,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub inhibition: f64,
    pub lock_owner: Option<Role>,
    pub lock_acquired_tick: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl StatusEntry {
    pub fn is_locked(&self) -> bool {
        self.lock_owner.is_some()
    }
}

/// A quality pheromone: Test's classification and Validate's confidence
/// reinforcement/evaporation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityEntry {
    pub confidence: f64,
    pub tests_total: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub coverage: Option<f64>,
    pub issues: Vec<String>,
    pub classification: Classification,
    pub timestamp: DateTime<Utc>,
}

/// Which of the three typed maps an operation or audit event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapName {
    Tasks,
    Status,
    Quality,
}

impl MapName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapName::Tasks => "tasks",
            MapName::Status => "status",
            MapName::Quality => "quality",
        }
    }
}

impl std::fmt::Display for MapName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a store write created a new entry or merged fields into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
}

/// An append-only audit record capturing both sides of a mutation (§3.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub map_name: MapName,
    pub file_id: FileId,
    pub operation: Operation,
    pub fields_changed: BTreeMap<String, serde_json::Value>,
    pub previous_values: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// True iff every changed field has a recorded prior value entry (even
    /// if that prior value is JSON null for a field that didn't exist
    /// before). Used to compute `audit_completeness` (§4.7/§8.1).
    pub fn has_full_before_after(&self) -> bool {
        self.fields_changed
            .keys()
            .all(|k| self.previous_values.contains_key(k))
    }
}

/// Budget ceilings enforced by the guardrails (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Budgets {
    pub max_tokens_total: u64,
    /// `0` disables the monetary ceiling.
    pub max_budget_usd: f64,
}

/// Immutable manifest written at run start (§3.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    pub timestamp_utc: DateTime<Utc>,
    pub target_repo_commit: Option<String>,
    pub config_hash: String,
    pub seed: u64,
    pub model_id: String,
    pub budgets: Budgets,
    pub runtime_versions: BTreeMap<String, String>,
}

/// Why the orchestrator stopped (§4.6 step 5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    AllTerminal,
    BudgetExhausted,
    MaxTicks,
    IdleCycles,
    FatalError,
}

/// One row of the per-tick timeseries (§3.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRow {
    pub tick: u64,
    pub acted: BTreeMap<Role, bool>,
    pub cumulative_tokens: u64,
    pub cumulative_cost_usd: f64,
    pub status_counts: BTreeMap<FileStatus, u32>,
}

/// Final run aggregates (§4.7, §3.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_total: u64,
    pub files_validated: u64,
    pub files_failed: u64,
    pub files_needs_review: u64,
    pub files_skipped: u64,
    pub success_rate: f64,
    pub rollback_rate: f64,
    pub human_escalation_rate: f64,
    pub retry_resolution_rate: f64,
    pub starvation_count: u64,
    pub audit_completeness: f64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub total_ticks: u64,
    pub stop_reason: StopReason,
}
