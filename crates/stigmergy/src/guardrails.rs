//! Guardrails (C5, §4.3): scope locking, TTL zombie release, retry
//! promotion, the anti-loop retry ceiling, budget ceilings, and the
//! confidence bands Validate uses to route a file.
//!
//! Confidence bands and retry ceilings live in a single `GuardrailConfig`,
//! since this domain only needs one policy rather than a spread of named
//! presets.

use stigmergy_types::{FileStatus, Role};

use crate::config::{BudgetConfig, GuardrailConfig};
use crate::store::{PheromoneStore, StoreError};

/// Attempt to acquire the scope lock for `file_id` on behalf of `role`.
/// Succeeds if unlocked or already held by `role` (idempotent
/// re-acquisition within the same role's turn); fails (returns `false`,
/// not an error) if another role holds it — the caller should simply skip
/// the file this tick (§4.3: "one role owns a file id at a time").
///
/// Acquiring on behalf of `Transform` also moves a `pending` file to
/// `in_progress` (§4.5's `pending | in_progress | Transform | acquire
/// lock` row), so the later `in_progress -> transformed` deposit is a
/// legal transition instead of the illegal `pending -> transformed`.
pub fn try_acquire_scope_lock(
    store: &mut PheromoneStore,
    file_id: &str,
    role: Role,
    tick: u64,
) -> Result<bool, StoreError> {
    let Some(entry) = store.get_status(file_id) else {
        return Ok(false);
    };

    if let Some(owner) = entry.lock_owner {
        if owner != role {
            return Ok(false);
        }
    }

    store.update_status(file_id, role, |entry| {
        entry.lock_owner = Some(role);
        entry.lock_acquired_tick = Some(tick);
        if role == Role::Transform && entry.status == FileStatus::Pending {
            entry.status = FileStatus::InProgress;
        }
    })?;
    Ok(true)
}

/// Release the scope lock, regardless of owner. Used both by a role
/// finishing its turn and by the TTL sweep below.
pub fn release_scope_lock(store: &mut PheromoneStore, file_id: &str) -> Result<(), StoreError> {
    store.update_status(file_id, Role::System, |entry| {
        entry.lock_owner = None;
        entry.lock_acquired_tick = None;
    })
}

/// Release any scope lock whose holder has exceeded `scope_lock_ttl`
/// ticks without finishing its turn, treating it as a dead worker (§4.3,
/// §4.6 step 1). Returns the file ids released.
pub fn release_zombie_locks(
    store: &mut PheromoneStore,
    config: &GuardrailConfig,
    current_tick: u64,
) -> Result<Vec<String>, StoreError> {
    let stale: Vec<String> = store
        .all_status()
        .filter_map(|(file_id, entry)| {
            let acquired = entry.lock_acquired_tick?;
            entry.lock_owner?;
            if current_tick.saturating_sub(acquired) >= config.scope_lock_ttl {
                Some(file_id.clone())
            } else {
                None
            }
        })
        .collect();

    for file_id in &stale {
        release_scope_lock(store, file_id)?;
    }
    Ok(stale)
}

/// Promote every file sitting in `retry` back to `pending` so Discover and
/// Transform will pick it up again next tick (§4.6 step 1). This is a
/// distinct, earlier-in-the-tick step from the anti-loop ceiling below.
pub fn promote_retries(store: &mut PheromoneStore) -> Result<Vec<String>, StoreError> {
    let pending_retry: Vec<String> = store
        .all_status()
        .filter(|(_, entry)| entry.status == FileStatus::Retry)
        .map(|(file_id, _)| file_id.clone())
        .collect();

    for file_id in &pending_retry {
        store.update_status(file_id, Role::System, |entry| {
            entry.status = FileStatus::Pending;
        })?;
    }
    Ok(pending_retry)
}

/// Anti-loop ceiling: a file whose `retry_count` has exceeded
/// `max_retry_count` is routed to `skipped` instead of being allowed
/// another `retry` cycle (§4.3: "once retry_count exceeds
/// max_retry_count"). Called by a role when it would otherwise set status
/// to `retry`; returns the status to actually apply.
pub fn retry_or_skip(retry_count: u32, config: &GuardrailConfig) -> FileStatus {
    if retry_count > config.max_retry_count {
        FileStatus::Skipped
    } else {
        FileStatus::Retry
    }
}

/// Confidence-band routing decision for the Validate role (§4.3, §4.7d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Mid,
    Low,
}

pub fn classify_confidence(confidence: f64, config: &GuardrailConfig) -> ConfidenceBand {
    if confidence >= config.confidence_high {
        ConfidenceBand::High
    } else if confidence <= config.confidence_low {
        ConfidenceBand::Low
    } else {
        ConfidenceBand::Mid
    }
}

/// `true` once either budget ceiling has been reached (§4.3, §6.3). Used
/// by the orchestrator's stop-condition check and by roles deciding
/// whether to spend more tokens this tick.
pub fn budget_exhausted(cumulative_tokens: u64, cumulative_cost_usd: f64, budgets: &BudgetConfig) -> bool {
    if cumulative_tokens >= budgets.max_tokens_total {
        return true;
    }
    if budgets.max_budget_usd > 0.0 && cumulative_cost_usd >= budgets.max_budget_usd {
        return true;
    }
    false
}
