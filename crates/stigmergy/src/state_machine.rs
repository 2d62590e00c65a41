//! Explicit file-status transition table (C6, §4.5).
//!
//! Every status change that reaches the pheromone store is checked here
//! first. An attempted transition outside this table is a programming
//! error in a role implementation, not a recoverable runtime condition, so
//! it surfaces as `StoreError::TransitionInvalid` (C3) rather than being
//! silently coerced.

use stigmergy_types::FileStatus;

/// Returns `true` if `from -> to` is a legal transition per §4.5.
///
/// | from          | to (allowed)                                   |
/// |---------------|-------------------------------------------------|
/// | pending       | in_progress, skipped                           |
/// | in_progress   | transformed, failed, needs_review              |
/// | transformed   | tested, failed                                 |
/// | tested        | validated, retry, needs_review, failed, skipped|
/// | validated     | (terminal)                                     |
/// | needs_review  | pending, retry, skipped                        |
/// | failed        | retry, skipped                                 |
/// | retry         | pending, skipped                               |
/// | skipped       | (terminal)                                     |
pub fn is_allowed(from: FileStatus, to: FileStatus) -> bool {
    use FileStatus::*;
    if from == to {
        return false;
    }
    matches!(
        (from, to),
        (Pending, InProgress)
            | (Pending, Skipped)
            | (InProgress, Transformed)
            | (InProgress, Failed)
            | (InProgress, NeedsReview)
            | (Transformed, Tested)
            | (Transformed, Failed)
            | (Tested, Validated)
            | (Tested, Retry)
            | (Tested, NeedsReview)
            | (Tested, Failed)
            | (Tested, Skipped)
            | (NeedsReview, Pending)
            | (NeedsReview, Retry)
            | (NeedsReview, Skipped)
            | (Failed, Retry)
            | (Failed, Skipped)
            | (Retry, Pending)
            | (Retry, Skipped)
    )
}

/// Validate a transition, returning the pair on success so callers can
/// thread it straight into an audit record.
pub fn validate_transition(
    from: FileStatus,
    to: FileStatus,
) -> Result<(FileStatus, FileStatus), TransitionError> {
    if is_allowed(from, to) {
        Ok((from, to))
    } else {
        Err(TransitionError { from, to })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: FileStatus,
    pub to: FileStatus,
}
