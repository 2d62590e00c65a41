//! Property-based checks for the core invariants (§8.1): decay never
//! increases a value, every audit event the store produces carries a full
//! before/after pair, and the state machine never permits a transition out
//! of a terminal status.

use proptest::prelude::*;
use stigmergy::state_machine::is_allowed;
use stigmergy::store::PheromoneStore;
use stigmergy_types::{DetectionSource, FileStatus, Role, StatusEntry, TaskEntry};

fn arbitrary_status() -> impl Strategy<Value = FileStatus> {
    prop_oneof![
        Just(FileStatus::Pending),
        Just(FileStatus::InProgress),
        Just(FileStatus::Transformed),
        Just(FileStatus::Tested),
        Just(FileStatus::Validated),
        Just(FileStatus::NeedsReview),
        Just(FileStatus::Failed),
        Just(FileStatus::Retry),
        Just(FileStatus::Skipped),
    ]
}

proptest! {
    #[test]
    fn decay_never_increases_intensity(intensity in 0.0f64..10.0, rho in 0.0f64..1.0) {
        let decayed = stigmergy_decay::decay_intensity(intensity, stigmergy_decay::DecayLaw::Exponential, rho);
        prop_assert!(decayed <= intensity + 1e-9);

        let decayed_linear = stigmergy_decay::decay_intensity(intensity, stigmergy_decay::DecayLaw::Linear, rho);
        prop_assert!(decayed_linear <= intensity + 1e-9);
    }

    #[test]
    fn decay_never_increases_inhibition(inhibition in 0.0f64..5.0, k_gamma in 0.0f64..1.0) {
        let decayed = stigmergy_decay::decay_inhibition(inhibition, k_gamma);
        prop_assert!(decayed <= inhibition + 1e-9);
        prop_assert!(decayed >= 0.0);
    }

    #[test]
    fn terminal_statuses_never_have_outgoing_transitions(to in arbitrary_status()) {
        prop_assert!(!is_allowed(FileStatus::Validated, to));
        prop_assert!(!is_allowed(FileStatus::Skipped, to));
    }

    #[test]
    fn every_deposit_produces_a_complete_audit_event(intensity in 0.0f64..10.0, pattern_count in 0u32..5) {
        let td = tempfile::tempdir().unwrap();
        let mut store = PheromoneStore::open(td.path()).unwrap();

        let task = TaskEntry {
            intensity,
            pattern_count,
            dep_count: 0,
            patterns_found: (0..pattern_count).map(|i| format!("pattern_{i}")).collect(),
            detection_source: DetectionSource::Structural,
            created_at: chrono::Utc::now(),
            created_by: Role::Discover,
        };
        store.deposit_task("a.x", task, Role::Discover).unwrap();

        for event in store.audit_log().all_events() {
            prop_assert!(event.has_full_before_after());
        }
    }
}

#[test]
fn validated_file_audit_trail_includes_tested_to_validated_transition() {
    let td = tempfile::tempdir().expect("tempdir");
    let mut store = PheromoneStore::open(td.path()).expect("open");

    store
        .create_status(
            "a.x",
            StatusEntry {
                status: FileStatus::Pending,
                previous_status: None,
                agent: Role::Discover,
                timestamp: chrono::Utc::now(),
                retry_count: 0,
                inhibition: 0.0,
                lock_owner: None,
                lock_acquired_tick: None,
                metadata: Default::default(),
            },
            Role::Discover,
        )
        .expect("create");

    for (from, to) in [
        (FileStatus::Pending, FileStatus::InProgress),
        (FileStatus::InProgress, FileStatus::Transformed),
        (FileStatus::Transformed, FileStatus::Tested),
        (FileStatus::Tested, FileStatus::Validated),
    ] {
        store
            .update_status("a.x", Role::System, |entry| entry.status = to)
            .unwrap_or_else(|e| panic!("transition {from:?} -> {to:?} failed: {e}"));
    }

    assert!(store.audit_log().has_transition(
        &"a.x".to_string(),
        "status",
        "tested",
        "validated"
    ));
    assert_eq!(store.audit_log().completeness(), 1.0);
}
