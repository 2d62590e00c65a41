//! Decay engine (C4, §4.2): apply one tick of evaporation to every
//! eligible task intensity and status inhibition value.
//!
//! The decay law itself lives in `stigmergy-decay`; this module is the
//! thin layer that knows which store entries are eligible and how to
//! clamp and re-deposit the results.

use stigmergy_types::{FileStatus, Role};

use crate::config::DecayConfig;
use crate::store::{PheromoneStore, StoreError};

/// Task intensity only decays while the file is still actionable (pending
/// or retry); a file mid-pipeline isn't "cooling off", it's being worked.
fn intensity_eligible(status: FileStatus) -> bool {
    matches!(status, FileStatus::Pending | FileStatus::Retry)
}

/// Apply one tick of decay across the whole store: intensity first, then
/// inhibition, matching the orchestrator's fixed per-tick ordering (§4.6
/// step 2, §4.2).
pub fn apply_tick(store: &mut PheromoneStore, config: &DecayConfig) -> Result<(), StoreError> {
    decay_intensities(store, config)?;
    decay_inhibitions(store, config)?;
    Ok(())
}

fn decay_intensities(store: &mut PheromoneStore, config: &DecayConfig) -> Result<(), StoreError> {
    let eligible: Vec<String> = store
        .all_status()
        .filter(|(_, entry)| intensity_eligible(entry.status))
        .map(|(file_id, _)| file_id.clone())
        .collect();

    for file_id in eligible {
        let Some(task) = store.get_task(&file_id) else {
            continue;
        };
        let mut updated = task.clone();
        let decayed = stigmergy_decay::decay_intensity(updated.intensity, config.law, config.rho);
        updated.intensity = decayed.clamp(config.intensity_floor, config.intensity_ceiling);
        store.deposit_task(&file_id, updated, Role::System)?;
    }
    Ok(())
}

fn decay_inhibitions(store: &mut PheromoneStore, config: &DecayConfig) -> Result<(), StoreError> {
    let targets: Vec<String> = store
        .all_status()
        .filter(|(_, entry)| entry.inhibition > 0.0)
        .map(|(file_id, _)| file_id.clone())
        .collect();

    for file_id in targets {
        store.update_status(&file_id, Role::System, |entry| {
            entry.inhibition = stigmergy_decay::decay_inhibition(entry.inhibition, config.k_gamma);
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use stigmergy_types::{DetectionSource, StatusEntry, TaskEntry};

    fn task(intensity: f64) -> TaskEntry {
        TaskEntry {
            intensity,
            pattern_count: 1,
            dep_count: 0,
            patterns_found: vec![],
            detection_source: DetectionSource::Structural,
            created_at: Utc::now(),
            created_by: Role::Discover,
        }
    }

    fn status(status: FileStatus, inhibition: f64) -> StatusEntry {
        StatusEntry {
            status,
            previous_status: None,
            agent: Role::Discover,
            timestamp: Utc::now(),
            retry_count: 0,
            inhibition,
            lock_owner: None,
            lock_acquired_tick: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn pending_task_intensity_decays() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        store.deposit_task("a.x", task(1.0), Role::Discover).expect("deposit");
        store
            .create_status("a.x", status(FileStatus::Pending, 0.0), Role::Discover)
            .expect("create");

        let config = DecayConfig::default();
        apply_tick(&mut store, &config).expect("decay");

        assert!(store.get_task("a.x").unwrap().intensity < 1.0);
    }

    #[test]
    fn working_status_does_not_decay_intensity() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        store.deposit_task("a.x", task(1.0), Role::Discover).expect("deposit");
        store
            .create_status("a.x", status(FileStatus::InProgress, 0.0), Role::Discover)
            .expect("create");

        let config = DecayConfig::default();
        apply_tick(&mut store, &config).expect("decay");

        assert_eq!(store.get_task("a.x").unwrap().intensity, 1.0);
    }

    #[test]
    fn inhibition_decays_regardless_of_status() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        store
            .create_status("a.x", status(FileStatus::NeedsReview, 0.5), Role::Discover)
            .expect("create");

        let config = DecayConfig::default();
        apply_tick(&mut store, &config).expect("decay");

        assert!(store.get_status("a.x").unwrap().inhibition < 0.5);
    }

    #[test]
    fn intensity_clamps_to_floor() {
        let td = tempfile::tempdir().expect("tempdir");
        let mut store = PheromoneStore::open(td.path()).expect("open");
        store.deposit_task("a.x", task(0.001), Role::Discover).expect("deposit");
        store
            .create_status("a.x", status(FileStatus::Pending, 0.0), Role::Discover)
            .expect("create");

        let mut config = DecayConfig::default();
        config.rho = 10.0;
        apply_tick(&mut store, &config).expect("decay");

        assert!(store.get_task("a.x").unwrap().intensity >= 0.0);
    }
}
