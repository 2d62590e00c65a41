//! Append-only audit log for pheromone store mutations (C2, §3.4).
//!
//! An in-memory buffer backed by a JSONL append-only file. The log is
//! never rewritten or truncated during a run (§3.4); callers only ever
//! append and read.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use stigmergy_types::{AuditEvent, FileId};

/// Default audit log file name.
pub const AUDIT_FILE: &str = "audit_log.jsonl";

/// Get the audit log path for a state directory.
pub fn audit_path(state_dir: &Path) -> PathBuf {
    state_dir.join(AUDIT_FILE)
}

/// In-memory accumulator for audit events, flushed to disk in JSONL.
#[derive(Debug, Default)]
pub struct AuditLog {
    events: Vec<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append an event to the in-memory buffer.
    pub fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    /// Append all buffered events to `path` in JSONL format, creating the
    /// file (and its parent directory) if necessary. Existing content is
    /// preserved — this never truncates.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create audit dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;

        let mut writer = std::io::BufWriter::new(file);
        for event in &self.events {
            let line =
                serde_json::to_string(event).context("failed to serialize audit event")?;
            writeln!(writer, "{}", line).context("failed to write audit event line")?;
        }
        writer.flush().context("failed to flush audit log")?;
        Ok(())
    }

    /// Read every event ever recorded at `path`. Returns an empty log if the
    /// file does not exist yet.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("failed to open audit log {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line
                .with_context(|| format!("failed to read line from audit log {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse audit event from line: {}", line))?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn events_for_file<'a>(&'a self, file_id: &str) -> Vec<&'a AuditEvent> {
        self.events.iter().filter(|e| e.file_id == file_id).collect()
    }

    pub fn all_events(&self) -> &[AuditEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ratio of events with complete before/after values to total events.
    /// Must be 1.0 in a correct implementation (§4.7, §8.1).
    pub fn completeness(&self) -> f64 {
        if self.events.is_empty() {
            return 1.0;
        }
        let complete = self
            .events
            .iter()
            .filter(|e| e.has_full_before_after())
            .count();
        complete as f64 / self.events.len() as f64
    }

    /// True iff a transition from `from_value` to `to_value` on `field` was
    /// ever recorded for `file_id`. Used by property tests checking that a
    /// terminal state was reached through the expected transition chain
    /// (§8.1: "for every file ending in validated, there exists ... an event
    /// transitioning tested → validated").
    pub fn has_transition(&self, file_id: &FileId, field: &str, from_value: &str, to_value: &str) -> bool {
        self.events_for_file(file_id).iter().any(|e| {
            e.fields_changed
                .get(field)
                .and_then(|v| v.as_str())
                .map(|v| v == to_value)
                .unwrap_or(false)
                && e.previous_values
                    .get(field)
                    .and_then(|v| v.as_str())
                    .map(|v| v == from_value)
                    .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use stigmergy_types::{MapName, Operation, Role};

    fn sample_event(file_id: &str) -> AuditEvent {
        let mut fields_changed = BTreeMap::new();
        fields_changed.insert("status".to_string(), serde_json::json!("pending"));
        let mut previous_values = BTreeMap::new();
        previous_values.insert("status".to_string(), serde_json::json!("in_progress"));

        AuditEvent {
            timestamp: Utc::now(),
            role: Role::System,
            map_name: MapName::Status,
            file_id: file_id.to_string(),
            operation: Operation::Update,
            fields_changed,
            previous_values,
        }
    }

    #[test]
    fn new_log_is_empty() {
        let log = AuditLog::new();
        assert!(log.is_empty());
        assert_eq!(log.completeness(), 1.0);
    }

    #[test]
    fn record_and_filter_by_file() {
        let mut log = AuditLog::new();
        log.record(sample_event("a.x"));
        log.record(sample_event("b.x"));
        assert_eq!(log.events_for_file("a.x").len(), 1);
        assert_eq!(log.events_for_file("b.x").len(), 1);
        assert_eq!(log.events_for_file("c.x").len(), 0);
    }

    #[test]
    fn write_and_read_roundtrip() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = audit_path(td.path());

        let mut log = AuditLog::new();
        log.record(sample_event("a.x"));
        log.write_to_file(&path).expect("write");

        let loaded = AuditLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn write_appends_across_calls() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = audit_path(td.path());

        let mut log1 = AuditLog::new();
        log1.record(sample_event("a.x"));
        log1.write_to_file(&path).expect("write first");

        let mut log2 = AuditLog::new();
        log2.record(sample_event("b.x"));
        log2.write_to_file(&path).expect("write second");

        let loaded = AuditLog::read_from_file(&path).expect("read");
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn read_missing_file_returns_empty() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = audit_path(td.path());
        let loaded = AuditLog::read_from_file(&path).expect("read");
        assert!(loaded.is_empty());
    }

    #[test]
    fn completeness_is_one_when_all_events_complete() {
        let mut log = AuditLog::new();
        log.record(sample_event("a.x"));
        log.record(sample_event("b.x"));
        assert_eq!(log.completeness(), 1.0);
    }

    #[test]
    fn completeness_drops_with_incomplete_event() {
        let mut log = AuditLog::new();
        log.record(sample_event("a.x"));

        let mut incomplete = sample_event("b.x");
        incomplete.previous_values.clear();
        log.record(incomplete);

        assert_eq!(log.completeness(), 0.5);
    }

    #[test]
    fn has_transition_detects_recorded_change() {
        let mut log = AuditLog::new();
        log.record(sample_event("a.x"));
        assert!(log.has_transition(&"a.x".to_string(), "status", "in_progress", "pending"));
        assert!(!log.has_transition(&"a.x".to_string(), "status", "pending", "validated"));
    }
}
