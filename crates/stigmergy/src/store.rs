//! The pheromone store (C3, §3.3-§3.4): three typed maps, a filtered query
//! API, atomic updates, and an audit trail of every write.
//!
//! A `FileStore` (from `stigmergy-store`) handles the atomic-write
//! mechanics; this module owns the domain-level CRUD, per-map locking, and
//! the audit-on-every-write discipline.
//!
//! Lock ordering is fixed at `tasks -> status -> quality -> audit` (§3.4);
//! every operation that needs more than one map acquires them in that
//! order, so two operations can never deadlock on each other.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use stigmergy_audit::AuditLog;
use stigmergy_store::FileStore;
use stigmergy_types::{
    AuditEvent, FileId, FileStatus, MapName, Operation, QualityEntry, Role, RunManifest,
    RunSummary, StatusEntry, TaskEntry, TickRow,
};

use crate::state_machine;

const SCHEMA_PREFIX: &str = "stigmergy";
const CURRENT_SCHEMA: u32 = 1;
const SCHEMA_FILE: &str = "schema.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lock for {0} map is already held")]
    LockViolation(MapName),
    #[error("illegal status transition for {file_id}: {source}")]
    TransitionInvalid {
        file_id: FileId,
        #[source]
        source: state_machine::TransitionError,
    },
    #[error("store corrupted: {0}")]
    StoreCorrupted(String),
    #[error("persistence error: {0}")]
    Persist(#[from] stigmergy_store::PersistError),
    #[error("no entry for {0} in {1}")]
    NotFound(FileId, MapName),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A presence-based exclusive lock on one map's on-disk file, scoped to a
/// single store operation: one lock per map rather than one lock per
/// whole run.
struct MapLockGuard {
    path: PathBuf,
}

impl MapLockGuard {
    fn acquire(lock_dir: &Path, map: MapName) -> Result<Self> {
        fs::create_dir_all(lock_dir).map_err(|e| {
            StoreError::StoreCorrupted(format!("failed to create lock dir: {e}"))
        })?;
        let path = lock_dir.join(format!("{}.lock", map.as_str()));
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::LockViolation(map))
            }
            Err(e) => Err(StoreError::StoreCorrupted(format!(
                "failed to acquire lock {}: {e}",
                path.display()
            ))),
        }
    }
}

impl Drop for MapLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Acquire locks for `maps` in canonical order (`tasks, status, quality`),
/// regardless of the order they're requested in, then audit last.
fn acquire_ordered(lock_dir: &Path, maps: &[MapName]) -> Result<Vec<MapLockGuard>> {
    let mut ordered: Vec<MapName> = maps.to_vec();
    ordered.sort();
    ordered.dedup();
    ordered
        .into_iter()
        .map(|m| MapLockGuard::acquire(lock_dir, m))
        .collect()
}

/// Generic filter operator applied to a query against one of the typed
/// maps (§3.4: "filtered query (eq/gt/gte/lt/lte/in)").
#[derive(Debug, Clone)]
pub enum QueryOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

#[derive(Debug, Clone)]
pub struct QueryFilter {
    pub field: String,
    pub op: QueryOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: QueryOp::Eq, value }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: QueryOp::Gt, value }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: QueryOp::Gte, value }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: QueryOp::Lt, value }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: QueryOp::Lte, value }
    }

    pub fn in_set(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self { field: field.into(), op: QueryOp::In, value: Value::Array(values) }
    }

    fn matches(&self, entry: &Value) -> bool {
        let Some(actual) = entry.get(&self.field) else {
            return false;
        };
        match self.op {
            QueryOp::Eq => actual == &self.value,
            QueryOp::In => self
                .value
                .as_array()
                .map(|arr| arr.contains(actual))
                .unwrap_or(false),
            QueryOp::Gt | QueryOp::Gte | QueryOp::Lt | QueryOp::Lte => {
                match (actual.as_f64(), self.value.as_f64()) {
                    (Some(a), Some(b)) => match self.op {
                        QueryOp::Gt => a > b,
                        QueryOp::Gte => a >= b,
                        QueryOp::Lt => a < b,
                        QueryOp::Lte => a <= b,
                        _ => unreachable!(),
                    },
                    _ => false,
                }
            }
        }
    }
}

fn diff_values(before: &Value, after: &Value) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut fields_changed = BTreeMap::new();
    let mut previous_values = BTreeMap::new();

    if let (Value::Object(before_map), Value::Object(after_map)) = (before, after) {
        for (key, after_val) in after_map {
            let before_val = before_map.get(key).cloned().unwrap_or(Value::Null);
            if &before_val != after_val {
                fields_changed.insert(key.clone(), after_val.clone());
                previous_values.insert(key.clone(), before_val);
            }
        }
    }

    (fields_changed, previous_values)
}

/// The three typed pheromone maps, kept in memory and periodically flushed
/// to disk, with every write also appended to the audit log.
pub struct PheromoneStore {
    state_dir: PathBuf,
    file_store: FileStore,
    tasks: BTreeMap<FileId, TaskEntry>,
    status: BTreeMap<FileId, StatusEntry>,
    quality: BTreeMap<FileId, QualityEntry>,
    audit: AuditLog,
}

impl PheromoneStore {
    /// Open (or initialize) a store rooted at `state_dir`, loading any
    /// existing maps and audit history.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let file_store = FileStore::new(state_dir);

        if file_store.file_exists(SCHEMA_FILE) {
            let versions: BTreeMap<String, String> = file_store.load_json(SCHEMA_FILE)?;
            for kind in ["tasks", "status", "quality"] {
                if let Some(found) = versions.get(kind) {
                    stigmergy_store::validate_schema_version(
                        &state_dir.join(format!("{kind}.json")),
                        found,
                        CURRENT_SCHEMA,
                    )?;
                }
            }
        }

        let tasks = load_or_default(&file_store, "tasks.json")?;
        let status = load_or_default(&file_store, "status.json")?;
        let quality = load_or_default(&file_store, "quality.json")?;
        let audit = AuditLog::read_from_file(&stigmergy_audit::audit_path(state_dir))
            .map_err(|e| StoreError::StoreCorrupted(e.to_string()))?;

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            file_store,
            tasks,
            status,
            quality,
            audit,
        })
    }

    fn lock_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    // ---- tasks -------------------------------------------------------

    pub fn get_task(&self, file_id: &str) -> Option<&TaskEntry> {
        self.tasks.get(file_id)
    }

    pub fn query_tasks(&self, filters: &[QueryFilter]) -> Vec<(&FileId, &TaskEntry)> {
        self.tasks
            .iter()
            .filter(|(_, entry)| {
                let value = serde_json::to_value(entry).unwrap_or(Value::Null);
                filters.iter().all(|f| f.matches(&value))
            })
            .collect()
    }

    /// Deposit a task pheromone: creates it if absent, or reinforces
    /// (overwrites) it if present. Either way the audit trail records
    /// exactly what changed.
    pub fn deposit_task(&mut self, file_id: &str, entry: TaskEntry, role: Role) -> Result<()> {
        let _locks = acquire_ordered(&self.lock_dir(), &[MapName::Tasks])?;

        let before = self
            .tasks
            .get(file_id)
            .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        let operation = if self.tasks.contains_key(file_id) {
            Operation::Update
        } else {
            Operation::Create
        };
        let after = serde_json::to_value(&entry).unwrap_or(Value::Null);
        self.tasks.insert(file_id.to_string(), entry);

        self.record_audit(MapName::Tasks, file_id, role, operation, &before, &after);
        Ok(())
    }

    // ---- status --------------------------------------------------------

    pub fn get_status(&self, file_id: &str) -> Option<&StatusEntry> {
        self.status.get(file_id)
    }

    pub fn query_status(&self, filters: &[QueryFilter]) -> Vec<(&FileId, &StatusEntry)> {
        self.status
            .iter()
            .filter(|(_, entry)| {
                let value = serde_json::to_value(entry).unwrap_or(Value::Null);
                filters.iter().all(|f| f.matches(&value))
            })
            .collect()
    }

    /// Create the initial status entry for a newly discovered file.
    pub fn create_status(&mut self, file_id: &str, entry: StatusEntry, role: Role) -> Result<()> {
        let _locks = acquire_ordered(&self.lock_dir(), &[MapName::Status])?;

        let before = Value::Null;
        let after = serde_json::to_value(&entry).unwrap_or(Value::Null);
        self.status.insert(file_id.to_string(), entry);
        self.record_audit(MapName::Status, file_id, role, Operation::Create, &before, &after);
        Ok(())
    }

    /// Apply `mutate` to the existing status entry, validating the status
    /// transition (if `status` changes) against the state machine, then
    /// recording a full before/after audit event.
    pub fn update_status<F>(&mut self, file_id: &str, role: Role, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut StatusEntry),
    {
        let _locks = acquire_ordered(&self.lock_dir(), &[MapName::Status])?;

        let Some(current) = self.status.get(file_id).cloned() else {
            return Err(StoreError::NotFound(file_id.to_string(), MapName::Status));
        };
        let before = serde_json::to_value(&current).unwrap_or(Value::Null);

        let mut updated = current.clone();
        mutate(&mut updated);

        if updated.status != current.status {
            state_machine::validate_transition(current.status, updated.status).map_err(|source| {
                StoreError::TransitionInvalid { file_id: file_id.to_string(), source }
            })?;
            updated.previous_status = Some(current.status);
        }

        let after = serde_json::to_value(&updated).unwrap_or(Value::Null);
        self.status.insert(file_id.to_string(), updated);
        self.record_audit(MapName::Status, file_id, role, Operation::Update, &before, &after);
        Ok(())
    }

    // ---- quality ---------------------------------------------------------

    pub fn get_quality(&self, file_id: &str) -> Option<&QualityEntry> {
        self.quality.get(file_id)
    }

    pub fn query_quality(&self, filters: &[QueryFilter]) -> Vec<(&FileId, &QualityEntry)> {
        self.quality
            .iter()
            .filter(|(_, entry)| {
                let value = serde_json::to_value(entry).unwrap_or(Value::Null);
                filters.iter().all(|f| f.matches(&value))
            })
            .collect()
    }

    pub fn deposit_quality(&mut self, file_id: &str, entry: QualityEntry, role: Role) -> Result<()> {
        let _locks = acquire_ordered(&self.lock_dir(), &[MapName::Quality])?;

        let before = self
            .quality
            .get(file_id)
            .map(|e| serde_json::to_value(e).unwrap_or(Value::Null))
            .unwrap_or(Value::Null);
        let operation = if self.quality.contains_key(file_id) {
            Operation::Update
        } else {
            Operation::Create
        };
        let after = serde_json::to_value(&entry).unwrap_or(Value::Null);
        self.quality.insert(file_id.to_string(), entry);
        self.record_audit(MapName::Quality, file_id, role, operation, &before, &after);
        Ok(())
    }

    // ---- whole-store views ------------------------------------------------

    pub fn all_status(&self) -> impl Iterator<Item = (&FileId, &StatusEntry)> {
        self.status.iter()
    }

    pub fn file_ids(&self) -> impl Iterator<Item = &FileId> {
        self.status.keys()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // ---- persistence -------------------------------------------------------

    /// Flush all three maps and the audit log to disk. Called once per
    /// tick by the orchestrator, after lock-scoped in-memory mutations
    /// complete (§4.6).
    pub fn persist(&mut self) -> Result<()> {
        let _locks =
            acquire_ordered(&self.lock_dir(), &[MapName::Tasks, MapName::Status, MapName::Quality])?;

        self.file_store.save_json("tasks.json", &self.tasks)?;
        self.file_store.save_json("status.json", &self.status)?;
        self.file_store.save_json("quality.json", &self.quality)?;

        let versions: BTreeMap<&str, String> = [
            ("tasks", schema_version_for("tasks")),
            ("status", schema_version_for("status")),
            ("quality", schema_version_for("quality")),
        ]
        .into_iter()
        .collect();
        self.file_store.save_json(SCHEMA_FILE, &versions)?;

        self.audit
            .write_to_file(&stigmergy_audit::audit_path(&self.state_dir))
            .map_err(|e| StoreError::StoreCorrupted(e.to_string()))?;
        self.audit.clear();

        Ok(())
    }

    // ---- per-run artifacts (§3.5) -----------------------------------------

    /// Write the immutable run manifest, once, at run start.
    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<()> {
        self.file_store
            .save_json(&format!("run_{}_manifest.json", manifest.run_id), manifest)?;
        Ok(())
    }

    /// Append one row to the per-tick timeseries.
    pub fn append_tick_row(&self, run_id: &str, row: &TickRow) -> Result<()> {
        self.file_store
            .append_json_line(&format!("run_{run_id}_ticks.jsonl"), row)?;
        Ok(())
    }

    /// Write the final run summary, once, when the orchestrator stops.
    pub fn write_summary(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        self.file_store
            .save_json(&format!("run_{run_id}_summary.json"), summary)?;
        Ok(())
    }

    fn record_audit(
        &mut self,
        map_name: MapName,
        file_id: &str,
        role: Role,
        operation: Operation,
        before: &Value,
        after: &Value,
    ) {
        let (fields_changed, previous_values) = diff_values(before, after);
        self.audit.record(AuditEvent {
            timestamp: Utc::now(),
            role,
            map_name,
            file_id: file_id.to_string(),
            operation,
            fields_changed,
            previous_values,
        });
    }
}

fn load_or_default<T>(file_store: &FileStore, relative: &str) -> Result<BTreeMap<FileId, T>>
where
    T: serde::de::DeserializeOwned,
{
    if file_store.file_exists(relative) {
        Ok(file_store.load_json(relative)?)
    } else {
        Ok(BTreeMap::new())
    }
}

/// Schema version string for a given map kind, e.g. `"stigmergy.tasks.v1"`.
pub fn schema_version_for(kind: &str) -> String {
    format!("{SCHEMA_PREFIX}.{kind}.v{CURRENT_SCHEMA}")
}
