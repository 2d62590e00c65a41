//! Schema-versioned, atomically-written file persistence.
//!
//! Every artifact is tagged with a `"<namespace>.<kind>.vN"` schema version
//! string and written via a write-to-tmp, then rename-into-place durability
//! pattern. The pheromone store (in the `stigmergy` crate) builds its
//! per-map files on top of this.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors from the persistence layer. Distinct from the pheromone store's
/// own `StoreError` (lock/transition violations), which lives in the
/// `stigmergy` crate and wraps these.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize value for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize value from {path}: {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("schema version mismatch at {path}: found {found}, require at least {minimum}")]
    SchemaVersion {
        path: PathBuf,
        found: u32,
        minimum: u32,
    },
    #[error("malformed schema version string: {0}")]
    MalformedSchemaVersion(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

/// A parsed `"<namespace>.<kind>.vN"` schema version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub version: u32,
}

impl SchemaVersion {
    /// Parse a string like `"stigmergy.tasks.v1"`, extracting the trailing
    /// `vN` component.
    pub fn parse(s: &str) -> Result<Self> {
        let version_part = s
            .rsplit('.')
            .next()
            .ok_or_else(|| PersistError::MalformedSchemaVersion(s.to_string()))?;
        let digits = version_part
            .strip_prefix('v')
            .ok_or_else(|| PersistError::MalformedSchemaVersion(s.to_string()))?;
        let version: u32 = digits
            .parse()
            .map_err(|_| PersistError::MalformedSchemaVersion(s.to_string()))?;
        Ok(Self { version })
    }

    pub fn is_supported(&self, minimum: u32) -> bool {
        self.version >= minimum
    }

    pub fn to_version_string(&self, prefix: &str) -> String {
        format!("{prefix}.v{}", self.version)
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.version)
    }
}

/// Validate that `found` (a full `"<namespace>.<kind>.vN"` string) names a
/// schema at least `minimum`.
pub fn validate_schema_version(path: &Path, found: &str, minimum: u32) -> Result<()> {
    let parsed = SchemaVersion::parse(found)?;
    if !parsed.is_supported(minimum) {
        return Err(PersistError::SchemaVersion {
            path: path.to_path_buf(),
            found: parsed.version,
            minimum,
        });
    }
    Ok(())
}

/// Durable file storage rooted at a state directory. Every write goes
/// through a temp file in the same directory followed by a rename, so a
/// crash mid-write never leaves a half-written file visible at the real
/// path.
#[derive(Debug, Clone)]
pub struct FileStore {
    state_dir: PathBuf,
}

impl FileStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.state_dir.join(relative)
    }

    /// Write raw bytes atomically to `relative` under the state directory.
    pub fn write_file(&self, relative: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.state_dir).map_err(|source| PersistError::Io {
            path: self.state_dir.clone(),
            source,
        })?;

        let target = self.resolve(relative);
        let tmp_path = target.with_extension(format!(
            "{}.tmp",
            target
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("tmp")
        ));

        {
            let mut tmp = fs::File::create(&tmp_path).map_err(|source| PersistError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            tmp.write_all(contents).map_err(|source| PersistError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            tmp.sync_all().map_err(|source| PersistError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        }

        fs::rename(&tmp_path, &target).map_err(|source| PersistError::Io {
            path: target.clone(),
            source,
        })?;
        Ok(())
    }

    pub fn read_file(&self, relative: &str) -> Result<Vec<u8>> {
        let target = self.resolve(relative);
        fs::read(&target).map_err(|source| PersistError::Io {
            path: target,
            source,
        })
    }

    pub fn file_exists(&self, relative: &str) -> bool {
        self.resolve(relative).exists()
    }

    pub fn delete_file(&self, relative: &str) -> Result<()> {
        let target = self.resolve(relative);
        if !target.exists() {
            return Ok(());
        }
        fs::remove_file(&target).map_err(|source| PersistError::Io {
            path: target,
            source,
        })
    }

    pub fn list_files(&self) -> Result<Vec<String>> {
        if !self.state_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.state_dir).map_err(|source| PersistError::Io {
            path: self.state_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| PersistError::Io {
                path: self.state_dir.clone(),
                source,
            })?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Serialize `value` as pretty JSON and write it atomically.
    pub fn save_json<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        let target = self.resolve(relative);
        let json = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Serialize {
            path: target.clone(),
            source,
        })?;
        self.write_file(relative, &json)
    }

    pub fn load_json<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let bytes = self.read_file(relative)?;
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Deserialize {
            path: self.resolve(relative),
            source,
        })
    }

    /// Append one line of JSON to `relative`, creating it if necessary.
    /// Append-only files (the audit log, tick timeseries) use this instead
    /// of `save_json` since they're never rewritten wholesale.
    pub fn append_json_line<T: Serialize>(&self, relative: &str, value: &T) -> Result<()> {
        use std::io::Write as _;

        fs::create_dir_all(&self.state_dir).map_err(|source| PersistError::Io {
            path: self.state_dir.clone(),
            source,
        })?;
        let target = self.resolve(relative);
        let line = serde_json::to_string(value).map_err(|source| PersistError::Serialize {
            path: target.clone(),
            source,
        })?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|source| PersistError::Io {
                path: target.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| PersistError::Io {
            path: target,
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        n: u32,
    }

    #[test]
    fn schema_version_parses_and_supports() {
        let v = SchemaVersion::parse("stigmergy.tasks.v2").expect("parse");
        assert_eq!(v.version, 2);
        assert!(v.is_supported(1));
        assert!(v.is_supported(2));
        assert!(!v.is_supported(3));
        assert_eq!(v.to_version_string("stigmergy.tasks"), "stigmergy.tasks.v2");
    }

    #[test]
    fn schema_version_rejects_malformed() {
        assert!(SchemaVersion::parse("nope").is_err());
        assert!(SchemaVersion::parse("stigmergy.tasks.2").is_err());
    }

    #[test]
    fn validate_schema_version_errors_below_minimum() {
        let path = Path::new("tasks.json");
        assert!(validate_schema_version(path, "stigmergy.tasks.v1", 2).is_err());
        assert!(validate_schema_version(path, "stigmergy.tasks.v2", 2).is_ok());
    }

    #[test]
    fn write_and_read_roundtrip() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(td.path());
        let sample = Sample { n: 7 };
        store.save_json("sample.json", &sample).expect("save");
        let loaded: Sample = store.load_json("sample.json").expect("load");
        assert_eq!(loaded, sample);
    }

    #[test]
    fn write_leaves_no_tmp_file_behind() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(td.path());
        store.save_json("sample.json", &Sample { n: 1 }).expect("save");
        let files = store.list_files().expect("list");
        assert!(files.contains(&"sample.json".to_string()));
        assert!(!files.iter().any(|f| f.ends_with(".tmp")));
    }

    #[test]
    fn file_exists_and_delete() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(td.path());
        assert!(!store.file_exists("sample.json"));
        store.save_json("sample.json", &Sample { n: 1 }).expect("save");
        assert!(store.file_exists("sample.json"));
        store.delete_file("sample.json").expect("delete");
        assert!(!store.file_exists("sample.json"));
    }

    #[test]
    fn append_json_line_accumulates() {
        let td = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(td.path());
        store.append_json_line("ticks.jsonl", &Sample { n: 1 }).expect("append 1");
        store.append_json_line("ticks.jsonl", &Sample { n: 2 }).expect("append 2");
        let bytes = store.read_file("ticks.jsonl").expect("read");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text.lines().count(), 2);
    }
}
