//! Filesystem-backed `FileSource`/`ContentSource` implementations, the
//! concrete effectors the CLI wires in for `stigmergy::roles::discover`
//! and `stigmergy::roles::transform`.

use std::path::{Path, PathBuf};

use stigmergy::roles::transform::ContentSource;
use stigmergy_types::FileId;

/// Walk `root` and return every regular file as a `(repo-relative path,
/// content)` pair. Non-UTF8 files are skipped rather than erroring the
/// whole scan.
pub fn read_target_files(root: &Path) -> anyhow::Result<Vec<(FileId, String)>> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<(FileId, String)>) -> anyhow::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                continue;
            }
            walk(root, &path, out)?;
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            out.push((relative.to_string_lossy().to_string(), content));
        }
    }
    Ok(())
}

pub struct FsContentSource {
    pub root: PathBuf,
}

impl ContentSource for FsContentSource {
    fn load(&self, file_id: &str) -> anyhow::Result<String> {
        let path = self.root.join(file_id);
        Ok(std::fs::read_to_string(path)?)
    }
}
