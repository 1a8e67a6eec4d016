//! Output sinks for renderers.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use workspacebuilder_shared::{Result, WorkspaceBuilderError};

/// Where renderers send their output.
pub trait Outputter: Send + Sync {
    /// Write `content` to the relative path `name` under the output root.
    /// Returns the final path.
    fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf>;

    /// Write text to standard output.
    fn write_stdout(&self, text: &str) -> Result<()>;
}

/// Check that `name` stays inside the output root.
pub fn validate_relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.trim().is_empty() {
        return Err(WorkspaceBuilderError::validation("output path is empty"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(WorkspaceBuilderError::validation(format!(
                    "output path '{name}' must not contain '..'"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceBuilderError::validation(format!(
                    "output path '{name}' must be relative"
                )));
            }
        }
    }
    Ok(path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Directory outputter
// ---------------------------------------------------------------------------

/// Writes files under a root directory and text to the process stdout.
///
/// Every file is written to a temp sibling and renamed into place, so a
/// reader never sees a partially written file.
#[derive(Debug, Clone)]
pub struct DirectoryOutputter {
    root: PathBuf,
}

impl DirectoryOutputter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Outputter for DirectoryOutputter {
    fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let relative = validate_relative(name)?;
        let target = self.root.join(&relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WorkspaceBuilderError::io(parent, e))?;
        }

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| WorkspaceBuilderError::validation(format!("invalid file name '{name}'")))?;
        let temp = target.with_file_name(format!(".{file_name}.tmp"));

        let written = std::fs::write(&temp, content)
            .map_err(|e| WorkspaceBuilderError::io(&temp, e))
            .and_then(|()| {
                std::fs::rename(&temp, &target).map_err(|e| WorkspaceBuilderError::io(&target, e))
            });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }

        tracing::debug!(path = %target.display(), bytes = content.len(), "output written");
        Ok(target)
    }

    fn write_stdout(&self, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| WorkspaceBuilderError::io("<stdout>", e))
    }
}

// ---------------------------------------------------------------------------
// In-memory outputter
// ---------------------------------------------------------------------------

/// Collects output in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryOutputter {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    stdout: Mutex<String>,
}

impl MemoryOutputter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(Path::new(name))
            .cloned()
    }

    pub fn file_names(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Outputter for MemoryOutputter {
    fn write_file(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let relative = validate_relative(name)?;
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(relative.clone(), content.to_vec());
        Ok(relative)
    }

    fn write_stdout(&self, text: &str) -> Result<()> {
        self.stdout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("wb_out_{}", uuid::Uuid::now_v7()))
    }

    fn all_files(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                out.extend(all_files(&path));
            } else {
                out.push(path);
            }
        }
        out
    }

    #[test]
    fn writes_under_root_without_temp_leftovers() {
        let root = temp_root();
        let out = DirectoryOutputter::new(&root);

        let path = out
            .write_file("workspaces/ops/workspace.yaml", b"name: ops\n")
            .unwrap();
        assert_eq!(path, root.join("workspaces/ops/workspace.yaml"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name: ops\n");

        // Overwrite keeps a single final file.
        out.write_file("workspaces/ops/workspace.yaml", b"name: ops2\n")
            .unwrap();
        let files = all_files(&root);
        assert_eq!(files.len(), 1);
        assert!(files.iter().all(|f| !f.to_string_lossy().ends_with(".tmp")));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn rejects_escaping_paths() {
        let root = temp_root();
        let out = DirectoryOutputter::new(&root);

        assert!(out.write_file("../escape.yaml", b"x").is_err());
        assert!(out.write_file("a/../../escape.yaml", b"x").is_err());
        assert!(out.write_file("/etc/passwd", b"x").is_err());
        assert!(out.write_file("", b"x").is_err());
        assert!(!root.exists());
    }

    #[test]
    fn failed_rename_removes_temp_file() {
        let root = temp_root();
        // A non-empty directory where the file should go makes the rename fail.
        std::fs::create_dir_all(root.join("out.yaml")).unwrap();
        std::fs::write(root.join("out.yaml/keep"), b"x").unwrap();

        let out = DirectoryOutputter::new(&root);
        assert!(out.write_file("out.yaml", b"a: 1").is_err());
        assert!(!root.join(".out.yaml.tmp").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn memory_outputter_collects() {
        let out = MemoryOutputter::new();
        out.write_file("dump.yaml", b"a: 1").unwrap();
        out.write_stdout("ops: shop\n").unwrap();
        out.write_stdout("ops: billing\n").unwrap();

        assert_eq!(out.file("dump.yaml").unwrap(), b"a: 1");
        assert_eq!(out.stdout(), "ops: shop\nops: billing\n");
        assert!(out.write_file("../x", b"").is_err());
    }
}
