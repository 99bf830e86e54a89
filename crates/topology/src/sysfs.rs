//! Sysfs path joining and reading (§4.2). Every path is relative to a reader's
//! root, which defaults to `/sys` but can be overridden for testing or for
//! containerized environments that bind-mount a different sysfs.

use std::fs;
use std::path::{Path, PathBuf};

use crate::env_vars;

/// Default sysfs mount point, overridable by `LIBTOPOLOGY_SYSFS_ROOT` (§6).
const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Name of the override environment variable (§6).
pub const SYSFS_ROOT_VAR: &str = "LIBTOPOLOGY_SYSFS_ROOT";

/// Joins paths under a sysfs root and performs whole-file reads and directory
/// enumeration. Missing files or directories are reported through `Option`/
/// empty iterators rather than an error; callers decide whether that's fatal
/// (§4.2, §7 — cache discovery treats a missing attribute as "abandon this
/// cache", the builder treats a missing CPU directory as `BuildError`).
#[derive(Clone, Debug)]
pub struct SysfsReader {
    root: PathBuf,
}

impl SysfsReader {
    /// Builds a reader rooted at `LIBTOPOLOGY_SYSFS_ROOT` if set, else `/sys`.
    pub fn from_env() -> Self {
        let root = env_vars::var(SYSFS_ROOT_VAR).unwrap_or_else(|| DEFAULT_SYSFS_ROOT.to_owned());
        Self::new(root)
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `relative` onto the reader's root.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Reads a whole file, trimming a single trailing newline if present.
    /// Returns `None` if the file (or any component of its path) is absent;
    /// other I/O errors (permission denied, not a file) propagate, since
    /// those indicate something more specific than "this sysfs node doesn't
    /// exist here".
    pub fn read_attr(&self, relative: impl AsRef<Path>) -> std::io::Result<Option<String>> {
        match fs::read_to_string(self.path(relative)) {
            Ok(contents) => Ok(Some(trim_trailing_newline(contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Enumerates entries directly under `relative` whose name is `prefix`
    /// followed by a non-negative decimal integer, returning `(id, full_path)`
    /// pairs. Entries are accepted when their type is a directory or
    /// unreported (`file_type()` failing is treated as "unknown", matching
    /// filesystems that don't report `d_type`). Returns an empty vector if
    /// `relative` doesn't exist.
    pub fn list_numbered(&self, relative: impl AsRef<Path>, prefix: &str) -> std::io::Result<Vec<(usize, PathBuf)>> {
        let dir = self.path(relative);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let is_dir_or_unknown = entry
                .file_type()
                .map(|ty| ty.is_dir())
                .unwrap_or(true);
            if !is_dir_or_unknown {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(suffix) = name.strip_prefix(prefix) else { continue };
            if let Ok(id) = suffix.parse::<usize>() {
                out.push((id, entry.path()));
            }
        }
        Ok(out)
    }
}

fn trim_trailing_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_root() -> tempfile::TempDir {
        tempfile::tempdir().expect("create tempdir")
    }

    #[test]
    fn read_attr_strips_trailing_newline() {
        let root = fake_root();
        std::fs::write(root.path().join("online"), "1\n").unwrap();
        let reader = SysfsReader::new(root.path());
        assert_eq!(reader.read_attr("online").unwrap(), Some("1".to_owned()));
    }

    #[test]
    fn read_attr_missing_file_is_none() {
        let root = fake_root();
        let reader = SysfsReader::new(root.path());
        assert_eq!(reader.read_attr("nonexistent").unwrap(), None);
    }

    #[test]
    fn list_numbered_filters_prefix_and_suffix() {
        let root = fake_root();
        std::fs::create_dir(root.path().join("cpu0")).unwrap();
        std::fs::create_dir(root.path().join("cpu12")).unwrap();
        std::fs::create_dir(root.path().join("cpufreq")).unwrap();
        std::fs::write(root.path().join("cpu0x"), "not a dir, not numeric").unwrap();
        let reader = SysfsReader::new(root.path());
        let mut found = reader.list_numbered(".", "cpu").unwrap();
        found.sort_by_key(|(id, _)| *id);
        let ids: Vec<usize> = found.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 12]);
    }

    /// A regular file whose name would otherwise pass the prefix+numeric
    /// filter must still be rejected: `is_dir_or_unknown` excludes entries
    /// that are positively known to be a non-directory, not just entries
    /// that fail the name filter.
    #[test]
    fn list_numbered_rejects_regular_file_with_numeric_suffix() {
        let root = fake_root();
        std::fs::create_dir(root.path().join("cpu0")).unwrap();
        std::fs::write(root.path().join("cpu5"), "regular file, not a directory").unwrap();
        let reader = SysfsReader::new(root.path());
        let ids: Vec<usize> = reader.list_numbered(".", "cpu").unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0], "cpu5 is a plain file and must be excluded");
    }

    #[test]
    fn list_numbered_missing_dir_is_empty() {
        let root = fake_root();
        let reader = SysfsReader::new(root.path());
        assert_eq!(reader.list_numbered("devices/system/node", "node").unwrap(), Vec::new());
    }
}
