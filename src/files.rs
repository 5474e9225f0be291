//! Sandboxed filesystem access for the file tools
//!
//! Every path is resolved to a canonical absolute path and must fall
//! inside one of the configured allowed directories.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{GatewayError, Result};
use crate::types::{DirectoryEntry, EntryKind, FileInfo, ListDirectoryResult, SearchFilesResult};

/// Upper bound on matches returned by one search
pub const MAX_SEARCH_RESULTS: usize = 1000;

/// Read-only view of the allowed directories
#[derive(Debug, Clone)]
pub struct FileSandbox {
    allowed: Vec<PathBuf>,
}

impl FileSandbox {
    pub fn new(allowed: Vec<PathBuf>) -> Self {
        Self { allowed }
    }

    /// Resolve a requested path and check it against the allowed directories
    pub fn resolve(&self, requested: &str) -> Result<PathBuf> {
        if self.allowed.is_empty() {
            return Err(GatewayError::AccessDenied(
                "no allowed directories are configured".to_string(),
            ));
        }
        if requested.trim().is_empty() {
            return Err(GatewayError::InvalidParams("path must not be empty".into()));
        }

        let expanded = PathBuf::from(shellexpand::tilde(requested).as_ref());
        let absolute = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };
        let absolute = normalize_lexically(&absolute);

        let resolved = match fs::canonicalize(&absolute) {
            Ok(real) => real,
            // Target may not exist yet; the parent must, and must be inside the sandbox
            Err(_) => {
                let parent = absolute.parent().ok_or_else(|| {
                    GatewayError::AccessDenied(format!("{} has no parent", absolute.display()))
                })?;
                let name = absolute.file_name().ok_or_else(|| {
                    GatewayError::InvalidParams(format!("{} has no file name", absolute.display()))
                })?;
                fs::canonicalize(parent)
                    .map_err(|_| {
                        GatewayError::AccessDenied(format!(
                            "parent directory does not exist: {}",
                            parent.display()
                        ))
                    })?
                    .join(name)
            }
        };

        if self.allowed.iter().any(|dir| resolved.starts_with(dir)) {
            Ok(resolved)
        } else {
            Err(GatewayError::AccessDenied(format!(
                "path outside allowed directories: {}",
                requested
            )))
        }
    }

    /// List the direct children of a directory, sorted by name
    pub fn list_directory(&self, requested: &str) -> Result<ListDirectoryResult> {
        let dir = self.resolve(requested)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let kind = if entry.file_type()?.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirectoryEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
                path: entry.path().to_string_lossy().to_string(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ListDirectoryResult { entries })
    }

    /// Recursively find entries whose name contains `pattern` (case-insensitive)
    pub fn search_files(
        &self,
        requested: &str,
        pattern: &str,
        exclude_patterns: &[String],
    ) -> Result<SearchFilesResult> {
        self.search_with_limit(requested, pattern, exclude_patterns, MAX_SEARCH_RESULTS)
    }

    fn search_with_limit(
        &self,
        requested: &str,
        pattern: &str,
        exclude_patterns: &[String],
        limit: usize,
    ) -> Result<SearchFilesResult> {
        let root = self.resolve(requested)?;
        let needle = pattern.to_lowercase();
        let excludes = exclude_patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<Result<Vec<_>>>()?;

        // Excluded directories are pruned, not descended
        let walker = WalkDir::new(&root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(&root, entry.path(), &excludes));

        let mut matches = Vec::new();
        let mut truncated = false;
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.contains(&needle) {
                if matches.len() >= limit {
                    truncated = true;
                    break;
                }
                matches.push(entry.path().to_string_lossy().to_string());
            }
        }

        matches.sort();
        Ok(SearchFilesResult { matches, truncated })
    }

    /// Size, timestamps and permission bits of a path
    pub fn file_info(&self, requested: &str) -> Result<FileInfo> {
        let path = self.resolve(requested)?;
        let meta = fs::metadata(&path)?;
        Ok(FileInfo {
            size: meta.len(),
            created: meta.created().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            accessed: meta.accessed().ok().map(DateTime::<Utc>::from),
            is_directory: meta.is_dir(),
            is_file: meta.is_file(),
            permissions: permission_bits(&meta),
        })
    }
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(meta: &fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "444".to_string()
    } else {
        "666".to_string()
    }
}

fn is_excluded(root: &Path, path: &Path, excludes: &[Regex]) -> bool {
    let relative = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    excludes.iter().any(|re| re.is_match(&relative))
}

/// Collapse `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Compile a glob (`*`, `**`, `?`) into a regex matching a relative path
/// at any depth
pub fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut re = String::from("^(?:.*/)?");
    let mut chars = glob.trim_start_matches("./").chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    re.push_str("(?:.*/)?");
                } else {
                    re.push_str(".*");
                }
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push_str("(?:/.*)?$");
    Regex::new(&re).map_err(|e| GatewayError::InvalidParams(format!("bad exclude pattern: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, FileSandbox, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("docs/nested")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("docs/Report.md"), "# report").unwrap();
        fs::write(root.join("docs/nested/report-2.txt"), "two").unwrap();
        fs::write(root.join("node_modules/pkg/report.js"), "x").unwrap();
        fs::write(root.join("notes.txt"), "hello").unwrap();
        (dir, FileSandbox::new(vec![root.clone()]), root)
    }

    #[test]
    fn test_resolve_inside_and_outside() {
        let (_dir, s, root) = sandbox();
        let inside = root.join("notes.txt");
        assert_eq!(s.resolve(&inside.to_string_lossy()).unwrap(), inside);

        let escape = root.join("docs/../../");
        assert!(matches!(
            s.resolve(&escape.to_string_lossy()),
            Err(GatewayError::AccessDenied(_))
        ));
        assert!(matches!(
            s.resolve("/etc/passwd"),
            Err(GatewayError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_resolve_nonexistent_target_checks_parent() {
        let (_dir, s, root) = sandbox();
        let new_file = root.join("docs/new.md");
        assert_eq!(s.resolve(&new_file.to_string_lossy()).unwrap(), new_file);

        let orphan = root.join("missing/new.md");
        assert!(s.resolve(&orphan.to_string_lossy()).is_err());
    }

    #[test]
    fn test_empty_sandbox_denies_everything() {
        let s = FileSandbox::new(Vec::new());
        assert!(matches!(s.resolve("/tmp"), Err(GatewayError::AccessDenied(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_denied() {
        let (_dir, s, root) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        let link = root.join("escape");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        assert!(matches!(
            s.resolve(&link.to_string_lossy()),
            Err(GatewayError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_list_directory_sorted() {
        let (_dir, s, root) = sandbox();
        let listing = s.list_directory(&root.to_string_lossy()).unwrap();
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "node_modules", "notes.txt"]);
        assert_eq!(listing.entries[0].kind, EntryKind::Directory);
        assert_eq!(listing.entries[2].kind, EntryKind::File);
    }

    #[test]
    fn test_search_files_with_excludes() {
        let (_dir, s, root) = sandbox();
        let base = root.clone();
        let result = s
            .search_files(&base.to_string_lossy(), "REPORT", &["node_modules".to_string()])
            .unwrap();
        assert_eq!(
            result.matches,
            vec![
                base.join("docs/Report.md").to_string_lossy().to_string(),
                base.join("docs/nested/report-2.txt")
                    .to_string_lossy()
                    .to_string(),
            ]
        );

        let result = s
            .search_files(&base.to_string_lossy(), "report", &["**/*.txt".to_string()])
            .unwrap();
        assert_eq!(result.matches.len(), 2);
        assert!(result.matches.iter().all(|m| !m.ends_with(".txt")));
    }

    #[test]
    fn test_search_truncation_is_sorted_and_flagged() {
        let (_dir, s, root) = sandbox();
        let base = root.to_string_lossy().to_string();

        let all = s.search_files(&base, "report", &[]).unwrap();
        assert_eq!(all.matches.len(), 3);
        assert!(!all.truncated);

        let capped = s.search_with_limit(&base, "report", &[], 2).unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.matches.len(), 2);
        let mut sorted = capped.matches.clone();
        sorted.sort();
        assert_eq!(capped.matches, sorted);
    }

    #[cfg(unix)]
    #[test]
    fn test_search_does_not_follow_symlinked_dirs() {
        let (_dir, s, root) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("report-outside.md"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("linked")).unwrap();

        let result = s
            .search_files(&root.to_string_lossy(), "report", &[])
            .unwrap();
        assert!(result.matches.iter().all(|m| !m.contains("report-outside")));
    }

    #[test]
    fn test_file_info() {
        let (_dir, s, root) = sandbox();
        let info = s
            .file_info(&root.join("notes.txt").to_string_lossy())
            .unwrap();
        assert_eq!(info.size, 5);
        assert!(info.is_file);
        assert!(!info.is_directory);
        assert!(info.modified.is_some());
        assert_eq!(info.permissions.len(), 3);
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("*.log").unwrap();
        assert!(re.is_match("app.log"));
        assert!(re.is_match("logs/app.log"));
        assert!(!re.is_match("app.log.txt"));

        let re = glob_to_regex("target").unwrap();
        assert!(re.is_match("target"));
        assert!(re.is_match("target/debug/build"));
        assert!(!re.is_match("targets"));

        let re = glob_to_regex("src/**/gen").unwrap();
        assert!(re.is_match("src/gen"));
        assert!(re.is_match("src/a/b/gen"));
    }
}
