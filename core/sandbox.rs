use crate::error::{AppError, Result};
use log;
use std::path::{Component, Path, PathBuf};

/// Keeps every resolved path inside one canonical project root.
#[derive(Debug, Clone)]
pub struct SandboxGuard {
    root: PathBuf,
}

impl SandboxGuard {
    pub fn new(project_root: &Path) -> Result<Self> {
        let root = project_root
            .canonicalize()
            .map_err(|e| AppError::ProjectNotFound {
                path: project_root.to_path_buf(),
                reason: e.to_string(),
            })?;
        if !root.is_dir() {
            return Err(AppError::ProjectNotFound {
                path: project_root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative_path` against the root, failing closed on anything
    /// that leaves it: absolute input, `..` above the root, symlinks whose
    /// target lies outside, or targets that cannot be canonicalized.
    ///
    /// A path that does not exist yet is checked through its nearest existing
    /// ancestor, so a missing file under a symlinked directory is still
    /// judged by where that directory really points.
    pub fn resolve(&self, relative_path: &Path) -> Result<PathBuf> {
        let normalized = normalize_relative(relative_path).ok_or_else(|| {
            log::debug!("Rejected path escaping root: {}", relative_path.display());
            traversal(relative_path)
        })?;

        // symlink_metadata does not follow links, so dangling links still count as present
        let mut existing = normalized.as_path();
        while !existing.as_os_str().is_empty()
            && self.root.join(existing).symlink_metadata().is_err()
        {
            existing = existing.parent().unwrap_or(Path::new(""));
        }
        let missing = normalized.strip_prefix(existing).unwrap_or(Path::new(""));
        let anchor = self.root.join(existing);

        let canonical = anchor.canonicalize().map_err(|e| {
            log::debug!(
                "Could not canonicalize {}: {}, rejecting",
                anchor.display(),
                e
            );
            traversal(relative_path)
        })?;
        if !canonical.starts_with(&self.root) {
            log::debug!(
                "Path {} resolves to {} outside root {}",
                relative_path.display(),
                canonical.display(),
                self.root.display()
            );
            return Err(traversal(relative_path));
        }
        if missing.as_os_str().is_empty() {
            Ok(canonical)
        } else {
            Ok(canonical.join(missing))
        }
    }

    pub fn contains(&self, relative_path: &Path) -> bool {
        self.resolve(relative_path).is_ok()
    }
}

fn traversal(path: &Path) -> AppError {
    AppError::Traversal {
        path: path.to_string_lossy().into_owned(),
    }
}

/// Collapses `.` and `..` lexically. `None` if the path is absolute or
/// climbs above its starting point.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SandboxGuard) {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(project.join("src")).unwrap();
        fs::write(project.join("src/app.ts"), "export {}").unwrap();
        fs::write(temp_dir.path().join("outside.txt"), "secret").unwrap();
        let guard = SandboxGuard::new(&project).unwrap();
        (temp_dir, guard)
    }

    #[test]
    fn test_resolve_inside_root() {
        let (_tmp, guard) = setup();
        let resolved = guard.resolve(Path::new("src/app.ts")).unwrap();
        assert!(resolved.starts_with(guard.root()));
        assert!(resolved.ends_with("src/app.ts"));
    }

    #[test]
    fn test_resolve_collapses_dot_segments() {
        let (_tmp, guard) = setup();
        let resolved = guard.resolve(Path::new("./src/../src/app.ts")).unwrap();
        assert!(resolved.ends_with("src/app.ts"));
    }

    #[test]
    fn test_resolve_rejects_parent_escape() {
        let (_tmp, guard) = setup();
        let err = guard.resolve(Path::new("../outside.txt")).unwrap_err();
        assert!(matches!(err, AppError::Traversal { .. }));
        assert!(!guard.contains(Path::new("src/../../outside.txt")));
    }

    #[test]
    fn test_resolve_rejects_absolute_path() {
        let (tmp, guard) = setup();
        let absolute = tmp.path().join("outside.txt");
        assert!(matches!(
            guard.resolve(&absolute),
            Err(AppError::Traversal { .. })
        ));
    }

    #[test]
    fn test_missing_target_inside_root_is_allowed() {
        let (_tmp, guard) = setup();
        let resolved = guard.resolve(Path::new("src/new_file.ts")).unwrap();
        assert_eq!(resolved, guard.root().join("src/new_file.ts"));
        let nested = guard.resolve(Path::new("docs/guide/intro.md")).unwrap();
        assert_eq!(nested, guard.root().join("docs/guide/intro.md"));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_target_under_escaping_symlink_is_rejected() {
        let (tmp, guard) = setup();
        fs::create_dir_all(tmp.path().join("outside")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("outside"), guard.root().join("out")).unwrap();
        assert!(matches!(
            guard.resolve(Path::new("out/new.txt")),
            Err(AppError::Traversal { .. })
        ));
        assert!(!guard.contains(Path::new("out/deeper/new.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_target_under_inner_symlink_is_allowed() {
        let (_tmp, guard) = setup();
        std::os::unix::fs::symlink(guard.root().join("src"), guard.root().join("alias")).unwrap();
        let resolved = guard.resolve(Path::new("alias/new.ts")).unwrap();
        assert_eq!(resolved, guard.root().join("src/new.ts"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_to_outside() {
        let (tmp, guard) = setup();
        std::os::unix::fs::symlink(
            tmp.path().join("outside.txt"),
            guard.root().join("src/link.txt"),
        )
        .unwrap();
        assert!(matches!(
            guard.resolve(Path::new("src/link.txt")),
            Err(AppError::Traversal { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_dangling_symlink() {
        let (_tmp, guard) = setup();
        std::os::unix::fs::symlink("/nonexistent/target", guard.root().join("src/dangling")).unwrap();
        assert!(guard.resolve(Path::new("src/dangling")).is_err());
    }

    #[test]
    fn test_missing_root_is_project_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let err = SandboxGuard::new(&temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound { .. }));
    }
}
