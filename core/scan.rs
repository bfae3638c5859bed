use crate::cancel::CancelToken;
use crate::config::DEFAULT_CONFIG_DIR;
use crate::context::Warning;
use crate::error::{AppError, Result};
use crate::output_formats::get_builtin_defaults;
use ignore::{DirEntry, WalkBuilder, WalkState};
use log;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub byte_size: u64,
}

impl CandidateFile {
    /// Relative path with `/` separators on every platform.
    pub fn display_path(&self) -> String {
        to_slash_path(&self.relative_path)
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Skip paths listed in `.gitignore`/`.ignore` files. Off unless asked for;
    /// selection is otherwise left to the context rules.
    pub use_gitignore: bool,
    /// Directory names skipped wherever they appear.
    pub always_ignore: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            use_gitignore: false,
            always_ignore: get_builtin_defaults().always_ignore.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub candidates: Vec<CandidateFile>,
    pub warnings: Vec<Warning>,
}

enum ScanEvent {
    Candidate(CandidateFile),
    Warning(Warning),
}

pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lists every regular file under `project_root`, honoring gitignore when
/// asked. Symlinked files count only if their target stays inside the root;
/// symlinked directories are never entered.
pub fn scan(project_root: &Path, options: &ScanOptions, cancel: &CancelToken) -> Result<ScanOutcome> {
    let root = project_root.canonicalize().map_err(|e| AppError::ProjectNotFound {
        path: project_root.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::read_dir(&root).map_err(|e| AppError::FileRead {
        path: root.clone(),
        source: e,
    })?;
    cancel.check()?;

    let mut ignored_dirs: HashSet<String> = options.always_ignore.iter().cloned().collect();
    ignored_dirs.insert(DEFAULT_CONFIG_DIR.to_string());
    let ignored_dirs = Arc::new(ignored_dirs);

    let mut builder = WalkBuilder::new(&root);
    builder.threads(rayon::current_num_threads().min(12));
    builder.hidden(false);
    builder.follow_links(false);
    builder.parents(false);
    builder.ignore(options.use_gitignore);
    builder.git_ignore(options.use_gitignore);
    builder.git_exclude(options.use_gitignore);
    builder.git_global(false);
    builder.require_git(false);
    log::debug!(
        "WalkBuilder configured (gitignore: {}, always ignored: {:?})",
        options.use_gitignore,
        ignored_dirs
    );

    let walker = builder.build_parallel();
    let (tx, rx) = mpsc::channel::<ScanEvent>();

    log::info!("Scanning project directory: {}", root.display());
    walker.run(|| {
        let tx = tx.clone();
        let root = root.clone();
        let ignored_dirs = Arc::clone(&ignored_dirs);
        let cancel = cancel.clone();

        Box::new(move |entry_result| {
            if cancel.is_cancelled() {
                return WalkState::Quit;
            }
            let event = match entry_result {
                Ok(entry) => {
                    if entry.depth() == 0 {
                        return WalkState::Continue;
                    }
                    match visit_entry(&entry, &root, &ignored_dirs) {
                        Visit::Skip => return WalkState::Skip,
                        Visit::Nothing => return WalkState::Continue,
                        Visit::Emit(event) => event,
                    }
                }
                Err(e) => {
                    log::warn!("Error walking directory: {}", e);
                    ScanEvent::Warning(Warning::new(format!("walk error: {}", e)))
                }
            };
            if tx.send(event).is_err() {
                log::error!("Receiver dropped for scan events, stopping walk early.");
                return WalkState::Quit;
            }
            WalkState::Continue
        })
    });
    drop(tx);

    let mut outcome = ScanOutcome::default();
    for event in rx {
        match event {
            ScanEvent::Candidate(candidate) => outcome.candidates.push(candidate),
            ScanEvent::Warning(warning) => outcome.warnings.push(warning),
        }
    }
    cancel.check()?;

    outcome.candidates.sort_by_cached_key(|c| c.display_path());
    outcome
        .warnings
        .sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));
    log::info!(
        "Scan complete. Found {} candidate files ({} warnings).",
        outcome.candidates.len(),
        outcome.warnings.len()
    );
    Ok(outcome)
}

enum Visit {
    Skip,
    Nothing,
    Emit(ScanEvent),
}

fn visit_entry(entry: &DirEntry, root: &Path, ignored_dirs: &HashSet<String>) -> Visit {
    let path = entry.path();
    let Some(relative_path) = pathdiff::diff_paths(path, root) else {
        log::warn!("Could not get relative path for: {}", path.display());
        return Visit::Nothing;
    };
    let Some(file_type) = entry.file_type() else {
        return Visit::Nothing;
    };

    if file_type.is_dir() {
        let name = entry.file_name().to_string_lossy();
        if ignored_dirs.contains(name.as_ref()) {
            log::trace!("Skipping always-ignored directory: {}", relative_path.display());
            return Visit::Skip;
        }
        return Visit::Nothing;
    }

    if file_type.is_symlink() {
        return visit_symlink(path, root, relative_path);
    }

    if !file_type.is_file() {
        log::trace!("Skipping special file: {}", relative_path.display());
        return Visit::Nothing;
    }

    match entry.metadata() {
        Ok(meta) => {
            log::trace!("Candidate: {}", relative_path.display());
            Visit::Emit(ScanEvent::Candidate(CandidateFile {
                relative_path,
                absolute_path: path.to_path_buf(),
                byte_size: meta.len(),
            }))
        }
        Err(e) => Visit::Emit(ScanEvent::Warning(Warning::for_path(
            to_slash_path(&relative_path),
            format!("could not stat file: {}", e),
        ))),
    }
}

fn visit_symlink(path: &Path, root: &Path, relative_path: PathBuf) -> Visit {
    let display = to_slash_path(&relative_path);
    let target = match path.canonicalize() {
        Ok(target) => target,
        Err(e) => {
            log::warn!("Dangling symlink {}: {}", display, e);
            return Visit::Emit(ScanEvent::Warning(Warning::for_path(
                display,
                format!("broken symlink: {}", e),
            )));
        }
    };
    if !target.starts_with(root) {
        log::warn!(
            "Symlink {} points outside the project root ({}), skipping",
            display,
            target.display()
        );
        return Visit::Emit(ScanEvent::Warning(Warning::for_path(
            display,
            "symlink target is outside the project root",
        )));
    }
    match fs::metadata(&target) {
        Ok(meta) if meta.is_file() => Visit::Emit(ScanEvent::Candidate(CandidateFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            byte_size: meta.len(),
        })),
        Ok(_) => {
            log::trace!("Not following directory symlink: {}", display);
            Visit::Nothing
        }
        Err(e) => Visit::Emit(ScanEvent::Warning(Warning::for_path(
            display,
            format!("could not stat symlink target: {}", e),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(outcome: &ScanOutcome) -> Vec<String> {
        outcome.candidates.iter().map(|c| c.display_path()).collect()
    }

    #[test]
    fn test_scan_lists_files_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, "src/b.ts", "b");
        write(root, "src/a.ts", "a");
        write(root, "README.md", "# hi");
        write(root, ".env", "KEY=1");

        let outcome = scan(root, &ScanOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(paths(&outcome), vec![".env", "README.md", "src/a.ts", "src/b.ts"]);
        assert_eq!(outcome.candidates[1].byte_size, 4);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_scan_skips_always_ignored_and_config_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, ".git/HEAD", "ref");
        write(root, ".chatctx/contexts/app.toml", "include = []");
        write(root, "nested/.git/config", "x");
        write(root, "keep.txt", "k");

        let outcome = scan(root, &ScanOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(paths(&outcome), vec!["keep.txt"]);
    }

    #[test]
    fn test_scan_honors_gitignore_toggle() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, ".gitignore", "node_modules/\n");
        write(root, "node_modules/lib/index.js", "x");
        write(root, "index.js", "y");

        let outcome = scan(root, &ScanOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(
            paths(&outcome),
            vec![".gitignore", "index.js", "node_modules/lib/index.js"]
        );

        let options = ScanOptions {
            use_gitignore: true,
            ..ScanOptions::default()
        };
        let outcome = scan(root, &options, &CancelToken::new()).unwrap();
        assert_eq!(paths(&outcome), vec![".gitignore", "index.js"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_warns_on_symlink_outside_root() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        write(&project, "src/app.ts", "a");
        write(temp_dir.path(), "outside.txt", "secret");
        std::os::unix::fs::symlink(temp_dir.path().join("outside.txt"), project.join("leak.txt"))
            .unwrap();
        std::os::unix::fs::symlink(project.join("src/app.ts"), project.join("alias.ts")).unwrap();

        let outcome = scan(&project, &ScanOptions::default(), &CancelToken::new()).unwrap();
        assert_eq!(paths(&outcome), vec!["alias.ts", "src/app.ts"]);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].path.as_deref(), Some("leak.txt"));
    }

    #[test]
    fn test_scan_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", "a");
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = scan(temp_dir.path(), &ScanOptions::default(), &cancel).unwrap_err();
        assert!(matches!(err, AppError::Cancelled(_)));
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let err = scan(
            &temp_dir.path().join("nope"),
            &ScanOptions::default(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ProjectNotFound { .. }));
    }
}
