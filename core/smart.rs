use crate::config::DEFAULT_CONFIG_DIR;
use crate::error::Result;
use crate::output_formats::get_builtin_defaults;
use crate::rules::PathRule;
use log;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use walkdir::WalkDir;

pub mod mapping;

const DETECTION_DEPTH: usize = 2;

const MARKER_FILENAMES: &[&str] = &[
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "Gemfile",
    "composer.json",
    "Makefile",
];

/// Looks at the top two levels of the project for marker files and
/// extensions. Unreadable entries are logged and skipped.
pub fn detect_project_characteristics(project_root: &Path) -> Result<HashSet<String>> {
    let mut characteristics = HashSet::new();
    log::debug!(
        "Detecting project characteristics in: {}",
        project_root.display()
    );
    let ignored = &get_builtin_defaults().always_ignore;
    let walker = WalkDir::new(project_root)
        .follow_links(false)
        .max_depth(DETECTION_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && (name == DEFAULT_CONFIG_DIR
                        || name == "node_modules"
                        || ignored.iter().any(|d| *d == name)))
        });

    for entry_result in walker {
        match entry_result {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                    if MARKER_FILENAMES.contains(&filename) {
                        log::trace!("Detected characteristic (filename): {}", filename);
                        characteristics.insert(filename.to_string());
                    }
                }
                if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
                    let lower_ext = extension.to_lowercase();
                    if characteristics.insert(lower_ext.clone()) {
                        log::trace!("Detected characteristic (extension): {}", lower_ext);
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "Error accessing path during characteristic detection: {} (at {})",
                    e,
                    e.path()
                        .map_or_else(|| "unknown path".into(), |p| p.display().to_string())
                );
            }
        }
    }
    log::debug!("Detected characteristics: {:?}", characteristics);
    Ok(characteristics)
}

/// Builtin defaults followed by the entry points of every detected
/// characteristic, deduplicated and in a stable order.
pub fn suggest_auto_include_rules(characteristics: &HashSet<String>) -> Result<Vec<PathRule>> {
    let mut seen = HashSet::new();
    let mut patterns: Vec<&str> = Vec::new();
    for pattern in mapping::get_default_patterns() {
        if seen.insert(pattern) {
            patterns.push(pattern);
        }
    }
    let sorted: BTreeSet<&str> = characteristics.iter().map(String::as_str).collect();
    for characteristic in sorted {
        for &pattern in mapping::map_characteristic_to_patterns(characteristic) {
            if seen.insert(pattern) {
                patterns.push(pattern);
            }
        }
    }
    patterns.into_iter().map(PathRule::auto).collect()
}

pub fn smart_auto_include_rules(project_root: &Path) -> Result<Vec<PathRule>> {
    let characteristics = detect_project_characteristics(project_root)?;
    suggest_auto_include_rules(&characteristics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detects_markers_and_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("package.json"), "{}").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/index.TS"), "").unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/Cargo.toml"), "").unwrap();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/b/c/deep.go"), "").unwrap();

        let found = detect_project_characteristics(root).unwrap();
        assert!(found.contains("package.json"));
        assert!(found.contains("json"));
        assert!(found.contains("ts"));
        assert!(!found.contains("Cargo.toml"));
        assert!(!found.contains("go"));
    }

    #[test]
    fn test_suggestions_start_with_defaults_and_dedupe() {
        let characteristics: HashSet<String> = ["package.json", "Cargo.toml", "json"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rules = suggest_auto_include_rules(&characteristics).unwrap();
        let patterns: Vec<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns[0], "README*");
        assert!(patterns.contains(&"src/lib.rs"));
        assert!(patterns.contains(&"src/index.*"));
        let unique: HashSet<&str> = patterns.iter().copied().collect();
        assert_eq!(unique.len(), patterns.len());
        assert!(rules.iter().all(|r| r.kind == RuleKind::SmartAutoInclude));
    }
}
