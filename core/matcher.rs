use crate::error::Result;
use crate::rules::{ChatContextConfig, PathRule, RuleKind};
use globset::{GlobSet, GlobSetBuilder};
use log;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludedBy {
    Include,
    #[serde(rename = "auto")]
    SmartAutoInclude,
}

impl IncludedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncludedBy::Include => "include",
            IncludedBy::SmartAutoInclude => "auto",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Included(IncludedBy),
    Excluded,
}

impl Classification {
    pub fn included_by(&self) -> Option<IncludedBy> {
        match self {
            Classification::Included(by) => Some(*by),
            Classification::Excluded => None,
        }
    }
}

/// Compiled form of one rule list.
#[derive(Debug, Clone)]
struct RuleSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl RuleSet {
    fn build(rules: &[PathRule]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut patterns = Vec::with_capacity(rules.len());
        for rule in rules {
            builder.add(rule.compile()?);
            patterns.push(rule.pattern.clone());
        }
        let set = builder.build().map_err(|e| {
            log::error!("Error building glob set: {}", e);
            crate::error::AppError::invalid_rule(&patterns.join(", "), e.to_string())
        })?;
        Ok(Self { patterns, set })
    }

    fn is_match(&self, relative_path: &Path) -> bool {
        self.set.is_match(relative_path)
    }

    fn matching_indices(&self, relative_path: &Path) -> Vec<usize> {
        let mut indices = self.set.matches(relative_path);
        indices.sort_unstable();
        indices
    }
}

/// Decides which rule kind, if any, admits a relative path.
///
/// Exclude beats include, include beats auto-include, and anything
/// unmatched stays out.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    include: RuleSet,
    auto_include: RuleSet,
    exclude: RuleSet,
}

impl PathMatcher {
    pub fn new(config: &ChatContextConfig) -> Result<Self> {
        log::trace!("Building glob sets for rule classification...");
        config.validate()?;
        let matcher = Self {
            include: RuleSet::build(&config.include_rules)?,
            auto_include: RuleSet::build(&config.auto_include_rules)?,
            exclude: RuleSet::build(&config.exclude_rules)?,
        };
        log::debug!(
            "Compiled {} include, {} auto-include, {} exclude rules",
            matcher.include.patterns.len(),
            matcher.auto_include.patterns.len(),
            matcher.exclude.patterns.len()
        );
        Ok(matcher)
    }

    pub fn classify(&self, relative_path: &Path) -> Classification {
        if self.exclude.is_match(relative_path) {
            log::trace!("Excluded by rule: {}", relative_path.display());
            return Classification::Excluded;
        }
        if self.include.is_match(relative_path) {
            log::trace!("Included: {}", relative_path.display());
            return Classification::Included(IncludedBy::Include);
        }
        if self.auto_include.is_match(relative_path) {
            log::trace!("Auto-included: {}", relative_path.display());
            return Classification::Included(IncludedBy::SmartAutoInclude);
        }
        log::trace!("No rule matched: {}", relative_path.display());
        Classification::Excluded
    }

    /// Indices into the rule list of `kind` whose pattern matches the path.
    pub fn matching_rules(&self, kind: RuleKind, relative_path: &Path) -> Vec<usize> {
        match kind {
            RuleKind::Include => self.include.matching_indices(relative_path),
            RuleKind::SmartAutoInclude => self.auto_include.matching_indices(relative_path),
            RuleKind::Exclude => self.exclude.matching_indices(relative_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn matcher(include: &[&str], auto: &[&str], exclude: &[&str]) -> PathMatcher {
        PathMatcher::new(&ChatContextConfig::from_patterns(include, auto, exclude).unwrap())
            .unwrap()
    }

    fn verdict(m: &PathMatcher, path: &str) -> Classification {
        m.classify(Path::new(path))
    }

    #[test]
    fn test_exclude_beats_include() {
        let m = matcher(&["**/*"], &[], &["secrets/**"]);
        assert_eq!(verdict(&m, "secrets/key.txt"), Classification::Excluded);
        assert_eq!(
            verdict(&m, "src/app.ts"),
            Classification::Included(IncludedBy::Include)
        );
    }

    #[test]
    fn test_exclude_beats_auto_include() {
        let m = matcher(&[], &["**/*.env"], &["**/.env", "config/*.env"]);
        assert_eq!(verdict(&m, "config/prod.env"), Classification::Excluded);
        assert_eq!(
            verdict(&m, "other/dev.env"),
            Classification::Included(IncludedBy::SmartAutoInclude)
        );
    }

    #[test]
    fn test_include_beats_auto_include() {
        let m = matcher(&["src/**"], &["src/main.*"], &[]);
        assert_eq!(
            verdict(&m, "src/main.ts"),
            Classification::Included(IncludedBy::Include)
        );
    }

    #[test]
    fn test_unmatched_is_excluded() {
        let m = matcher(&["src/**"], &[], &[]);
        assert_eq!(verdict(&m, "README.md"), Classification::Excluded);
        let empty = matcher(&[], &[], &[]);
        assert_eq!(verdict(&empty, "anything.txt"), Classification::Excluded);
    }

    #[test]
    fn test_single_star_stays_within_segment() {
        let m = matcher(&["src/*.ts"], &[], &[]);
        assert!(verdict(&m, "src/index.ts").included_by().is_some());
        assert_eq!(verdict(&m, "src/lib/util.ts"), Classification::Excluded);
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let m = matcher(&["src/**/*.ts", "**/README.md"], &[], &[]);
        assert!(verdict(&m, "src/a/b/c.ts").included_by().is_some());
        assert!(verdict(&m, "src/c.ts").included_by().is_some());
        assert!(verdict(&m, "README.md").included_by().is_some());
        assert!(verdict(&m, "docs/README.md").included_by().is_some());
    }

    #[test]
    fn test_matching_is_case_sensitive_and_anchored() {
        let m = matcher(&["README.md", "src/**"], &[], &[]);
        assert_eq!(verdict(&m, "readme.md"), Classification::Excluded);
        assert_eq!(verdict(&m, "docs/README.md"), Classification::Excluded);
        assert_eq!(verdict(&m, "lib/src/x.ts"), Classification::Excluded);
    }

    #[test]
    fn test_trailing_slash_means_directory() {
        let m = matcher(&["**/*"], &[], &["dist/"]);
        assert_eq!(verdict(&m, "dist/bundle.js"), Classification::Excluded);
        assert_eq!(verdict(&m, "dist/assets/a.css"), Classification::Excluded);
        assert!(verdict(&m, "distribution.md").included_by().is_some());
    }

    #[test]
    fn test_malformed_rule_fails_construction() {
        let config = ChatContextConfig {
            exclude_rules: vec![PathRule {
                pattern: "secrets/[".to_string(),
                kind: RuleKind::Exclude,
            }],
            ..ChatContextConfig::default()
        };
        assert!(matches!(
            PathMatcher::new(&config),
            Err(AppError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_matching_rules_reports_indices() {
        let m = matcher(&["src/**", "**/*.ts", "docs/**"], &[], &[]);
        assert_eq!(
            m.matching_rules(RuleKind::Include, Path::new("src/index.ts")),
            vec![0, 1]
        );
        assert!(
            m.matching_rules(RuleKind::Exclude, Path::new("src/index.ts"))
                .is_empty()
        );
    }
}
