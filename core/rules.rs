use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobBuilder};
use log;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Include,
    #[serde(rename = "auto")]
    SmartAutoInclude,
    Exclude,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Include => "include",
            RuleKind::SmartAutoInclude => "auto",
            RuleKind::Exclude => "exclude",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathRule {
    pub pattern: String,
    pub kind: RuleKind,
}

impl PathRule {
    /// Builds a rule after checking the pattern against the glob grammar.
    pub fn new(pattern: impl Into<String>, kind: RuleKind) -> Result<Self> {
        let pattern = pattern.into();
        validate_pattern(&pattern)?;
        Ok(Self { pattern, kind })
    }

    pub fn include(pattern: impl Into<String>) -> Result<Self> {
        Self::new(pattern, RuleKind::Include)
    }

    pub fn auto(pattern: impl Into<String>) -> Result<Self> {
        Self::new(pattern, RuleKind::SmartAutoInclude)
    }

    pub fn exclude(pattern: impl Into<String>) -> Result<Self> {
        Self::new(pattern, RuleKind::Exclude)
    }

    pub fn compile(&self) -> Result<Glob> {
        compile_glob(&self.pattern)
    }
}

/// Rejects patterns that are empty, absolute, climb out of the root with
/// `..`, or fail to parse as a glob.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_rule(pattern, "pattern is empty"));
    }
    if trimmed.starts_with('/') || trimmed.starts_with('\\') || has_drive_prefix(trimmed) {
        return Err(AppError::Traversal {
            path: pattern.to_string(),
        });
    }
    if trimmed.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(AppError::Traversal {
            path: pattern.to_string(),
        });
    }
    compile_glob(pattern).map(|_| ())
}

fn has_drive_prefix(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// `dir/` is shorthand for everything below `dir`.
pub fn normalize_pattern(pattern: &str) -> String {
    let mut processed = pattern.trim().trim_start_matches("./").to_string();
    if processed.ends_with('/') && processed.len() > 1 {
        processed.push_str("**");
    }
    processed
}

pub fn compile_glob(pattern: &str) -> Result<Glob> {
    let processed = normalize_pattern(pattern);
    log::trace!(
        "Compiling glob pattern: {} (processed as {})",
        pattern,
        processed
    );
    GlobBuilder::new(&processed)
        .literal_separator(true)
        .case_insensitive(false)
        .build()
        .map_err(|e| {
            AppError::invalid_rule(pattern, format!("processed as \"{}\": {}", processed, e))
        })
}

/// Rule sets attached to one chat, or to a whole app when the chat has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredContextConfig", into = "StoredContextConfig")]
pub struct ChatContextConfig {
    pub include_rules: Vec<PathRule>,
    pub auto_include_rules: Vec<PathRule>,
    pub exclude_rules: Vec<PathRule>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ChatContextConfig {
    fn default() -> Self {
        Self {
            include_rules: Vec::new(),
            auto_include_rules: Vec::new(),
            exclude_rules: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl ChatContextConfig {
    pub fn from_patterns<S: AsRef<str>>(include: &[S], auto: &[S], exclude: &[S]) -> Result<Self> {
        let build = |patterns: &[S], kind: RuleKind| -> Result<Vec<PathRule>> {
            patterns
                .iter()
                .map(|p| PathRule::new(p.as_ref(), kind))
                .collect()
        };
        Ok(Self {
            include_rules: build(include, RuleKind::Include)?,
            auto_include_rules: build(auto, RuleKind::SmartAutoInclude)?,
            exclude_rules: build(exclude, RuleKind::Exclude)?,
            last_updated: Utc::now(),
        })
    }

    pub fn rules(&self, kind: RuleKind) -> &[PathRule] {
        match kind {
            RuleKind::Include => &self.include_rules,
            RuleKind::SmartAutoInclude => &self.auto_include_rules,
            RuleKind::Exclude => &self.exclude_rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include_rules.is_empty()
            && self.auto_include_rules.is_empty()
            && self.exclude_rules.is_empty()
    }

    /// Checks every pattern and that each rule sits in the list of its kind.
    pub fn validate(&self) -> Result<()> {
        for kind in [RuleKind::Include, RuleKind::SmartAutoInclude, RuleKind::Exclude] {
            for rule in self.rules(kind) {
                if rule.kind != kind {
                    return Err(AppError::Config(format!(
                        "Rule \"{}\" of kind '{}' stored among '{}' rules",
                        rule.pattern, rule.kind, kind
                    )));
                }
                validate_pattern(&rule.pattern)?;
            }
        }
        Ok(())
    }

    /// Stable hash of the rule sets, independent of `last_updated`.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.include_rules.hash(&mut hasher);
        self.auto_include_rules.hash(&mut hasher);
        self.exclude_rules.hash(&mut hasher);
        hasher.finish()
    }

    /// Fills the auto-include rules from `suggested` unless the user set some.
    pub fn with_smart_defaults(mut self, suggested: Vec<PathRule>) -> Self {
        if self.auto_include_rules.is_empty() {
            log::debug!(
                "No auto-include rules configured, using {} smart defaults",
                suggested.len()
            );
            self.auto_include_rules = suggested
                .into_iter()
                .filter(|r| r.kind == RuleKind::SmartAutoInclude)
                .collect();
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredContextConfig {
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    auto_include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default = "default_last_updated")]
    last_updated: DateTime<Utc>,
}

fn default_last_updated() -> DateTime<Utc> {
    Utc::now()
}

impl TryFrom<StoredContextConfig> for ChatContextConfig {
    type Error = AppError;

    fn try_from(stored: StoredContextConfig) -> Result<Self> {
        let mut config =
            ChatContextConfig::from_patterns(&stored.include, &stored.auto_include, &stored.exclude)?;
        config.last_updated = stored.last_updated;
        Ok(config)
    }
}

impl From<ChatContextConfig> for StoredContextConfig {
    fn from(config: ChatContextConfig) -> Self {
        let patterns = |rules: Vec<PathRule>| rules.into_iter().map(|r| r.pattern).collect();
        Self {
            include: patterns(config.include_rules),
            auto_include: patterns(config.auto_include_rules),
            exclude: patterns(config.exclude_rules),
            last_updated: config.last_updated,
        }
    }
}
