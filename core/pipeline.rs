use crate::cancel::CancelToken;
use crate::context::{
    ContextBundle, FILE_BLOCK_OVERHEAD_TOKENS, ResolvedFile, Warning, bundle_tokens,
    render_bundle,
};
use crate::error::Result;
use crate::matcher::{Classification, IncludedBy, PathMatcher};
use crate::rules::{ChatContextConfig, RuleKind};
use crate::sandbox::SandboxGuard;
use crate::scan::{self, CandidateFile, ScanOptions};
use crate::tokens::{TokenEstimator, default_estimator};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use log;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MAX_DEFAULT_CONCURRENCY: usize = 8;

pub fn default_max_concurrency() -> usize {
    rayon::current_num_threads().clamp(1, MAX_DEFAULT_CONCURRENCY)
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub token_budget: Option<usize>,
    pub scan: ScanOptions,
    pub max_concurrency: usize,
    /// Larger files are skipped with a warning.
    pub max_file_size: Option<u64>,
    pub cancel: CancelToken,
    pub estimator: Arc<dyn TokenEstimator>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            token_budget: None,
            scan: ScanOptions::default(),
            max_concurrency: default_max_concurrency(),
            max_file_size: None,
            cancel: CancelToken::new(),
            estimator: default_estimator(),
        }
    }
}

impl ExtractOptions {
    pub fn with_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = Some(token_budget);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }
}

/// A candidate that matched a rule and passed the sandbox.
#[derive(Debug)]
struct Selected {
    path: String,
    absolute_path: PathBuf,
    byte_size: u64,
    included_by: IncludedBy,
}

#[derive(Debug)]
struct LoadedFile {
    path: String,
    content: String,
    token_count: usize,
    included_by: IncludedBy,
}

enum ReadOutcome {
    Loaded(LoadedFile),
    Skipped(Warning),
}

struct Selection {
    selected: Vec<Selected>,
    excluded: Vec<CandidateFile>,
    warnings: Vec<Warning>,
}

/// Resolves `config` against the project and builds the context bundle.
///
/// All-or-nothing: cancellation, an invalid rule or a missing root fail the
/// whole call. Per-file trouble only produces warnings.
pub fn extract(
    project_root: &Path,
    config: &ChatContextConfig,
    options: &ExtractOptions,
) -> Result<ContextBundle> {
    let matcher = PathMatcher::new(config)?;
    let guard = SandboxGuard::new(project_root)?;
    options.cancel.check()?;

    let scanned_at = Utc::now();
    let outcome = scan::scan(guard.root(), &options.scan, &options.cancel)?;
    let Selection {
        selected,
        mut warnings,
        ..
    } = select_candidates(outcome.candidates, &matcher, &guard, options.max_file_size);
    warnings.extend(outcome.warnings);

    log::info!(
        "Reading {} matched files with up to {} threads...",
        selected.len(),
        options.max_concurrency
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.max_concurrency.max(1))
        .build()?;
    let estimator = options.estimator.as_ref();
    let cancel = &options.cancel;
    let outcomes: Vec<ReadOutcome> = pool.install(|| {
        selected
            .par_iter()
            .map(|file| read_selected(file, cancel, estimator))
            .collect::<Result<Vec<_>>>()
    })?;
    options.cancel.check()?;

    let mut loaded = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            ReadOutcome::Loaded(file) => loaded.push(file),
            ReadOutcome::Skipped(warning) => warnings.push(warning),
        }
    }
    loaded.sort_by(|a, b| a.path.cmp(&b.path));
    loaded.dedup_by(|a, b| a.path == b.path);

    let dropped_files = match options.token_budget {
        Some(budget) => {
            let weights: Vec<(&str, usize, IncludedBy)> = loaded
                .iter()
                .map(|f| (f.path.as_str(), f.token_count, f.included_by))
                .collect();
            let dropped = select_budget_drops(&weights, budget);
            let mut dropped_paths: Vec<String> = dropped
                .iter()
                .map(|&idx| loaded[idx].path.clone())
                .collect();
            dropped_paths.sort();
            let mut idx = 0;
            loaded.retain(|_| {
                let keep = !dropped.contains(&idx);
                idx += 1;
                keep
            });
            dropped_paths
        }
        None => Vec::new(),
    };
    if !dropped_files.is_empty() {
        log::warn!(
            "Token budget exceeded, dropped {} files: {}",
            dropped_files.len(),
            dropped_files.join(", ")
        );
    }

    let formatted_output = render_bundle(
        loaded
            .iter()
            .map(|f| (f.path.as_str(), f.content.as_str())),
    );
    let files: Vec<ResolvedFile> = loaded
        .into_iter()
        .map(|f| ResolvedFile {
            relative_path: f.path,
            token_count: f.token_count,
            included_by: f.included_by,
        })
        .collect();
    sort_warnings(&mut warnings);

    let bundle = ContextBundle::new(formatted_output, files, scanned_at, dropped_files, warnings);
    log::info!(
        "Extraction complete: {} files, {} tokens, {} warnings",
        bundle.total_files(),
        bundle.total_tokens(),
        bundle.warnings().len()
    );
    Ok(bundle)
}

fn select_candidates(
    candidates: Vec<CandidateFile>,
    matcher: &PathMatcher,
    guard: &SandboxGuard,
    max_file_size: Option<u64>,
) -> Selection {
    let mut selection = Selection {
        selected: Vec::new(),
        excluded: Vec::new(),
        warnings: Vec::new(),
    };
    for candidate in candidates {
        let included_by = match matcher.classify(&candidate.relative_path) {
            Classification::Included(by) => by,
            Classification::Excluded => {
                selection.excluded.push(candidate);
                continue;
            }
        };
        let path = candidate.display_path();
        let absolute_path = match guard.resolve(&candidate.relative_path) {
            Ok(resolved) => resolved,
            Err(e) => {
                log::warn!("Skipping {}: {}", path, e);
                selection
                    .warnings
                    .push(Warning::for_path(path, "resolves outside the project root"));
                continue;
            }
        };
        if let Some(limit) = max_file_size {
            if candidate.byte_size > limit {
                log::warn!(
                    "Skipping {}: {} bytes exceeds the {} byte limit",
                    path,
                    candidate.byte_size,
                    limit
                );
                selection.warnings.push(Warning::for_path(
                    path,
                    format!(
                        "file is {} bytes, larger than the {} byte limit",
                        candidate.byte_size, limit
                    ),
                ));
                continue;
            }
        }
        selection.selected.push(Selected {
            path,
            absolute_path,
            byte_size: candidate.byte_size,
            included_by,
        });
    }
    selection
}

fn read_selected(
    file: &Selected,
    cancel: &CancelToken,
    estimator: &dyn TokenEstimator,
) -> Result<ReadOutcome> {
    cancel.check()?;
    let bytes = match fs::read(&file.absolute_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Could not read {}: {}", file.path, e);
            return Ok(ReadOutcome::Skipped(Warning::for_path(
                file.path.clone(),
                format!("unreadable: {}", e),
            )));
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => {
            let token_count = estimator.estimate(&content);
            log::trace!("Read {} ({} tokens)", file.path, token_count);
            Ok(ReadOutcome::Loaded(LoadedFile {
                path: file.path.clone(),
                content,
                token_count,
                included_by: file.included_by,
            }))
        }
        Err(e) => {
            log::debug!("Skipping non-UTF-8 file: {} ({})", file.path, e);
            Ok(ReadOutcome::Skipped(Warning::for_path(
                file.path.clone(),
                "not valid UTF-8 text",
            )))
        }
    }
}

/// Indices to drop so the rest fits `budget`, counting the per-file overhead.
///
/// Auto-included files go first, then explicit includes; within a kind the
/// largest file goes first and equal sizes fall back to path order.
fn select_budget_drops(files: &[(&str, usize, IncludedBy)], budget: usize) -> HashSet<usize> {
    let mut total = bundle_tokens(files.iter().map(|f| f.1));
    let mut dropped = HashSet::new();
    if total <= budget {
        return dropped;
    }
    let mut order: Vec<usize> = (0..files.len()).collect();
    order.sort_by(|&a, &b| {
        let (path_a, tokens_a, by_a) = files[a];
        let (path_b, tokens_b, by_b) = files[b];
        drop_rank(by_a)
            .cmp(&drop_rank(by_b))
            .then(tokens_b.cmp(&tokens_a))
            .then(path_a.cmp(path_b))
    });
    for idx in order {
        if total <= budget {
            break;
        }
        total -= files[idx].1 + FILE_BLOCK_OVERHEAD_TOKENS;
        dropped.insert(idx);
    }
    dropped
}

fn drop_rank(included_by: IncludedBy) -> u8 {
    match included_by {
        IncludedBy::SmartAutoInclude => 0,
        IncludedBy::Include => 1,
    }
}

fn sort_warnings(warnings: &mut [Warning]) {
    warnings.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    pub pattern: String,
    pub kind: RuleKind,
    pub matched_files: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFile {
    pub path: String,
    pub byte_size: u64,
    pub estimated_tokens: usize,
    pub included_by: IncludedBy,
}

/// What `extract` would include, sized from byte counts alone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPreview {
    /// One entry per distinct rule, include then auto then exclude.
    pub rules: Vec<RuleReport>,
    pub files: Vec<PreviewFile>,
    pub total_files: usize,
    pub total_tokens: usize,
    pub scanned_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl ContextPreview {
    pub fn rule(&self, kind: RuleKind, pattern: &str) -> Option<&RuleReport> {
        self.rules
            .iter()
            .find(|r| r.kind == kind && r.pattern == pattern)
    }
}

/// Scans and classifies without reading any content.
///
/// A file counts towards a rule only under its final classification: an
/// include rule is credited for files actually included through the include
/// list, and an exclude rule for every file it keeps out.
pub fn preview(
    project_root: &Path,
    config: &ChatContextConfig,
    options: &ExtractOptions,
) -> Result<ContextPreview> {
    let matcher = PathMatcher::new(config)?;
    let guard = SandboxGuard::new(project_root)?;
    options.cancel.check()?;

    let scanned_at: DateTime<Utc> = Utc::now();
    let outcome = scan::scan(guard.root(), &options.scan, &options.cancel)?;
    let Selection {
        selected,
        excluded,
        mut warnings,
    } = select_candidates(outcome.candidates, &matcher, &guard, options.max_file_size);
    warnings.extend(outcome.warnings);
    options.cancel.check()?;

    let mut rules: IndexMap<(RuleKind, &str), RuleReport> = IndexMap::new();
    for kind in [RuleKind::Include, RuleKind::SmartAutoInclude, RuleKind::Exclude] {
        for rule in config.rules(kind) {
            rules
                .entry((kind, rule.pattern.as_str()))
                .or_insert_with(|| RuleReport {
                    pattern: rule.pattern.clone(),
                    kind,
                    matched_files: 0,
                    estimated_tokens: 0,
                });
        }
    }

    let mut credit = |kind: RuleKind, candidate_path: &Path, tokens: usize| {
        let keys: BTreeSet<(RuleKind, &str)> = matcher
            .matching_rules(kind, candidate_path)
            .into_iter()
            .map(|idx| (kind, config.rules(kind)[idx].pattern.as_str()))
            .collect();
        for key in keys {
            if let Some(report) = rules.get_mut(&key) {
                report.matched_files += 1;
                report.estimated_tokens += tokens;
            }
        }
    };

    let estimator = options.estimator.as_ref();
    let mut files = Vec::with_capacity(selected.len());
    for file in &selected {
        let tokens = estimator.estimate_bytes(file.byte_size);
        let kind = match file.included_by {
            IncludedBy::Include => RuleKind::Include,
            IncludedBy::SmartAutoInclude => RuleKind::SmartAutoInclude,
        };
        credit(kind, Path::new(&file.path), tokens);
        files.push(PreviewFile {
            path: file.path.clone(),
            byte_size: file.byte_size,
            estimated_tokens: tokens,
            included_by: file.included_by,
        });
    }
    for candidate in &excluded {
        let tokens = estimator.estimate_bytes(candidate.byte_size);
        credit(RuleKind::Exclude, &candidate.relative_path, tokens);
    }

    let mut dropped_files = Vec::new();
    if let Some(budget) = options.token_budget {
        let weights: Vec<(&str, usize, IncludedBy)> = files
            .iter()
            .map(|f| (f.path.as_str(), f.estimated_tokens, f.included_by))
            .collect();
        let dropped = select_budget_drops(&weights, budget);
        dropped_files = dropped.iter().map(|&idx| files[idx].path.clone()).collect();
        dropped_files.sort();
        let mut idx = 0;
        files.retain(|_| {
            let keep = !dropped.contains(&idx);
            idx += 1;
            keep
        });
    }
    sort_warnings(&mut warnings);

    let total_tokens = bundle_tokens(files.iter().map(|f| f.estimated_tokens));
    log::info!(
        "Preview complete: {} files, ~{} tokens",
        files.len(),
        total_tokens
    );
    Ok(ContextPreview {
        rules: rules.into_values().collect(),
        total_files: files.len(),
        total_tokens,
        files,
        scanned_at: scanned_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        dropped_files,
        warnings,
    })
}
