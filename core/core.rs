pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod matcher;
pub mod output_formats;
pub mod pipeline;
pub mod rules;
pub mod sandbox;
pub mod scan;
pub mod smart;
pub mod store;
pub mod tokens;

pub use cancel::CancelToken;
pub use config::Config;
pub use context::{
    ContextBundle, ExtractionReport, FILE_BLOCK_OVERHEAD_TOKENS, ReportFile, ResolvedFile,
    Warning, parse_file_blocks,
};
pub use error::{AppError, Result};
pub use matcher::{Classification, IncludedBy, PathMatcher};
pub use output_formats::{BuiltinDefaults, get_builtin_defaults};
pub use pipeline::{ContextPreview, ExtractOptions, PreviewFile, RuleReport, extract, preview};
pub use rules::{ChatContextConfig, PathRule, RuleKind, validate_pattern};
pub use sandbox::SandboxGuard;
pub use scan::{CandidateFile, ScanOptions, ScanOutcome, scan};
pub use smart::{detect_project_characteristics, smart_auto_include_rules};
pub use store::{ConfigScope, ContextConfigStore, FileConfigStore, MemoryConfigStore};
pub use tokens::{Cl100kEstimator, HeuristicEstimator, TokenEstimator};
