use crate::cancel::CancelToken;
use crate::error::{AppError, Result};
use crate::output_formats::get_builtin_defaults;
use crate::pipeline::{ExtractOptions, default_max_concurrency};
use crate::scan::ScanOptions;
use crate::tokens::{Cl100kEstimator, default_estimator};
use byte_unit::Byte;
use log;
use parse_duration::parse;
use serde::{Deserialize, Serialize};
use std::convert::TryInto;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_DIR: &str = ".chatctx";
pub const DEFAULT_CONFIG_FILENAME: &str = "chatctx.toml";
pub const DEFAULT_CONTEXTS_DIR: &str = ".chatctx/contexts";
pub const DEFAULT_TIMEOUT: &str = "30s";
pub const DEFAULT_MAX_FILE_SIZE: &str = "1MB";

/// Engine settings read from `.chatctx/chatctx.toml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default = "default_false")]
    pub use_gitignore: bool,
    /// Replaces the builtin list when set.
    #[serde(default)]
    pub always_ignore: Option<Vec<String>>,
    /// Empty string or "0" disables the limit.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: String,
    /// Fill empty auto-include lists from the project layout.
    #[serde(default = "default_false")]
    pub smart_defaults: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// 0 picks min(available cores, 8).
    #[serde(default)]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default)]
    pub token_budget: Option<usize>,
    #[serde(default = "default_false")]
    pub exact_tokens: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_false")]
    pub json_minify: bool,
}

fn default_false() -> bool {
    false
}
fn default_format() -> String {
    "text".to_string()
}
fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}
fn default_max_file_size() -> String {
    DEFAULT_MAX_FILE_SIZE.to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            use_gitignore: false,
            always_ignore: None,
            max_file_size: default_max_file_size(),
            smart_defaults: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            timeout: default_timeout(),
            token_budget: None,
            exact_tokens: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            json_minify: false,
        }
    }
}

impl Config {
    pub fn determine_project_root(cli_project_root: Option<&PathBuf>) -> Result<PathBuf> {
        let path_str_opt = cli_project_root
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| env::var("PROJECT_ROOT").ok().filter(|s| !s.is_empty()));

        let path_to_resolve = match path_str_opt {
            Some(p_str) => PathBuf::from(shellexpand::tilde(&p_str).as_ref()),
            None => env::current_dir().map_err(AppError::Io)?,
        };

        path_to_resolve
            .canonicalize()
            .map_err(|e| AppError::ProjectNotFound {
                path: path_to_resolve.clone(),
                reason: format!("Failed to canonicalize project root: {}", e),
            })
    }

    pub fn resolve_config_path(
        project_root: &Path,
        cli_config_file: Option<&String>,
        cli_disable_config: bool,
    ) -> Result<Option<PathBuf>> {
        if cli_disable_config {
            log::debug!("Config file loading disabled via CLI flag.");
            return Ok(None);
        }

        let path_to_check = match cli_config_file {
            Some(p_str) => {
                let mut path = PathBuf::from(shellexpand::tilde(p_str).as_ref());
                if !path.exists() && path.extension().is_none() {
                    path.set_extension("toml");
                }
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Specified config file not found at path: {}",
                        path.display()
                    )));
                }
                log::debug!("Using specified config file path: {}", path.display());
                Some(path)
            }
            None => {
                let default_path = project_root
                    .join(DEFAULT_CONFIG_DIR)
                    .join(DEFAULT_CONFIG_FILENAME);
                if default_path.exists() {
                    log::debug!("Using default config file path: {}", default_path.display());
                    Some(default_path)
                } else {
                    log::debug!(
                        "No config file specified and default not found at: {}",
                        default_path.display()
                    );
                    None
                }
            }
        };
        Ok(path_to_check)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        log::info!("Loading configuration from: {}", config_path.display());
        let toml_content = fs::read_to_string(config_path).map_err(|e| AppError::FileRead {
            path: config_path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str::<Config>(&toml_content).map_err(|e| {
            AppError::TomlParse(format!(
                "Error parsing config file '{}': {}. Check TOML syntax and structure.",
                config_path.display(),
                e
            ))
        })?;
        // fail on bad durations and sizes at load time
        config.get_timeout()?;
        config.get_max_file_size()?;
        Ok(config)
    }

    pub fn get_timeout(&self) -> Result<Duration> {
        parse(&self.limits.timeout).map_err(|e| {
            AppError::InvalidArgument(format!(
                "Invalid timeout duration '{}': {}. Use format like '500ms', '30s'.",
                self.limits.timeout, e
            ))
        })
    }

    pub fn get_max_file_size(&self) -> Result<Option<u64>> {
        let raw = self.scan.max_file_size.trim();
        if raw.is_empty() || raw == "0" {
            return Ok(None);
        }
        let byte_value = Byte::from_str(raw).map_err(|e| {
            AppError::InvalidArgument(format!(
                "Invalid max file size '{}': {}. Use KB, MB, etc.",
                raw, e
            ))
        })?;
        let bytes: u128 = byte_value.into();
        let bytes: u64 = bytes.try_into().map_err(|_| {
            AppError::InvalidArgument(format!("Max file size '{}' is too large", raw))
        })?;
        Ok(Some(bytes))
    }

    pub fn get_effective_always_ignore(&self) -> Vec<String> {
        self.scan
            .always_ignore
            .clone()
            .unwrap_or_else(|| get_builtin_defaults().always_ignore.clone())
    }

    pub fn get_effective_max_concurrency(&self) -> usize {
        if self.limits.max_concurrency == 0 {
            default_max_concurrency()
        } else {
            self.limits.max_concurrency
        }
    }

    /// Options for one extraction, with a fresh cancel token whose deadline
    /// starts now.
    pub fn extract_options(&self) -> Result<ExtractOptions> {
        let estimator = if self.limits.exact_tokens {
            Arc::new(Cl100kEstimator::new()?) as Arc<dyn crate::tokens::TokenEstimator>
        } else {
            default_estimator()
        };
        Ok(ExtractOptions {
            token_budget: self.limits.token_budget,
            scan: ScanOptions {
                use_gitignore: self.scan.use_gitignore,
                always_ignore: self.get_effective_always_ignore(),
            },
            max_concurrency: self.get_effective_max_concurrency(),
            max_file_size: self.get_max_file_size()?,
            cancel: CancelToken::with_timeout(self.get_timeout()?),
            estimator,
        })
    }
}
