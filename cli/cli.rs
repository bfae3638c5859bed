mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use chatctx_core::{
    AppError, ChatContextConfig, Config, ContextConfigStore, FileConfigStore, PathRule, RuleKind,
    smart_auto_include_rules,
};
use clap::{CommandFactory, Parser};
use colored::*;
use log;
use std::path::Path;
use std::process;

use cli_args::{Cli, Commands, FormatOutputOpts, LimitOpts, ProjectConfigOpts, RuleOpts};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(cli_args, quiet) {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let core_err = e.downcast_ref::<AppError>();
            let exit_code = match core_err {
                Some(AppError::Config(_)) => 1,
                Some(AppError::TomlParse(_)) => 1,
                Some(AppError::TomlSerialize(_)) => 1,
                Some(AppError::ProjectNotFound { .. }) => 2,
                Some(AppError::Io(_)) => 2,
                Some(AppError::FileRead { .. }) => 2,
                Some(AppError::FileWrite { .. }) => 2,
                Some(AppError::DirCreation { .. }) => 2,
                Some(AppError::InvalidRule { .. }) => 3,
                Some(AppError::Traversal { .. }) => 3,
                Some(AppError::InvalidArgument(_)) => 5,
                Some(AppError::JsonSerialize(_)) => 6,
                Some(AppError::YamlError(_)) => 6,
                Some(AppError::XmlSerialize(_)) => 6,
                Some(AppError::Cancelled(_)) => 7,
                Some(AppError::TikToken(_)) => 8,
                Some(AppError::ThreadPool(_)) => 8,
                Some(_) => 1,
                None => 1,
            };

            // config and argument errors are always shown, even with -q
            if !quiet || matches!(exit_code, 1 | 3 | 5) {
                eprintln!("{} {:#}", "Error:".red().bold(), e);
            } else {
                log::error!("Application failed: {:#}", e);
            }

            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    match cli.command {
        None => {
            Cli::command().print_help()?;
        }
        Some(command) => match command {
            Commands::Extract(args) => {
                log::debug!("Executing 'extract' command...");
                commands::extract::handle_extract_command(&args, quiet)?;
            }
            Commands::Preview(args) => {
                log::debug!("Executing 'preview' command...");
                commands::preview::handle_preview_command(&args, quiet)?;
            }
            Commands::Rules(args) => {
                log::debug!("Executing 'rules' command...");
                commands::rules::handle_rules_command(&args, quiet)?;
            }
            Commands::Completion(args) => {
                log::debug!("Executing 'completion' command...");
                commands::completion::handle_completion_command(&args, quiet)?;
            }
        },
    }
    Ok(())
}

fn merge_config_with_cli_overrides(
    mut config: Config,
    limits: &LimitOpts,
    format_opts: &FormatOutputOpts,
) -> Config {
    log::trace!("Applying CLI overrides to config...");

    if limits.budget.is_some() {
        config.limits.token_budget = limits.budget;
    }
    if limits.exact_tokens {
        config.limits.exact_tokens = true;
    }
    if let Some(timeout) = &limits.timeout {
        config.limits.timeout = timeout.clone();
    }
    if let Some(n) = limits.max_concurrency {
        config.limits.max_concurrency = n;
    }
    if let Some(size) = &limits.max_file_size {
        config.scan.max_file_size = size.clone();
    }
    if limits.gitignore {
        config.scan.use_gitignore = true;
    }

    if let Some(format) = &format_opts.format {
        config.output.format = format.clone();
    }
    if format_opts.enable_json_minify {
        config.output.json_minify = true;
    }
    if format_opts.disable_json_minify {
        config.output.json_minify = false;
    }

    log::trace!("Config after CLI overrides: {:?}", config);
    config
}

pub fn load_config_for_command(
    project_root: &Path,
    project_opts: &ProjectConfigOpts,
    limits: &LimitOpts,
    format_opts: &FormatOutputOpts,
) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        project_root,
        project_opts.config_file.as_ref(),
        project_opts.no_config_file,
    )
    .context("Failed to resolve configuration path")?;

    let config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    Ok(merge_config_with_cli_overrides(config, limits, format_opts))
}

/// Stored rules for the chat (or app), extended by command-line rules and,
/// when asked, smart auto-include defaults.
pub fn resolve_rules_for_command(
    project_root: &Path,
    rule_opts: &RuleOpts,
    config: &Config,
) -> Result<ChatContextConfig> {
    let mut rules = if rule_opts.no_stored_rules {
        ChatContextConfig::default()
    } else {
        FileConfigStore::for_project(project_root)
            .resolve(rule_opts.chat_id)
            .context("Failed to load stored context rules")?
    };

    extend_rules(&mut rules, RuleKind::Include, &rule_opts.include)?;
    extend_rules(&mut rules, RuleKind::SmartAutoInclude, &rule_opts.auto_include)?;
    extend_rules(&mut rules, RuleKind::Exclude, &rule_opts.exclude)?;

    if rule_opts.smart || config.scan.smart_defaults {
        let suggested = smart_auto_include_rules(project_root)
            .context("Failed to detect smart auto-include rules")?;
        rules = rules.with_smart_defaults(suggested);
    }
    log::debug!(
        "Resolved rules: {} include, {} auto-include, {} exclude",
        rules.include_rules.len(),
        rules.auto_include_rules.len(),
        rules.exclude_rules.len()
    );
    Ok(rules)
}

pub fn extend_rules(
    rules: &mut ChatContextConfig,
    kind: RuleKind,
    patterns: &[String],
) -> Result<()> {
    let target = match kind {
        RuleKind::Include => &mut rules.include_rules,
        RuleKind::SmartAutoInclude => &mut rules.auto_include_rules,
        RuleKind::Exclude => &mut rules.exclude_rules,
    };
    for pattern in patterns {
        let rule = PathRule::new(pattern.as_str(), kind)
            .with_context(|| format!("Invalid {} rule '{}'", kind, pattern))?;
        if !target.contains(&rule) {
            target.push(rule);
        }
    }
    Ok(())
}
