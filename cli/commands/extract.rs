use anyhow::{Context, Result};
use chatctx_core::{Config, extract};
use colored::*;
use log;

use crate::cli_args::ExtractArgs;
use crate::output;
use crate::{load_config_for_command, resolve_rules_for_command};

pub fn handle_extract_command(args: &ExtractArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Using project root: {}", project_root.display());

    let config = load_config_for_command(
        &project_root,
        &args.project_config,
        &args.limits,
        &args.format_output,
    )?;
    let rules = resolve_rules_for_command(&project_root, &args.rules, &config)?;
    if rules.is_empty() && !quiet {
        eprintln!(
            "{} No context rules configured; the bundle will be empty. Try -i 'src/**' or --smart.",
            "ℹ️".blue()
        );
    }

    let options = config.extract_options()?;
    let bundle = extract(&project_root, &rules, &options)
        .with_context(|| format!("Extraction failed for {}", project_root.display()))?;

    let content = if config.output.format.eq_ignore_ascii_case("text") {
        bundle.formatted_output().to_string()
    } else {
        output::serialize_output(
            &bundle.to_report(),
            &config.output.format,
            !config.output.json_minify,
            "context",
        )?
    };
    output::emit(&content, args.save.as_deref(), quiet)?;

    output::print_warnings(bundle.warnings(), quiet);
    output::print_dropped(bundle.dropped_files(), options.token_budget, quiet);
    if !quiet {
        eprintln!(
            "{} {} files, {} tokens",
            "📦".blue(),
            bundle.total_files().to_string().cyan(),
            bundle.total_tokens().to_string().cyan()
        );
    }
    Ok(())
}
