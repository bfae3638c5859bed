use anyhow::{Context, Result};
use chatctx_core::{Config, preview};
use log;

use crate::cli_args::PreviewArgs;
use crate::output;
use crate::{load_config_for_command, resolve_rules_for_command};

pub fn handle_preview_command(args: &PreviewArgs, quiet: bool) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    log::info!("Previewing project root: {}", project_root.display());

    let config = load_config_for_command(
        &project_root,
        &args.project_config,
        &args.limits,
        &args.format_output,
    )?;
    let rules = resolve_rules_for_command(&project_root, &args.rules, &config)?;
    let options = config.extract_options()?;
    let report = preview(&project_root, &rules, &options)
        .with_context(|| format!("Preview failed for {}", project_root.display()))?;

    output::print_data_or_text(
        &report,
        &config.output.format,
        !config.output.json_minify,
        "preview",
        || output::print_preview_pretty_table(&report),
    )?;
    output::print_warnings(&report.warnings, quiet);
    output::print_dropped(&report.dropped_files, options.token_budget, quiet);
    Ok(())
}
