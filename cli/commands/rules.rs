use anyhow::{Context, Result};
use chatctx_core::{
    ChatContextConfig, Config, ConfigScope, ContextConfigStore, FileConfigStore, RuleKind,
};
use colored::*;
use log;
use std::path::PathBuf;

use crate::cli_args::{RulesAction, RulesArgs, RulesClearArgs, RulesSetArgs, RulesShowArgs};
use crate::{extend_rules, output};

fn scope_for(chat_id: Option<u64>) -> ConfigScope {
    match chat_id {
        Some(id) => ConfigScope::Chat(id),
        None => ConfigScope::App,
    }
}

fn open_store(project_root: Option<&PathBuf>) -> Result<FileConfigStore> {
    let root = Config::determine_project_root(project_root)
        .context("Failed to determine project root")?;
    log::debug!("Using context store under: {}", root.display());
    Ok(FileConfigStore::for_project(&root))
}

pub fn handle_rules_command(args: &RulesArgs, quiet: bool) -> Result<()> {
    match &args.action {
        RulesAction::Show(show) => handle_show(show),
        RulesAction::Set(set) => handle_set(set, quiet),
        RulesAction::Clear(clear) => handle_clear(clear, quiet),
    }
}

fn handle_show(args: &RulesShowArgs) -> Result<()> {
    let store = open_store(args.project_root.as_ref())?;
    let rules = store.resolve(args.chat_id)?;
    let scope = match args.chat_id {
        Some(id) if store.load(ConfigScope::Chat(id))?.is_some() => format!("chat {}", id),
        Some(id) => format!("chat {}, inherited from app", id),
        None => "app".to_string(),
    };
    let format = args.format_output.format.as_deref().unwrap_or("text");
    output::print_data_or_text(
        &rules,
        format,
        !args.format_output.enable_json_minify,
        "rules",
        || output::print_rules_pretty(&rules, &scope),
    )
}

fn handle_set(args: &RulesSetArgs, quiet: bool) -> Result<()> {
    let store = open_store(args.project_root.as_ref())?;
    let scope = scope_for(args.chat_id);

    let mut rules = if args.append {
        store.load(scope)?.unwrap_or_default()
    } else {
        ChatContextConfig::default()
    };
    extend_rules(&mut rules, RuleKind::Include, &args.include)?;
    extend_rules(&mut rules, RuleKind::SmartAutoInclude, &args.auto_include)?;
    extend_rules(&mut rules, RuleKind::Exclude, &args.exclude)?;

    let saved = store
        .save(scope, rules)
        .with_context(|| format!("Failed to save {} rules", scope))?;
    if !quiet {
        println!(
            "{} Saved {} rules ({} include, {} auto-include, {} exclude) to: {}",
            "✅".green(),
            scope.to_string().cyan(),
            saved.include_rules.len(),
            saved.auto_include_rules.len(),
            saved.exclude_rules.len(),
            store.path_for(scope).display().to_string().blue()
        );
    }
    Ok(())
}

fn handle_clear(args: &RulesClearArgs, quiet: bool) -> Result<()> {
    let store = open_store(args.project_root.as_ref())?;
    let scope = scope_for(args.chat_id);
    let removed = store.clear(scope)?;
    if !quiet {
        if removed {
            println!("{} Cleared {} rules.", "✅".green(), scope.to_string().cyan());
        } else {
            println!("No stored {} rules to clear.", scope);
        }
    }
    Ok(())
}
