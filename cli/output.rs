use anyhow::{Context, Result};
use byte_unit::{Byte, UnitType};
use chatctx_core::{ChatContextConfig, ContextPreview, RuleKind, Warning, output_formats};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Writes `content` to `path` when given, otherwise to stdout.
pub fn emit(content: &str, output_path: Option<&Path>, quiet: bool) -> Result<()> {
    match output_path {
        Some(path) => {
            write_to_file(path, content)?;
            if !quiet {
                eprintln!(
                    "{} Context saved to: {}",
                    "✅".green(),
                    path.display().to_string().blue()
                );
            }
            Ok(())
        }
        None => write_to_stdout(content),
    }
}

pub fn serialize_output<T: Serialize>(
    data: &T,
    format: &str,
    pretty_json: bool,
    xml_root: &str,
) -> Result<String> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => output_formats::serialize_to_yaml(data).map_err(anyhow::Error::from),
        "xml" => {
            output_formats::serialize_to_xml(data, xml_root).map_err(anyhow::Error::from)
        }
        _ => output_formats::serialize_to_json(data, pretty_json).map_err(anyhow::Error::from),
    }
}

// Helper for commands that print either a human view or structured data
pub fn print_data_or_text<T: Serialize>(
    data: &T,
    format: &str,
    pretty_json: bool,
    root_name: &str,
    print_text: impl FnOnce() -> Result<()>,
) -> Result<()> {
    if format.eq_ignore_ascii_case("text") {
        print_text()
    } else {
        let content = serialize_output(data, format, pretty_json, root_name)?;
        write_to_stdout(&content)
    }
}

fn write_to_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Failed to create file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to file {}", path.display()))?;
    Ok(())
}

fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.is_empty() && !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

pub fn print_warnings(warnings: &[Warning], quiet: bool) {
    if quiet || warnings.is_empty() {
        return;
    }
    eprintln!(
        "\n{}",
        "⚠️ Warning: Some files were skipped:".yellow()
    );
    for warning in warnings {
        match &warning.path {
            Some(path) => eprintln!(" - {}: {}", path.cyan(), warning.message),
            None => eprintln!(" - {}", warning.message),
        }
    }
}

pub fn print_dropped(dropped: &[String], budget: Option<usize>, quiet: bool) {
    if quiet || dropped.is_empty() {
        return;
    }
    let budget = budget.map_or_else(|| "?".to_string(), |b| b.to_string());
    eprintln!(
        "\n{} {} ({} tokens):",
        "✂️".yellow(),
        "Dropped to fit the token budget".yellow(),
        budget.cyan()
    );
    for path in dropped {
        eprintln!(" - {}", path.dimmed());
    }
}

fn readable_size(bytes: u64) -> String {
    Byte::from_u128(bytes as u128)
        .unwrap_or_default()
        .get_appropriate_unit(UnitType::Binary)
        .to_string()
}

pub fn print_preview_pretty_table(preview: &ContextPreview) -> Result<()> {
    println!();
    println!("{}", " Rule Matches ".green().bold().underline());
    if preview.rules.is_empty() {
        println!("{}", "(No rules configured; nothing will be included)".yellow());
    } else {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Kind").fg(Color::Green),
            Cell::new("Pattern").fg(Color::Green),
            Cell::new("Files").fg(Color::Green),
            Cell::new("Est. Tokens").fg(Color::Green),
        ]);
        for rule in &preview.rules {
            let kind_color = match rule.kind {
                RuleKind::Include => Color::Cyan,
                RuleKind::SmartAutoInclude => Color::Blue,
                RuleKind::Exclude => Color::Red,
            };
            table.add_row(vec![
                Cell::new(rule.kind.as_str()).fg(kind_color),
                Cell::new(&rule.pattern),
                Cell::new(rule.matched_files).set_alignment(CellAlignment::Right),
                Cell::new(rule.estimated_tokens).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{table}");
    }

    if !preview.files.is_empty() {
        println!("\n{}", " Files ".green().bold().underline());
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Path").fg(Color::Green),
            Cell::new("Via").fg(Color::Green),
            Cell::new("Size").fg(Color::Green),
            Cell::new("Est. Tokens").fg(Color::Green),
        ]);
        for file in &preview.files {
            table.add_row(vec![
                Cell::new(&file.path).fg(Color::Cyan),
                Cell::new(file.included_by.as_str()),
                Cell::new(readable_size(file.byte_size))
                    .set_alignment(CellAlignment::Right)
                    .fg(Color::DarkGrey),
                Cell::new(file.estimated_tokens).set_alignment(CellAlignment::Right),
            ]);
        }
        println!("{table}");
    }

    println!(
        "\n{:<20} {}",
        "Total Files:".green(),
        preview.total_files.to_string().cyan()
    );
    println!(
        "{:<20} {}",
        "Est. Tokens:".green(),
        preview.total_tokens.to_string().cyan()
    );
    println!();
    Ok(())
}

pub fn print_rules_pretty(rules: &ChatContextConfig, scope: &str) -> Result<()> {
    println!();
    println!(
        "{}",
        format!(" Context Rules ({}) ", scope).green().bold().underline()
    );
    println!(
        "{:<20} {}",
        "Last Updated:".green(),
        rules.last_updated.to_rfc3339().dimmed()
    );
    for (kind, label) in [
        (RuleKind::Include, "Include:"),
        (RuleKind::SmartAutoInclude, "Auto-include:"),
        (RuleKind::Exclude, "Exclude:"),
    ] {
        let patterns = rules.rules(kind);
        if patterns.is_empty() {
            println!("{:<20} {}", label.green(), "(none)".dimmed());
        } else {
            println!("{}", label.green());
            for rule in patterns {
                println!("  - {}", rule.pattern.cyan());
            }
        }
    }
    println!();
    Ok(())
}
