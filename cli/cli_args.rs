use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectConfigOpts {
    #[arg(
        long,
        help = "Specify the target project directory (default: $PROJECT_ROOT or current dir).",
        help_heading = "Project Setup",
        value_name = "PATH"
    )]
    pub project_root: Option<PathBuf>,

    #[arg(
        long,
        help = "Specify path of the TOML engine config (default: .chatctx/chatctx.toml).",
        value_name = "CONFIG_FILE",
        conflicts_with = "no_config_file",
        help_heading = "Project Setup"
    )]
    pub config_file: Option<String>,

    #[arg(
        long,
        help = "Disable loading any TOML engine config.",
        conflicts_with = "config_file",
        help_heading = "Project Setup"
    )]
    pub no_config_file: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RuleOpts {
    #[arg(
        long,
        value_name = "ID",
        help = "Use the stored rules of this chat (falls back to the app rules).",
        help_heading = "Rules"
    )]
    pub chat_id: Option<u64>,

    #[arg(
        short = 'i',
        long = "include",
        value_name = "GLOB",
        help = "Add an include rule (repeatable).",
        help_heading = "Rules"
    )]
    pub include: Vec<String>,

    #[arg(
        short = 'a',
        long = "auto-include",
        value_name = "GLOB",
        help = "Add an auto-include rule, dropped first under a budget (repeatable).",
        help_heading = "Rules"
    )]
    pub auto_include: Vec<String>,

    #[arg(
        short = 'e',
        long = "exclude",
        value_name = "GLOB",
        help = "Add an exclude rule, beats any include (repeatable).",
        help_heading = "Rules"
    )]
    pub exclude: Vec<String>,

    #[arg(
        long,
        help = "Fill empty auto-include rules from the detected project type.",
        help_heading = "Rules"
    )]
    pub smart: bool,

    #[arg(
        long,
        help = "Ignore stored rules and use only the ones given on the command line.",
        help_heading = "Rules"
    )]
    pub no_stored_rules: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LimitOpts {
    #[arg(
        short = 'b',
        long,
        value_name = "TOKENS",
        help = "Maximum tokens in the bundle; lower-priority files are dropped.",
        help_heading = "Limits"
    )]
    pub budget: Option<usize>,

    #[arg(
        long,
        help = "Count tokens with the cl100k tokenizer instead of the fast estimate.",
        help_heading = "Limits"
    )]
    pub exact_tokens: bool,

    #[arg(
        long,
        value_name = "DURATION",
        help = "Abort after this long, e.g. '500ms', '30s'.",
        help_heading = "Limits"
    )]
    pub timeout: Option<String>,

    #[arg(
        long,
        value_name = "N",
        help = "Maximum parallel file reads.",
        help_heading = "Limits"
    )]
    pub max_concurrency: Option<usize>,

    #[arg(
        long,
        value_name = "SIZE",
        help = "Skip files larger than this, e.g. '512KB' ('0' for no limit).",
        help_heading = "Limits"
    )]
    pub max_file_size: Option<String>,

    #[arg(
        long,
        help = "Skip files listed in .gitignore/.ignore files.",
        help_heading = "Limits"
    )]
    pub gitignore: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FormatOutputOpts {
    #[arg(short = 'f', long, help = "Set the output format.", value_name = "FORMAT", value_parser = ["text", "json", "yaml", "xml"], help_heading = "Output Formatting")]
    pub format: Option<String>,

    #[arg(
        long,
        help = "Ensure JSON output is compact (minified).",
        conflicts_with = "disable_json_minify",
        help_heading = "Output Formatting"
    )]
    pub enable_json_minify: bool,

    #[arg(
        long,
        help = "Ensure JSON output is pretty-printed (readable) [default].",
        conflicts_with = "enable_json_minify",
        help_heading = "Output Formatting"
    )]
    pub disable_json_minify: bool,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Select project files for an AI chat turn and bundle them within a token budget.",
    long_about = "chatctx resolves per-chat include / auto-include / exclude rules against a project, \nreads only matched files inside the project root, estimates their token cost \nand prints one formatted context bundle.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  chatctx extract -i 'src/**' -a 'README*' -e 'node_modules/' --budget 8000\n  chatctx preview --chat-id 12\n  chatctx rules set --chat-id 12 -i 'src/**' -e 'secrets/'\n  chatctx extract -f json --save ./context.json",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase message verbosity (-v, -vv, -vvv).")]
    pub verbose: u8,

    #[arg(
        short,
        long,
        global = true,
        help = "Silence informational messages and warnings."
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    #[command(
        visible_alias = "x",
        about = "Build the context bundle for the resolved rules."
    )]
    Extract(ExtractArgs),

    #[command(
        visible_alias = "p",
        about = "Show which files each rule would pull in, without reading them."
    )]
    Preview(PreviewArgs),

    #[command(about = "Show, set or clear the stored app / chat rules.")]
    Rules(RulesArgs),

    #[command(about = "Generate or save shell completion scripts.")]
    Completion(CompletionArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub project_config: ProjectConfigOpts,
    #[command(flatten)]
    pub rules: RuleOpts,
    #[command(flatten)]
    pub limits: LimitOpts,
    #[command(flatten)]
    pub format_output: FormatOutputOpts,

    #[arg(
        short = 's',
        long,
        value_name = "FILE",
        help = "Write the output to FILE instead of stdout.",
        help_heading = "Output Formatting"
    )]
    pub save: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub project_config: ProjectConfigOpts,
    #[command(flatten)]
    pub rules: RuleOpts,
    #[command(flatten)]
    pub limits: LimitOpts,
    #[command(flatten)]
    pub format_output: FormatOutputOpts,
}

#[derive(Args, Debug, Clone)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum RulesAction {
    #[command(about = "Show the rules an extraction would start from.")]
    Show(RulesShowArgs),
    #[command(about = "Replace (or extend with --append) the stored rules.")]
    Set(RulesSetArgs),
    #[command(about = "Remove the stored rules of the app or a chat.")]
    Clear(RulesClearArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RulesShowArgs {
    #[arg(long, help = "Specify the target project directory.", value_name = "PATH")]
    pub project_root: Option<PathBuf>,
    #[arg(long, value_name = "ID", help = "Chat whose rules to show (default: app rules).")]
    pub chat_id: Option<u64>,
    #[command(flatten)]
    pub format_output: FormatOutputOpts,
}

#[derive(Args, Debug, Clone)]
pub struct RulesSetArgs {
    #[arg(long, help = "Specify the target project directory.", value_name = "PATH")]
    pub project_root: Option<PathBuf>,
    #[arg(long, value_name = "ID", help = "Chat whose rules to set (default: app rules).")]
    pub chat_id: Option<u64>,
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    pub include: Vec<String>,
    #[arg(short = 'a', long = "auto-include", value_name = "GLOB")]
    pub auto_include: Vec<String>,
    #[arg(short = 'e', long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,
    #[arg(long, help = "Add to the stored rules instead of replacing them.")]
    pub append: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RulesClearArgs {
    #[arg(long, help = "Specify the target project directory.", value_name = "PATH")]
    pub project_root: Option<PathBuf>,
    #[arg(long, value_name = "ID", help = "Chat whose rules to clear (default: app rules).")]
    pub chat_id: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionArgs {
    #[arg(
        long,
        value_name = "SHELL",
        help = "Shell to generate completions for (fish, bash, zsh) [default: fish]"
    )]
    pub shell: Option<String>,
    #[arg(
        long,
        help = "Save completion script to default location (prompts overwrite)."
    )]
    pub save: bool,
}
