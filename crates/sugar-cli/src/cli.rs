//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueEnum};

/// Compiles Sugar templates to PHP.
#[derive(Debug, Parser)]
#[command(name = "sugar")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Template root directory
    #[arg(default_value = ".")]
    pub root: Utf8PathBuf,

    /// Templates to compile, relative to the root (default: every page)
    #[arg(long = "template", short = 't')]
    pub templates: Vec<Utf8PathBuf>,

    /// Path to sugar.toml (default: <root>/sugar.toml)
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Directory for compiled templates, overrides `cache_dir`
    #[arg(long, short = 'o')]
    pub out: Option<Utf8PathBuf>,

    /// Template file suffix, overrides `suffix`
    #[arg(long)]
    pub suffix: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Glob patterns to ignore, added to `ignore`
    #[arg(long)]
    pub ignore: Vec<String>,

    /// Recompile templates even when the cache is fresh
    #[arg(long)]
    pub force: bool,

    /// Print the generated PHP to stdout (for debugging)
    #[arg(long = "emit-php")]
    pub emit_php: bool,

    /// Watch mode
    #[arg(long)]
    pub watch: bool,

    /// Preserve watch output (don't clear screen)
    #[arg(long = "preserve-watch-output")]
    pub preserve_watch_output: bool,

    /// More logging (-v debug, -vv trace); `SUGAR_LOG` takes precedence
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Human-readable with code snippets
    HumanVerbose,
    /// JSON output
    Json,
}

impl Args {
    /// Returns the log filter implied by `--verbose`.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "sugar_compiler=debug,sugar=debug,info",
            _ => "sugar_compiler=trace,sugar=trace,debug",
        }
    }
}
