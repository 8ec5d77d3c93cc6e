//! Tributary CLI: load dbt-style project graphs from the command line.
//!
//! Provides `tributary load` to build and print a project's node graph,
//! `tributary gc` to sweep listing caches of entities that stopped running,
//! and `tributary fingerprint` to print the cache version token of a
//! directory.

#![warn(missing_docs)]

mod fingerprint;
mod gc;
mod load;
mod setup;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tributary_config::LoadMode;

/// Tributary: build-graph loading with caching.
#[derive(Parser, Debug)]
#[command(name = "tributary", version, about = "Tributary project graph loader")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `tributary.toml` file or the directory holding it.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the project graph and print it.
    Load(LoadArgs),
    /// Delete listing caches of entities that have not run recently.
    Gc(GcArgs),
    /// Print the cache version token of a directory.
    Fingerprint(FingerprintArgs),
}

/// Arguments for the `tributary load` subcommand.
#[derive(Parser, Debug)]
pub struct LoadArgs {
    /// Strategy to use instead of `render.load_method`.
    #[arg(short, long, value_enum)]
    pub method: Option<MethodArg>,

    /// Scheduling entity the listing cache is keyed by.
    #[arg(long)]
    pub cache_id: Option<String>,

    /// Nested group inside the entity.
    #[arg(long, requires = "cache_id")]
    pub group: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments for the `tributary gc` subcommand.
#[derive(Parser, Debug)]
pub struct GcArgs {
    /// Delete caches of entities idle for longer than this many days.
    #[arg(long)]
    pub max_age_days: u32,
}

/// Arguments for the `tributary fingerprint` subcommand.
#[derive(Parser, Debug)]
pub struct FingerprintArgs {
    /// Directory to fingerprint.
    pub dir: String,

    /// Arguments folded into the token.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Graph loading strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Manifest, else listing, else custom parser.
    Automatic,
    /// The tool's listing command, cache first.
    Ls,
    /// Cached listing only.
    LsCache,
    /// A listing file produced ahead of time.
    LsFile,
    /// A compiled manifest.
    Manifest,
    /// The lightweight source scan.
    Custom,
}

impl From<MethodArg> for LoadMode {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Automatic => LoadMode::Automatic,
            MethodArg::Ls => LoadMode::Ls,
            MethodArg::LsCache => LoadMode::LsCache,
            MethodArg::LsFile => LoadMode::LsFile,
            MethodArg::Manifest => LoadMode::Manifest,
            MethodArg::Custom => LoadMode::Custom,
        }
    }
}

/// Graph output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per node.
    Text,
    /// A JSON document.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print debug information.
    pub verbose: bool,
    /// Optional path to the config file or its directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    setup::init_logging(&global);

    let result = match cli.command {
        Command::Load(ref args) => load::run(args, &global),
        Command::Gc(ref args) => gc::run(args, &global),
        Command::Fingerprint(ref args) => fingerprint::run(args),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
