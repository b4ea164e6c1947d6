use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use pawntrace_config::ConfigLoader;
use std::path::PathBuf;

mod commands;

/// Offline crash diagnostics for compiled Pawn scripts.
///
/// Inspects .amx modules and their debug info, and rebuilds backtraces and
/// runtime error reports from VM snapshots captured by a host.
///
/// EXAMPLES:
///     pawntrace info gm.amx                      Summarize a module
///     pawntrace lookup gm.amx 0x1c4              Source location of an address
///     pawntrace resolve gm.amx -f gm.pwn -l 42   Address of a source line
///     pawntrace backtrace gm.amx crash.json      Backtrace from a snapshot
///     pawntrace error gm.amx crash.json 4        Runtime error report
///
/// ENVIRONMENT VARIABLES:
///     PAWNTRACE_JSON    Set to 'true' for JSON output by default
///     PAWNTRACE_TRACE   Trace flags (n, p, f) overriding pawntrace.toml
///     AMX_PATH          Extra directories searched for .amx files
#[derive(Parser)]
#[command(name = "pawntrace")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file to use instead of searching for pawntrace.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a compiled module
    ///
    /// Prints the header, the public and native tables and the size of the
    /// debug section.
    ///
    /// EXAMPLES:
    ///     pawntrace info gm.amx
    ///     pawntrace info gm.amx --json
    #[command(visible_alias = "i")]
    Info {
        /// Path to the .amx file
        file: PathBuf,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },

    /// Find the source location of a code address
    ///
    /// Addresses are code-segment offsets, hex with a 0x prefix or decimal.
    ///
    /// EXAMPLES:
    ///     pawntrace lookup gm.amx 0x1c4
    ///     pawntrace lookup gm.amx 452 --json
    #[command(visible_alias = "l")]
    Lookup {
        /// Path to the .amx file
        file: PathBuf,
        /// Code address
        address: String,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },

    /// Find the code address of a function or source line
    ///
    /// EXAMPLES:
    ///     pawntrace resolve gm.amx --file gm.pwn --function OnGameModeInit
    ///     pawntrace resolve gm.amx --file gm.pwn --line 42
    #[command(group(ArgGroup::new("target").required(true).args(["function", "line"])))]
    Resolve {
        /// Path to the .amx file
        file: PathBuf,
        /// Source file name as recorded by the compiler
        #[arg(long = "file", short = 'f', value_name = "SOURCE")]
        source: String,
        /// Function name
        #[arg(long, short = 'n')]
        function: Option<String>,
        /// One-based line number
        #[arg(long, short = 'l')]
        line: Option<i32>,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },

    /// Rebuild the backtrace of a captured VM state
    ///
    /// EXAMPLES:
    ///     pawntrace backtrace gm.amx crash.json
    ///     pawntrace backtrace gm.amx crash.json --json
    #[command(visible_alias = "bt")]
    Backtrace {
        /// Path to the .amx file
        file: PathBuf,
        /// Snapshot JSON written by the host
        snapshot: PathBuf,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },

    /// Report a runtime error raised in a captured VM state
    ///
    /// The backtrace follows unless the error is raised before any code runs.
    ///
    /// EXAMPLES:
    ///     pawntrace error gm.amx crash.json 4
    #[command(visible_alias = "e")]
    Error {
        /// Path to the .amx file
        file: PathBuf,
        /// Snapshot JSON written by the host
        snapshot: PathBuf,
        /// AMX error code
        #[arg(allow_hyphen_values = true)]
        code: i32,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },

    /// Find the file of a module in the search paths
    ///
    /// Matches the header of the given module against every .amx file in
    /// the configured search directories.
    ///
    /// EXAMPLES:
    ///     pawntrace locate dump/gm.amx
    ///     pawntrace locate dump/gm.amx --path gamemodes
    Locate {
        /// Module whose header is looked for
        file: PathBuf,
        /// Extra directories to search, before the configured ones
        #[arg(long, short = 'p')]
        path: Vec<PathBuf>,
        /// Output in JSON format
        #[arg(long, env = "PAWNTRACE_JSON")]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    let config = match &cli.config {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load settings: {}", path.display()))?,
        None => loader
            .load_from_directory(&std::env::current_dir()?)
            .context("Failed to load pawntrace.toml")?,
    };

    match cli.command {
        Commands::Info { file, json } => commands::info::run(&file, json)?,
        Commands::Lookup {
            file,
            address,
            json,
        } => commands::lookup::run(&file, &address, json)?,
        Commands::Resolve {
            file,
            source,
            function,
            line,
            json,
        } => {
            let target = match (function, line) {
                (Some(name), _) => commands::resolve::Target::Function(name),
                (None, Some(line)) => commands::resolve::Target::Line(line),
                (None, None) => anyhow::bail!("Either --function or --line is required"),
            };
            commands::resolve::run(&file, &source, target, json)?
        }
        Commands::Backtrace {
            file,
            snapshot,
            json,
        } => commands::backtrace::run(&file, &snapshot, &config, json)?,
        Commands::Error {
            file,
            snapshot,
            code,
            json,
        } => commands::error::run(&file, &snapshot, code, &config, json)?,
        Commands::Locate { file, path, json } => {
            commands::locate::run(&file, path, &config, json)?
        }
    }

    Ok(())
}
