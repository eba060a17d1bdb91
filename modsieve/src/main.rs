//! Crash-isolating loadability inventory for candidate modules.
//!
//! Reads the candidate inventory from `.modsieve/modules.json`, probes the
//! modules out-of-process via the configured prober command, and prints which
//! ones can be loaded safely and which ones cannot.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use modsieve::core::codec::ProtocolError;
use modsieve::exit_codes;
use modsieve::explorer::explorer_for_root;
use modsieve::io::init::{InitOptions, SievePaths, init_sieve};
use modsieve::io::module_map::load_module_map;
use modsieve::logging;

#[derive(Parser)]
#[command(
    name = "modsieve",
    version,
    about = "Crash-isolating loadability analysis for candidate modules"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.modsieve/` scaffolding (config, empty manifests, schema).
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the module manifest against the schema and module-id rules.
    Validate {
        /// Validate the self-inspect manifest instead.
        #[arg(long = "self")]
        self_inspect: bool,
    },
    /// Print modules that load cleanly, as JSON id → source path.
    Loadable {
        /// Inspect the tool's own module inventory instead of the project's.
        #[arg(long = "self")]
        self_inspect: bool,
        /// Recompute, bypassing the result cache entirely.
        #[arg(long)]
        no_cache: bool,
    },
    /// Print modules that fail to load, as JSON id → error text.
    Forbidden {
        /// Inspect the tool's own module inventory instead of the project's.
        #[arg(long = "self")]
        self_inspect: bool,
        /// Recompute, bypassing the result cache entirely.
        #[arg(long)]
        no_cache: bool,
    },
    /// Run a full analysis and print both maps plus the convergence trace.
    Analyze {
        /// Inspect the tool's own module inventory instead of the project's.
        #[arg(long = "self")]
        self_inspect: bool,
        /// Recompute, bypassing the result cache entirely.
        #[arg(long)]
        no_cache: bool,
    },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        let code = if err.downcast_ref::<ProtocolError>().is_some() {
            exit_codes::PROTOCOL
        } else {
            exit_codes::INVALID
        };
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init { force } => cmd_init(&root, force),
        Command::Validate { self_inspect } => cmd_validate(&root, self_inspect),
        Command::Loadable {
            self_inspect,
            no_cache,
        } => cmd_loadable(&root, self_inspect, no_cache),
        Command::Forbidden {
            self_inspect,
            no_cache,
        } => cmd_forbidden(&root, self_inspect, no_cache),
        Command::Analyze {
            self_inspect,
            no_cache,
        } => cmd_analyze(&root, self_inspect, no_cache),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    init_sieve(root, &InitOptions { force })?;
    Ok(())
}

fn cmd_validate(root: &Path, self_inspect: bool) -> Result<()> {
    let paths = SievePaths::new(root);
    load_module_map(paths.manifest_for(self_inspect))?;
    Ok(())
}

fn cmd_loadable(root: &Path, self_inspect: bool, no_cache: bool) -> Result<()> {
    let mut explorer = explorer_for_root(root, self_inspect, !no_cache)?;
    print_json(&explorer.loadable_modules()?)
}

fn cmd_forbidden(root: &Path, self_inspect: bool, no_cache: bool) -> Result<()> {
    let mut explorer = explorer_for_root(root, self_inspect, !no_cache)?;
    print_json(&explorer.forbidden_modules()?)
}

fn cmd_analyze(root: &Path, self_inspect: bool, no_cache: bool) -> Result<()> {
    let mut explorer = explorer_for_root(root, self_inspect, !no_cache)?;
    print_json(explorer.analysis()?)
}

/// Serialize `value` to pretty-printed JSON with trailing newline on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    print!("{payload}");
    Ok(())
}
