// ─────────────────────────────────────────────────────────────────────────────
//  autogen-init  —  moc / uic / rcc build-step initializer
//
//  Reads a target description (autogen.toml), decides which generation steps
//  the target needs and writes the settings artifacts the build-time
//  execution stage consumes.
//
//  USAGE
//  ─────
//    autogen-init init   app/autogen.toml lib/autogen.toml
//    autogen-init check  app/autogen.toml        exit 1 when stale
//    autogen-init scan   app/res/icons.qrc
//    autogen-init plan   app/autogen.toml        JSON on stdout
//
//  Logging: AUTOGEN_LOG=<filter> (tracing EnvFilter syntax), or --verbose.
// ─────────────────────────────────────────────────────────────────────────────

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autogen_init::config::QtVersion;
use autogen_init::toolchain::QT_BIN_ENV;
use autogen_init::{
    is_stale, load_from_file, qrc, InitOutcome, Initializer, QtToolchain, RecordingGraph,
    TargetDescription,
};

const LOG_ENV: &str = "AUTOGEN_LOG";

// ─────────────────────────────────────────────────────────────────────────────
//  CLI definition (clap derive)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "autogen-init",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Plan moc / uic / rcc generation steps and write their settings",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Only print errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Debug-level logging (overridden by AUTOGEN_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Cmd {
    /// Initialize one or more targets
    Init(InitArgs),
    /// Check whether a target's settings are out of date  (exit 1 when stale)
    Check {
        /// Target description
        target: PathBuf,
    },
    /// Print the files a resource manifest packages
    Scan {
        /// .qrc manifest
        manifest: PathBuf,
    },
    /// Initialize a target and print its build plan as JSON
    Plan(ToolArgs),
}

#[derive(Args)]
struct ToolArgs {
    /// Target description
    target: PathBuf,

    /// Qt bin directory  (default: $AUTOGEN_QT_BIN, then PATH)
    #[arg(long)]
    qt_bin: Option<PathBuf>,
}

#[derive(Args)]
struct InitArgs {
    /// Target descriptions
    #[arg(required = true)]
    targets: Vec<PathBuf>,

    /// Qt bin directory  (default: $AUTOGEN_QT_BIN, then PATH)
    #[arg(long)]
    qt_bin: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    init_logging(cli.verbose, cli.no_color);

    let result = match cli.command {
        Cmd::Init(args)           => cmd_init(args, cli.quiet),
        Cmd::Check { target }     => cmd_check(&target, cli.quiet),
        Cmd::Scan { manifest }    => cmd_scan(&manifest),
        Cmd::Plan(args)           => cmd_plan(args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!no_color)
                .with_target(false),
        )
        .init();
}

// ─────────────────────────────────────────────────────────────────────────────
//  Command handlers
//
//  Each returns Ok(false) for "ran fine, but exit non-zero".
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_init(args: InitArgs, quiet: bool) -> Result<bool> {
    let t0 = Instant::now();

    // Targets are independent; each gets its own graph and artifacts.
    let results: Vec<(PathBuf, Result<InitOutcome>)> = args.targets
        .par_iter()
        .map(|path| (path.clone(), init_one(path, args.qt_bin.as_deref()).map(|(_, out)| out)))
        .collect();

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(outcome) => {
                if !quiet {
                    print_outcome(path, outcome);
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {} {:#}", "✗".red().bold(), path.display().to_string().bold(), e);
            }
        }
    }

    if !quiet {
        println!(
            "{} {} target(s) in {:.2}s",
            if failed == 0 { "✓".green().bold() } else { "!".yellow().bold() },
            results.len() - failed,
            t0.elapsed().as_secs_f64(),
        );
    }
    Ok(failed == 0)
}

fn cmd_check(target: &Path, quiet: bool) -> Result<bool> {
    let desc = load(target)?;
    let stale = is_stale(&desc)?;
    if !quiet {
        if stale {
            println!("{} {} is stale, re-run init", "!".yellow().bold(), desc.name.bold());
        } else {
            println!("{} {} is up to date", "✓".green().bold(), desc.name.bold());
        }
    }
    Ok(!stale)
}

fn cmd_scan(manifest: &Path) -> Result<bool> {
    let files = qrc::scan(manifest)?;
    for file in &files {
        let marker = if file.exists() { "✓".green() } else { "?".yellow() };
        println!("{} {}", marker, file.display());
    }
    Ok(true)
}

fn cmd_plan(args: ToolArgs) -> Result<bool> {
    let (graph, outcome) = init_one(&args.target, args.qt_bin.as_deref())?;
    let json = serde_json::json!({
        "outcome": outcome,
        "graph":   graph,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load(path: &Path) -> Result<TargetDescription> {
    load_from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn init_one(path: &Path, qt_bin: Option<&Path>) -> Result<(RecordingGraph, InitOutcome)> {
    let desc = load(path)?;
    let qt = QtVersion::parse(&desc.qt_version)?;

    // --qt-bin beats AUTOGEN_QT_BIN
    let toolchain = match qt_bin {
        Some(dir) => QtToolchain::new(Some(dir.to_path_buf()), qt.major),
        None => QtToolchain::from_env(qt.major),
    };
    tracing::debug!(bin_dir = ?toolchain.bin_dir(), env = QT_BIN_ENV, "toolchain");

    let mut graph = RecordingGraph::new();
    let outcome = Initializer::new(&toolchain)
        .run(&desc, &mut graph)
        .with_context(|| format!("initializing target '{}'", desc.name))?;
    Ok((graph, outcome))
}

fn print_outcome(path: &Path, outcome: &InitOutcome) {
    let Some(target) = &outcome.target else {
        println!("{} {} {}", "·".dimmed(), path.display(), "(no generator enabled)".dimmed());
        return;
    };

    let kinds: Vec<&str> = outcome.generators.enabled_kinds().into_iter().map(|k| k.name()).collect();
    println!(
        "{} {} {}",
        "✓".green().bold(),
        target.origin.bold(),
        format!("[{}]", kinds.join(", ")).dimmed(),
    );
    for step in &outcome.plan.steps {
        println!("  {} {}", "step:".dimmed(), step.name);
    }
    if let Some(artifacts) = &outcome.artifacts {
        let unchanged = if artifacts.changed.is_empty() { " (unchanged)" } else { "" };
        println!("  {} {}{}", "info:".dimmed(), artifacts.general.display(), unchanged.dimmed());
    }
    for diag in &outcome.diagnostics {
        println!("  {} {}", "!".yellow(), diag);
    }
}
