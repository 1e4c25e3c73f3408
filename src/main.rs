use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process;

use duosync::config::{find_root, Config};
use duosync::driver::{self, Mode, RunOptions};
use duosync::log::Logger;
use duosync::snapshot::{timestamp_now, SnapshotStore};

#[derive(Parser)]
#[command(name = "duo", version, about = "Bidirectional file sync that tracks moves, not just diffs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile both sides, resolving conflicts per the configured policy
    Sync {
        /// Directory under sync tracking (defaults to the current directory)
        path: Option<PathBuf>,

        /// Show what would change without touching either side
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip the backup step regardless of config
        #[arg(long)]
        no_backup: bool,

        /// Suppress progress output
        #[arg(short, long)]
        silent: bool,

        /// Exclude files matching glob patterns (can be used multiple times)
        #[arg(short, long, value_name = "PATTERN")]
        exclude: Vec<String>,
    },

    /// Make B match A
    Push {
        path: Option<PathBuf>,

        /// Push every file from A, not just what changed since the last run
        #[arg(long)]
        all: bool,

        #[arg(long)]
        no_backup: bool,

        #[arg(short, long)]
        silent: bool,
    },

    /// Make A match B
    Pull {
        path: Option<PathBuf>,

        /// Pull every file from B, not just what changed since the last run
        #[arg(long)]
        all: bool,

        #[arg(long)]
        no_backup: bool,

        #[arg(short, long)]
        silent: bool,
    },

    /// Set up tracking state for a new pair of directories
    Init {
        path: Option<PathBuf>,

        /// Remote transport to scaffold the config for
        #[arg(long, default_value = "rsync")]
        remote: String,
    },

    /// Forget all tracked changes and re-baseline both sides at their current state
    Reset {
        path: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red());
        process::exit(2);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Sync { path, dry_run, no_backup, silent, exclude } => {
            let root = resolve_root(path)?;
            let mut config = load_config(&root)?;
            config.excludes.extend(exclude);
            let log = open_log(&root, silent)?;
            run_mode(&root, &config, Mode::Sync, dry_run, no_backup, &log)
        },
        Command::Push { path, all, no_backup, silent } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let log = open_log(&root, silent)?;
            run_mode(&root, &config, Mode::Push { all }, false, no_backup, &log)
        },
        Command::Pull { path, all, no_backup, silent } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let log = open_log(&root, silent)?;
            run_mode(&root, &config, Mode::Pull { all }, false, no_backup, &log)
        },
        Command::Init { path, remote } => {
            let root = path.unwrap_or(std::env::current_dir()?);
            let mut config = Config::default();
            config.remote_program = remote;
            driver::init(&root, &config)?;
            println!("{} Initialized tracking in {}", "Done.".green().bold(), root.join(".pyco-sync").display());
            Ok(())
        },
        Command::Reset { path, force } => {
            let root = resolve_root(path)?;
            let config = load_config(&root)?;
            let log = Logger::stdout_only(false);

            if !force {
                print!("This discards all tracked change history for this pair. Continue? [y/N] ");
                std::io::Write::flush(&mut std::io::stdout())?;
                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    return Ok(());
                }
            }

            driver::reset(&root, &config, config.backup, &log)?;
            Ok(())
        },
    }
}

fn resolve_root(path: Option<PathBuf>) -> Result<PathBuf> {
    let start = path.unwrap_or(std::env::current_dir()?);
    find_root(&start).with_context(|| {
        format!(
            "no .pyco-sync found at or above {}; run 'duo init' first",
            start.display()
        )
    })
}

fn load_config(root: &std::path::Path) -> Result<Config> {
    let store = SnapshotStore::new(root);
    if !store.config_path().exists() {
        bail!("missing config at {}", store.config_path().display());
    }
    Config::load(&store.config_path()).context("failed to load config")
}

fn open_log(root: &std::path::Path, silent: bool) -> Result<Logger> {
    let store = SnapshotStore::new(root);
    let ts = timestamp_now();
    Ok(Logger::with_file(silent, &store.logs_dir(), &ts)?)
}

fn run_mode(
    root: &std::path::Path,
    config: &Config,
    mode: Mode,
    dry_run: bool,
    no_backup: bool,
    log: &Logger,
) -> Result<()> {
    let opts = RunOptions {
        mode,
        dry_run,
        backup_override: if no_backup { Some(false) } else { None },
    };

    let report = driver::run(root, config, &opts, log)?;

    if !dry_run {
        log.section(format!(
            "{} {} moved, {} deleted, {} sent to B, {} sent to A",
            "Done.".green().bold(),
            report.moved_a + report.moved_b,
            report.deleted_a + report.deleted_b,
            report.transferred_a2b,
            report.transferred_b2a,
        ));
    }

    Ok(())
}
